use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::{
    embedding::Embedder,
    error::{Error, Result},
};

pub const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Maximum tokens per input when the model does not say otherwise.
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 256;

/// Texts encoded per forward pass.
const BATCH_SIZE: usize = 32;

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

#[derive(Debug, Deserialize)]
struct ModelShape {
    hidden_size: usize,
    max_position_embeddings: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SentenceBertConfig {
    max_seq_length: Option<usize>,
}

/// Where the model files live once resolved.
#[derive(Debug, Clone)]
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
    sentence_config: Option<PathBuf>,
}

impl ModelFiles {
    /// Resolve files from a local directory or the Hugging Face hub.
    fn resolve(model_id: &str) -> Result<Self> {
        let local = Path::new(model_id);
        if local.is_dir() {
            let sentence_config = local.join("sentence_bert_config.json");
            return Ok(Self {
                config: local.join("config.json"),
                tokenizer: local.join("tokenizer.json"),
                weights: local.join("model.safetensors"),
                sentence_config: sentence_config
                    .is_file()
                    .then_some(sentence_config),
            });
        }

        let api = hf_hub::api::sync::Api::new().map_err(hub_error)?;
        let repo = api.model(model_id.to_string());
        Ok(Self {
            config: repo.get("config.json").map_err(hub_error)?,
            tokenizer: repo.get("tokenizer.json").map_err(hub_error)?,
            weights: repo.get("model.safetensors").map_err(hub_error)?,
            sentence_config: repo.get("sentence_bert_config.json").ok(),
        })
    }
}

fn hub_error(e: hf_hub::api::sync::ApiError) -> Error {
    Error::RemoteService(format!("model download failed: {e}"))
}

struct LoadedModel {
    model: BertModel,
    tokenizer: Tokenizer,
}

/// A BERT sentence-transformer run locally through candle.
///
/// The dimension and maximum input length are read from the model
/// configuration when the embedder is created; the weights are loaded on
/// the first call to [`Embedder::embed`].
pub struct SentenceEmbedder {
    model_id: String,
    files: ModelFiles,
    dimension: usize,
    max_input_tokens: usize,
    device: Device,
    loaded: OnceLock<LoadedModel>,
}

impl SentenceEmbedder {
    /// Resolve `model_id` (a hub repository or a local directory) and read
    /// its configuration.
    pub fn new(model_id: &str) -> Result<Self> {
        let files = ModelFiles::resolve(model_id)?;
        let shape: ModelShape =
            serde_json::from_str(&std::fs::read_to_string(&files.config)?)?;

        let mut max_input_tokens = files
            .sentence_config
            .as_deref()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|s| serde_json::from_str::<SentenceBertConfig>(&s).ok())
            .and_then(|c| c.max_seq_length)
            .unwrap_or(DEFAULT_MAX_INPUT_TOKENS);
        if let Some(positions) = shape.max_position_embeddings {
            max_input_tokens = max_input_tokens.min(positions);
        }

        debug!(
            model = model_id,
            dimension = shape.hidden_size,
            max_input_tokens,
            "resolved sentence embedding model"
        );

        Ok(Self {
            model_id: model_id.to_string(),
            files,
            dimension: shape.hidden_size,
            max_input_tokens,
            device: default_device(),
            loaded: OnceLock::new(),
        })
    }

    /// Returns the model ID this embedder was created with.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Returns `true` if the weights have already been loaded.
    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    pub fn max_input_tokens(&self) -> usize {
        self.max_input_tokens
    }

    fn ensure_loaded(&self) -> Result<&LoadedModel> {
        if let Some(loaded) = self.loaded.get() {
            return Ok(loaded);
        }

        let config: Config =
            serde_json::from_str(&std::fs::read_to_string(&self.files.config)?)?;
        let tokenizer = Tokenizer::from_file(&self.files.tokenizer)
            .map_err(|e| Error::Model(format!("failed to load tokenizer: {e}")))?;

        // SAFETY: the weights file is not modified while mapped; it lives
        // in the hub cache or a model directory owned by the user.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(
                &[&self.files.weights],
                DTYPE,
                &self.device,
            )?
        };
        let model = BertModel::load(vb, &config)?;
        info!(model = %self.model_id, "loaded sentence embedding model");

        Ok(self.loaded.get_or_init(|| LoadedModel { model, tokenizer }))
    }

    fn embed_batch(
        &self,
        loaded: &LoadedModel,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        let encodings = loaded
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| Error::Model(format!("tokenization failed: {e}")))?;

        let rows: Vec<(Vec<u32>, Vec<u32>)> = encodings
            .iter()
            .map(|enc| {
                truncate_tokens(
                    enc.get_ids(),
                    enc.get_attention_mask(),
                    self.max_input_tokens,
                )
            })
            .collect();

        let width = rows.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0);
        if width == 0 {
            return Ok(vec![vec![0.0; self.dimension]; texts.len()]);
        }

        let mut ids = Vec::with_capacity(rows.len() * width);
        let mut mask = Vec::with_capacity(rows.len() * width);
        for (row_ids, row_mask) in &rows {
            ids.extend_from_slice(row_ids);
            ids.resize(ids.len() + width - row_ids.len(), 0);
            mask.extend_from_slice(row_mask);
            mask.resize(mask.len() + width - row_mask.len(), 0);
        }

        let shape = (rows.len(), width);
        let input_ids = Tensor::from_vec(ids, shape, &self.device)?;
        let attention_mask = Tensor::from_vec(mask, shape, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = loaded.model.forward(
            &input_ids,
            &token_type_ids,
            Some(&attention_mask),
        )?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;

        Ok(pooled.to_device(&Device::Cpu)?.to_vec2::<f32>()?)
    }
}

impl Embedder for SentenceEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let loaded = self.ensure_loaded()?;

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            vectors.extend(self.embed_batch(loaded, batch)?);
        }
        Ok(vectors)
    }
}

impl std::fmt::Debug for SentenceEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentenceEmbedder")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

/// Cut token ids to at most `max_len`, keeping the final special token.
///
/// Positions with a zero attention mask are padding added by the tokenizer
/// and are dropped first, so the kept final token is the real `[SEP]`.
fn truncate_tokens(
    ids: &[u32],
    mask: &[u32],
    max_len: usize,
) -> (Vec<u32>, Vec<u32>) {
    let real: Vec<u32> = ids
        .iter()
        .zip(mask)
        .filter(|&(_, &m)| m != 0)
        .map(|(&id, _)| id)
        .collect();

    let len = real.len().min(max_len.max(1));
    let mut ids_out = real[..len].to_vec();
    if real.len() > len && len >= 2 {
        ids_out[len - 1] = real[real.len() - 1];
    }
    let mask_out = vec![1; ids_out.len()];
    (ids_out, mask_out)
}

/// Mean of the token states under the attention mask, scaled to unit length.
///
/// `hidden` is `[B, T, H]`, `attention_mask` is `[B, T]`; the result is
/// `[B, H]`.
fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let mask = attention_mask
        .to_device(hidden.device())?
        .to_dtype(hidden.dtype())?;
    let masked = hidden.broadcast_mul(&mask.unsqueeze(2)?)?;
    let sum = masked.sum(1)?;
    let lengths = mask.sum_keepdim(1)?.clamp(1e-9, f64::MAX)?;
    let mean = sum.broadcast_div(&lengths)?;

    let norm = mean
        .sqr()?
        .sum_keepdim(1)?
        .sqrt()?
        .clamp(1e-12, f64::MAX)?;
    Ok(mean.broadcast_div(&norm)?.to_dtype(DType::F32)?)
}
