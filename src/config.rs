//! Layered runtime settings.
//!
//! Each value is taken from the first layer that defines it: command-line
//! overrides, then `LECTERN_*` environment variables, then the settings
//! table in `config.redb`, then the built-in default.

use std::{fmt, str::FromStr, time::Duration};

use crate::{
    config_db::ConfigDb,
    embedding::{Embedder, HashEmbedder},
    error::{Error, Result},
    model_manager::{DEFAULT_MODEL_ID, SentenceEmbedder},
};

pub const DEFAULT_AI_URL: &str = "http://localhost:5001/ai";
pub const DEFAULT_AI_TIMEOUT_SECS: u64 = 30;

pub const MODEL_KEY: &str = "model";
pub const EMBEDDER_KEY: &str = "embedder";
pub const AI_URL_KEY: &str = "ai_url";
pub const AI_TIMEOUT_KEY: &str = "ai_timeout_secs";

/// Keys accepted by `lectern config set`.
pub const SETTING_KEYS: &[&str] =
    &[MODEL_KEY, EMBEDDER_KEY, AI_URL_KEY, AI_TIMEOUT_KEY];

const MODEL_ENV: &str = "LECTERN_MODEL";
const EMBEDDER_ENV: &str = "LECTERN_EMBEDDER";
const AI_URL_ENV: &str = "LECTERN_AI_URL";
const AI_TIMEOUT_ENV: &str = "LECTERN_AI_TIMEOUT_SECS";

/// Which embedder backs the corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmbedderKind {
    /// Sentence-transformer model run locally.
    #[default]
    Sentence,
    /// Feature-hashing embedder; needs no model files.
    Hash,
}

impl FromStr for EmbedderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sentence" | "minilm" => Ok(Self::Sentence),
            "hash" => Ok(Self::Hash),
            other => Err(Error::Config(format!(
                "unknown embedder '{other}' (expected 'sentence' or 'hash')"
            ))),
        }
    }
}

impl fmt::Display for EmbedderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sentence => "sentence",
            Self::Hash => "hash",
        })
    }
}

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub embedder: Option<EmbedderKind>,
    pub ai_url: Option<String>,
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub model: String,
    pub embedder: EmbedderKind,
    pub ai_url: String,
    pub ai_timeout: Duration,
}

impl Settings {
    pub fn resolve(
        overrides: &Overrides,
        config_db: Option<&ConfigDb>,
    ) -> Result<Self> {
        Self::resolve_with(overrides, config_db, |key| std::env::var(key).ok())
    }

    /// Resolve with a custom environment lookup.
    pub fn resolve_with(
        overrides: &Overrides,
        config_db: Option<&ConfigDb>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let stored = |key: &str| -> Result<Option<String>> {
            match config_db {
                Some(db) => db.get_setting(key),
                None => Ok(None),
            }
        };
        let layered = |env_key: &str, db_key: &str| -> Result<Option<String>> {
            match env(env_key).filter(|v| !v.is_empty()) {
                Some(value) => Ok(Some(value)),
                None => stored(db_key),
            }
        };

        let model = match &overrides.model {
            Some(model) => model.clone(),
            None => layered(MODEL_ENV, MODEL_KEY)?
                .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
        };

        let embedder = match overrides.embedder {
            Some(kind) => kind,
            None => layered(EMBEDDER_ENV, EMBEDDER_KEY)?
                .map(|v| v.parse::<EmbedderKind>())
                .transpose()?
                .unwrap_or_default(),
        };

        let ai_url = match &overrides.ai_url {
            Some(url) => url.clone(),
            None => layered(AI_URL_ENV, AI_URL_KEY)?
                .unwrap_or_else(|| DEFAULT_AI_URL.to_string()),
        };

        let timeout_secs = match layered(AI_TIMEOUT_ENV, AI_TIMEOUT_KEY)? {
            Some(value) => value.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!(
                    "{AI_TIMEOUT_KEY} must be a whole number of seconds, got '{value}'"
                ))
            })?,
            None => DEFAULT_AI_TIMEOUT_SECS,
        };

        Ok(Self {
            model,
            embedder,
            ai_url,
            ai_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Construct the configured embedder.
    pub fn build_embedder(&self) -> Result<Box<dyn Embedder>> {
        Ok(match self.embedder {
            EmbedderKind::Sentence => Box::new(SentenceEmbedder::new(&self.model)?),
            EmbedderKind::Hash => Box::new(HashEmbedder::default()),
        })
    }

    /// Human-readable name of the active embedder.
    pub fn embedder_label(&self) -> String {
        match self.embedder {
            EmbedderKind::Sentence => self.model.clone(),
            EmbedderKind::Hash => EmbedderKind::Hash.to_string(),
        }
    }
}

/// Check a key/value pair before persisting it with `config set`.
pub fn validate_setting(key: &str, value: &str) -> Result<()> {
    match key {
        EMBEDDER_KEY => value.parse::<EmbedderKind>().map(|_| ()),
        AI_TIMEOUT_KEY => value.trim().parse::<u64>().map(|_| ()).map_err(|_| {
            Error::Config(format!("{key} must be a whole number of seconds"))
        }),
        MODEL_KEY | AI_URL_KEY => Ok(()),
        other => Err(Error::Config(format!(
            "unknown setting '{other}' (known: {})",
            SETTING_KEYS.join(", ")
        ))),
    }
}
