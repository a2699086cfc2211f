use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use crate::error::{Error, Result};

/// Dimension used by [`HashEmbedder::default`].
pub const DEFAULT_HASH_DIMENSION: usize = 1024;

/// Maps text to fixed-dimension dense vectors.
///
/// Implementations must be deterministic: embedding the same text twice in
/// one process yields the same vector, so stored passage vectors and query
/// vectors are comparable.
pub trait Embedder: Send + Sync {
    /// Number of components in every produced vector.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input in input order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])?
            .pop()
            .ok_or_else(|| Error::Model("embedder returned no vector".into()))
    }
}

/// Check that a batch of vectors matches the expected shape.
pub(crate) fn check_batch(
    vectors: &[Vec<f32>],
    expected_count: usize,
    dimension: usize,
) -> Result<()> {
    if vectors.len() != expected_count {
        return Err(Error::Model(format!(
            "embedder returned {} vectors for {expected_count} inputs",
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(Error::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }
    Ok(())
}

/// Scale `vector` to unit length in place. Zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Signed feature-hashing bag-of-words embedder.
///
/// Each lowercased, punctuation-trimmed token is hashed to one component
/// and a sign; the resulting count vector is L2-normalised. No model files
/// are needed, which makes it the embedder of choice for tests and offline
/// use. Vectors from different dimensions are not comparable.
///
/// # Examples
///
/// ```
/// use lectern::embedding::{Embedder, HashEmbedder};
///
/// let embedder = HashEmbedder::new(64);
/// let a = embedder.embed_one("Mitochondria produce ATP").unwrap();
/// let b = embedder.embed_one("mitochondria produce ATP.").unwrap();
/// assert_eq!(a.len(), 64);
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];
        for token in tokens(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();

            let slot = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSION)
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
}
