//! Embedding backends for the vector memory tier.
//!
//! [`ApiEmbeddingService`] talks to an OpenAI-compatible `/embeddings`
//! endpoint; [`HashEmbeddingService`] is a deterministic offline stand-in.

pub mod api;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::utils::math::vector_normalize;
use crate::Ah32Error;

pub use api::{ApiEmbeddingService, EmbeddingConfig};

/// Embedder that is never available. Vector memory treats it as "mirror off"
/// and keeps serving recall from the JSONL tiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEmbeddingService;

#[async_trait]
impl EmbeddingService for NoopEmbeddingService {
    async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, Ah32Error> {
        Err(Ah32Error::Llm("embeddings disabled".into()))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, Ah32Error> {
        Err(Ah32Error::Llm("embeddings disabled".into()))
    }

    fn model_name(&self) -> &str {
        "noop"
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Deterministic bag-of-characters embedding.
///
/// Texts sharing characters land close together, which is enough for tests
/// and for running without an embedding provider.
pub struct HashEmbeddingService {
    dimensions: usize,
}

impl HashEmbeddingService {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for c in text.chars().filter(|c| !c.is_whitespace()) {
            let mut hasher = Sha256::new();
            hasher.update(c.to_string().as_bytes());
            let digest = hasher.finalize();
            let idx = u16::from_le_bytes([digest[0], digest[1]]) as usize % self.dimensions;
            v[idx] += 1.0;
        }
        vector_normalize(&v)
    }
}

#[async_trait]
impl EmbeddingService for HashEmbeddingService {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, Ah32Error> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Ah32Error> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn model_name(&self) -> &str {
        "hash"
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Text to vector, for the semantic memory mirror.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, Ah32Error>;

    /// One embedding per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Ah32Error>;

    /// Model identity, used to salt vector collection names.
    fn model_name(&self) -> &str;

    /// `false` switches vector writes and recall off.
    fn is_available(&self) -> bool;
}
