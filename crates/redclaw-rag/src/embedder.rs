//! Embedding backends for the RAG store.

use async_trait::async_trait;
use std::sync::Arc;

use redclaw_core::error::Result;
use redclaw_core::traits::Provider;

/// Turns text into fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;

    /// Embed a batch; output order matches input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        Ok(batch.pop().unwrap_or_default())
    }
}

/// Deterministic feature-hashing embedder.
///
/// Lowercased alphanumeric tokens are hashed into `dim` buckets (FNV-1a),
/// counted, then L2-normalized. No semantics, but stable, offline, and
/// good enough for tests and for keeping the pipeline alive without an
/// API key.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    fn bucket(&self, token: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for b in token.bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % self.dim as u64) as usize
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        let lower = text.to_lowercase();
        for token in lower.split(|c: char| !c.is_alphanumeric()) {
            if token.len() < 2 {
                continue;
            }
            vector[self.bucket(token)] += 1.0;
        }

        // L2 normalize so cosine similarity reduces to a dot product.
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Embeds via the configured provider, degrading to `HashEmbedder` when
/// the provider is unavailable or the call fails.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    fallback: HashEmbedder,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, dim: usize) -> Self {
        Self {
            provider,
            fallback: HashEmbedder::new(dim),
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn dim(&self) -> usize {
        self.fallback.dim()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.provider.is_available() {
            match self.provider.embed(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) => {
                    tracing::warn!("Remote embedding failed, using hash embedding: {e}");
                }
            }
        }
        self.fallback.embed_batch(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedder_deterministic() {
        let e = HashEmbedder::new(64);
        let a = e.embed("sql injection in login form").await.unwrap();
        let b = e.embed("sql injection in login form").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_hash_embedder_normalized() {
        let e = HashEmbedder::new(64);
        let v = e.embed("cross site scripting attack").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hash_embedder_empty_text_zero_vector() {
        let e = HashEmbedder::new(32);
        let v = e.embed("").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_similar_texts_closer_than_different() {
        let e = HashEmbedder::new(256);
        let a = e.embed("sql injection vulnerability in web application").await.unwrap();
        let b = e.embed("web application sql injection flaws").await.unwrap();
        let c = e.embed("quarterly financial revenue projections").await.unwrap();

        let sim_ab = crate::search::cosine_similarity(&a, &b);
        let sim_ac = crate::search::cosine_similarity(&a, &c);
        assert!(sim_ab > sim_ac);
    }
}
