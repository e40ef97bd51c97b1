//! Embedding traits: text to fixed-dimension vectors.
//!
//! The embedding model is an external collaborator. [`Embedder`] wraps it;
//! [`EmbeddingCache`] is an injectable, best-effort cache in front of it.
//! A cache never affects correctness: a miss only costs a redundant call,
//! and callers must not rely on any entry staying cached.

use async_trait::async_trait;

use crate::error::EmbeddingError;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// The provider name (e.g., "openai", "hash").
    fn name(&self) -> &str;

    /// Length of every vector this embedder returns.
    fn dimensions(&self) -> usize;

    /// Embed a single text. Deterministic per text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Process-local cache of embeddings.
///
/// Methods are synchronous; implementations must not hold a lock while an
/// embedding call is in flight.
pub trait EmbeddingCache: Send + Sync {
    fn get(&self, text: &str) -> Option<Vec<f32>>;

    fn put(&self, text: &str, embedding: Vec<f32>);

    /// Number of cached vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
