//! Embedding providers for agentmem.
//!
//! - [`OpenAiEmbedder`] — any OpenAI-compatible `/embeddings` endpoint
//! - [`HashEmbedder`] — deterministic offline embedder (feature hashing)
//! - [`CachedEmbedder`] — wraps any embedder with an injectable
//!   [`EmbeddingCache`](agentmem_core::EmbeddingCache)
//! - [`PrefixCache`] / [`NoopCache`] — cache implementations

pub mod cache;
pub mod cached;
pub mod hashing;
pub mod openai_compat;

pub use cache::{NoopCache, PrefixCache};
pub use cached::CachedEmbedder;
pub use hashing::HashEmbedder;
pub use openai_compat::OpenAiEmbedder;

use std::sync::Arc;

use agentmem_config::EmbeddingConfig;
use agentmem_core::{Embedder, EmbeddingCache, EmbeddingError};
use async_trait::async_trait;

/// An embedder that always fails. Used when `provider = "none"`, so that
/// saves fail loudly and searches fall back to recency.
pub struct DisabledEmbedder {
    dimensions: usize,
}

impl DisabledEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn name(&self) -> &str {
        "none"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::NotConfigured(
            "embedding provider is disabled".into(),
        ))
    }
}

/// Build the configured embedder, wrapped in a cache when enabled.
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    let dimensions = config.effective_dimensions();
    let inner: Arc<dyn Embedder> = match config.provider.as_str() {
        "openai" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                EmbeddingError::NotConfigured(
                    "embedding.api_key (or OPENAI_API_KEY) is required for provider 'openai'"
                        .into(),
                )
            })?;
            Arc::new(OpenAiEmbedder::new(
                &config.api_url,
                api_key,
                &config.model,
                dimensions,
            ))
        }
        "hash" => Arc::new(HashEmbedder::new(dimensions)),
        "none" => return Ok(Arc::new(DisabledEmbedder::new(dimensions))),
        other => {
            return Err(EmbeddingError::NotConfigured(format!(
                "unknown embedding provider '{other}'"
            )));
        }
    };

    if !config.cache_enabled {
        return Ok(inner);
    }

    let cache: Arc<dyn EmbeddingCache> = Arc::new(PrefixCache::new(
        config.cache_prefix_chars,
        config.cache_max_entries,
    ));
    Ok(Arc::new(CachedEmbedder::new(inner, cache)))
}
