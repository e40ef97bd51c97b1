//! Semantic memory service.
//!
//! Pairs a [`SemanticStore`] index with an [`Embedder`]. Saving is strict:
//! no embedding, no fragment. Searching is lenient and walks down a
//! ladder: similarity search, then most-recent facts, then nothing. The
//! rung that answered is reported in [`RetrievalMode`].

use std::sync::Arc;

use agentmem_core::embedding::Embedder;
use agentmem_core::error::MemoryError;
use agentmem_core::semantic::{SaveOptions, SearchOptions, SemanticFragment, SemanticStore};
use serde::Serialize;
use tracing::{debug, warn};

/// How a search result set was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Ranked by cosine similarity to the query.
    Similarity,
    /// Embedding or index failed; newest org facts instead.
    RecencyFallback,
    /// Both paths failed. The result is empty.
    Unavailable,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Similarity => "similarity",
            Self::RecencyFallback => "recency_fallback",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticResults {
    pub fragments: Vec<SemanticFragment>,
    pub mode: RetrievalMode,
}

impl SemanticResults {
    fn unavailable() -> Self {
        Self {
            fragments: Vec::new(),
            mode: RetrievalMode::Unavailable,
        }
    }
}

pub struct SemanticMemory {
    store: Arc<dyn SemanticStore>,
    embedder: Arc<dyn Embedder>,
}

impl SemanticMemory {
    pub fn new(store: Arc<dyn SemanticStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    pub fn store(&self) -> &Arc<dyn SemanticStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed `content` and persist it as a fragment of `org_id`.
    ///
    /// An embedding failure is returned as [`MemoryError::Embedding`] and
    /// nothing is written.
    pub async fn save(
        &self,
        org_id: &str,
        agent_id: Option<&str>,
        content: &str,
        options: SaveOptions,
    ) -> Result<String, MemoryError> {
        let embedding = self.embedder.embed(content).await?;
        let fragment = SemanticFragment::new(
            org_id,
            agent_id.map(str::to_string),
            content,
            embedding,
            &options,
        );
        let id = self.store.insert(fragment).await?;
        debug!(org_id, fragment_id = %id, scope = options.scope.as_str(), "Saved semantic fragment");
        Ok(id)
    }

    /// Fragments of `org_id` relevant to `query`. Never fails.
    pub async fn search(&self, org_id: &str, query: &str, options: &SearchOptions) -> SemanticResults {
        match self.similarity_search(org_id, query, options).await {
            Ok(fragments) => {
                return SemanticResults {
                    fragments,
                    mode: RetrievalMode::Similarity,
                };
            }
            Err(e) => {
                warn!(org_id, error = %e, "Semantic search degraded to recency");
            }
        }

        match self.store.recent(org_id, options).await {
            Ok(fragments) => SemanticResults {
                fragments,
                mode: RetrievalMode::RecencyFallback,
            },
            Err(e) => {
                warn!(org_id, error = %e, "Semantic memory unavailable");
                SemanticResults::unavailable()
            }
        }
    }

    async fn similarity_search(
        &self,
        org_id: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SemanticFragment>, MemoryError> {
        let query_embedding = self.embedder.embed(query).await?;
        self.store.nearest(org_id, &query_embedding, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemorySemanticStore;
    use agentmem_core::error::EmbeddingError;
    use agentmem_core::semantic::Scope;
    use agentmem_embeddings::HashEmbedder;
    use async_trait::async_trait;

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn name(&self) -> &str {
            "failing"
        }

        fn dimensions(&self) -> usize {
            8
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::Network("connection refused".into()))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl SemanticStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }

        async fn insert(&self, _fragment: SemanticFragment) -> Result<String, MemoryError> {
            Err(MemoryError::Storage("disk full".into()))
        }

        async fn nearest(
            &self,
            _org_id: &str,
            _query_embedding: &[f32],
            _options: &SearchOptions,
        ) -> Result<Vec<SemanticFragment>, MemoryError> {
            Err(MemoryError::QueryFailed("index offline".into()))
        }

        async fn recent(
            &self,
            _org_id: &str,
            _options: &SearchOptions,
        ) -> Result<Vec<SemanticFragment>, MemoryError> {
            Err(MemoryError::QueryFailed("index offline".into()))
        }

        async fn count(&self, _org_id: &str) -> Result<usize, MemoryError> {
            Ok(0)
        }
    }

    fn hashed(store: Arc<dyn SemanticStore>) -> SemanticMemory {
        SemanticMemory::new(store, Arc::new(HashEmbedder::new(256)))
    }

    #[tokio::test]
    async fn search_ranks_relevant_fragment_first() {
        let memory = hashed(Arc::new(InMemorySemanticStore::new()));
        memory
            .save("org", None, "Enterprise customers churn after price increases", SaveOptions::default())
            .await
            .unwrap();
        memory
            .save("org", None, "The office plants need watering on Fridays", SaveOptions::default())
            .await
            .unwrap();

        let results = memory
            .search("org", "why do enterprise customers churn", &SearchOptions::default())
            .await;
        assert_eq!(results.mode, RetrievalMode::Similarity);
        assert!(results.fragments[0].content.contains("churn"));
        assert!(results.fragments[0].similarity.is_some());
    }

    #[tokio::test]
    async fn search_is_org_scoped() {
        let memory = hashed(Arc::new(InMemorySemanticStore::new()));
        memory
            .save("org-b", Some("agent-9"), "pricing page launch", SaveOptions::default())
            .await
            .unwrap();

        let results = memory
            .search("org-a", "pricing page launch", &SearchOptions::default())
            .await;
        assert!(results.fragments.is_empty());
    }

    #[tokio::test]
    async fn save_fails_loudly_without_embedding() {
        let store = Arc::new(InMemorySemanticStore::new());
        let memory = SemanticMemory::new(store.clone(), Arc::new(FailingEmbedder));

        let err = memory
            .save("org", None, "unembeddable", SaveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Embedding(_)));
        assert_eq!(store.count("org").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_falls_back_to_recency_when_embedding_fails() {
        let store = Arc::new(InMemorySemanticStore::new());
        let writer = hashed(store.clone());
        writer
            .save("org", None, "older fact", SaveOptions::default())
            .await
            .unwrap();
        writer
            .save(
                "org",
                None,
                "newer fact",
                SaveOptions {
                    scope: Scope::Domain,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let reader = SemanticMemory::new(store, Arc::new(FailingEmbedder));
        let results = reader.search("org", "anything", &SearchOptions::default()).await;
        assert_eq!(results.mode, RetrievalMode::RecencyFallback);
        assert_eq!(results.fragments.len(), 2);
        assert!(results.fragments.iter().all(|f| f.similarity.is_none()));
    }

    #[tokio::test]
    async fn search_reports_unavailable_when_everything_fails() {
        let memory = SemanticMemory::new(Arc::new(BrokenStore), Arc::new(FailingEmbedder));
        let results = memory.search("org", "anything", &SearchOptions::default()).await;
        assert_eq!(results.mode, RetrievalMode::Unavailable);
        assert!(results.fragments.is_empty());
    }

    #[tokio::test]
    async fn save_propagates_store_errors() {
        let memory = hashed(Arc::new(BrokenStore));
        let err = memory
            .save("org", None, "fact", SaveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Storage(_)));
    }

    #[test]
    fn mode_names_match_serialized_form() {
        for mode in [
            RetrievalMode::Similarity,
            RetrievalMode::RecencyFallback,
            RetrievalMode::Unavailable,
        ] {
            assert_eq!(
                serde_json::to_value(mode).unwrap(),
                serde_json::Value::from(mode.as_str())
            );
        }
    }
}
