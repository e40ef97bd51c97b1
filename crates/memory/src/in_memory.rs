//! In-memory stores, useful for testing and single-process deployments.
//!
//! Each store keeps its records behind a `tokio::sync::RwLock`. Core merges
//! hold the write lock for the whole read-apply-write, so concurrent merges
//! on one agent never lose updates.

use agentmem_core::core_memory::{CoreMemory, CoreMemoryStore, CorePatch};
use agentmem_core::episode::{clamp_importance, recall_order, Episode, EpisodicStore, RecallQuery};
use agentmem_core::error::MemoryError;
use agentmem_core::semantic::{SearchOptions, SemanticFragment, SemanticStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::vector;

// ── Core ──────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryCoreStore {
    records: RwLock<HashMap<String, CoreMemory>>,
}

impl InMemoryCoreStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoreMemoryStore for InMemoryCoreStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn initialize(&self, memory: CoreMemory) -> Result<(), MemoryError> {
        debug!(agent_id = %memory.agent_id, "Initialized core memory");
        self.records
            .write()
            .await
            .insert(memory.agent_id.clone(), memory);
        Ok(())
    }

    async fn get(&self, agent_id: &str) -> Result<CoreMemory, MemoryError> {
        self.records
            .read()
            .await
            .get(agent_id)
            .cloned()
            .ok_or_else(|| MemoryError::not_found(agent_id))
    }

    async fn merge(&self, agent_id: &str, patch: CorePatch) -> Result<CoreMemory, MemoryError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(agent_id)
            .ok_or_else(|| MemoryError::not_found(agent_id))?;
        record.apply(patch);
        Ok(record.clone())
    }

    async fn delete(&self, agent_id: &str) -> Result<bool, MemoryError> {
        Ok(self.records.write().await.remove(agent_id).is_some())
    }
}

// ── Episodic ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryEpisodicStore {
    episodes: RwLock<Vec<Episode>>,
}

impl InMemoryEpisodicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total episodes stored, including those below any recall floor.
    pub async fn len(&self) -> usize {
        self.episodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EpisodicStore for InMemoryEpisodicStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn write(&self, episode: Episode) -> Result<String, MemoryError> {
        let episode = episode.normalized();
        let id = episode.id.clone();
        self.episodes.write().await.push(episode);
        Ok(id)
    }

    async fn recall(
        &self,
        agent_id: &str,
        query: &RecallQuery,
    ) -> Result<Vec<Episode>, MemoryError> {
        let episodes = self.episodes.read().await;
        let mut results: Vec<Episode> = episodes
            .iter()
            .filter(|e| e.agent_id == agent_id && query.matches(e))
            .cloned()
            .collect();
        results.sort_by(recall_order);
        results.truncate(query.limit);
        Ok(results)
    }

    async fn boost(&self, episode_id: &str, new_importance: u8) -> Result<bool, MemoryError> {
        let mut episodes = self.episodes.write().await;
        match episodes.iter_mut().find(|e| e.id == episode_id) {
            Some(e) => {
                e.importance = clamp_importance(new_importance);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, episode_id: &str) -> Result<Option<Episode>, MemoryError> {
        Ok(self
            .episodes
            .read()
            .await
            .iter()
            .find(|e| e.id == episode_id)
            .cloned())
    }

    async fn record_access(&self, episode_ids: &[String]) -> Result<(), MemoryError> {
        let mut episodes = self.episodes.write().await;
        for e in episodes.iter_mut().filter(|e| episode_ids.contains(&e.id)) {
            e.access_count = e.access_count.saturating_add(1);
        }
        Ok(())
    }
}

// ── Semantic ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemorySemanticStore {
    fragments: RwLock<Vec<SemanticFragment>>,
}

impl InMemorySemanticStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SemanticStore for InMemorySemanticStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn insert(&self, mut fragment: SemanticFragment) -> Result<String, MemoryError> {
        if fragment.id.is_empty() {
            fragment.id = Uuid::new_v4().to_string();
        }
        fragment.importance = clamp_importance(fragment.importance);
        fragment.similarity = None;
        let id = fragment.id.clone();
        self.fragments.write().await.push(fragment);
        Ok(id)
    }

    async fn nearest(
        &self,
        org_id: &str,
        query_embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SemanticFragment>, MemoryError> {
        let fragments = self.fragments.read().await;
        Ok(vector::rank_by_similarity(
            fragments
                .iter()
                .filter(|f| f.org_id == org_id && options.matches(f)),
            query_embedding,
            options.limit,
        ))
    }

    async fn recent(
        &self,
        org_id: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SemanticFragment>, MemoryError> {
        let fragments = self.fragments.read().await;
        // Appended in creation order, so newest are at the back.
        Ok(fragments
            .iter()
            .rev()
            .filter(|f| f.org_id == org_id && options.matches(f))
            .take(options.limit)
            .cloned()
            .collect())
    }

    async fn count(&self, org_id: &str) -> Result<usize, MemoryError> {
        Ok(self
            .fragments
            .read()
            .await
            .iter()
            .filter(|f| f.org_id == org_id)
            .count())
    }
}
