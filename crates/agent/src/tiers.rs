//! Wiring of the four memory tiers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agentmem_config::AppConfig;
use agentmem_core::error::{Error, MemoryError};
use agentmem_core::{CoreMemoryStore, Embedder, EpisodicStore, SemanticStore, WorkingMemoryStore};
use agentmem_memory::{
    AccessTracker, InMemoryCoreStore, InMemoryEpisodicStore, InMemorySemanticStore,
    InMemoryWorkingStore, SemanticMemory, SqliteStore, TrackingEpisodicStore,
};
use tracing::info;

/// Handles to every tier, shared by the assembler and the consolidator.
#[derive(Clone)]
pub struct MemoryTiers {
    pub core: Arc<dyn CoreMemoryStore>,
    pub working: Arc<dyn WorkingMemoryStore>,
    pub episodic: Arc<dyn EpisodicStore>,
    pub semantic: Arc<SemanticMemory>,
    /// Present when recalls feed the access-count worker.
    pub access: Option<AccessTracker>,
}

impl MemoryTiers {
    /// All tiers in process. Must be called inside a tokio runtime.
    pub fn in_memory(embedder: Arc<dyn Embedder>, working_ttl: Duration) -> Self {
        let episodic = TrackingEpisodicStore::new(Arc::new(InMemoryEpisodicStore::new()));
        let access = Some(episodic.tracker().clone());
        Self {
            core: Arc::new(InMemoryCoreStore::new()),
            working: Arc::new(InMemoryWorkingStore::new(working_ttl)),
            episodic: Arc::new(episodic),
            semantic: Arc::new(SemanticMemory::new(
                Arc::new(InMemorySemanticStore::new()),
                embedder,
            )),
            access,
        }
    }

    /// Build the embedder and open the durable and ephemeral stores.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let embedder = agentmem_embeddings::from_config(&config.embedding)?;
        let ttl = Duration::from_secs(config.ephemeral.ttl_secs);

        let (core, episodic, semantic_store): (
            Arc<dyn CoreMemoryStore>,
            Arc<dyn EpisodicStore>,
            Arc<dyn SemanticStore>,
        ) = match config.durable.backend.as_str() {
            "sqlite" => {
                let store = Arc::new(open_sqlite(&config.durable.url).await?);
                (store.clone(), store.clone(), store)
            }
            "in_memory" => (
                Arc::new(InMemoryCoreStore::new()),
                Arc::new(InMemoryEpisodicStore::new()),
                Arc::new(InMemorySemanticStore::new()),
            ),
            other => {
                return Err(Error::Config {
                    message: format!("unknown durable backend: {other}"),
                });
            }
        };

        let working: Arc<dyn WorkingMemoryStore> = match config.ephemeral.backend.as_str() {
            "sqlite" => Arc::new(open_sqlite(&config.ephemeral.url).await?.with_ttl(ttl)),
            "in_memory" => Arc::new(InMemoryWorkingStore::new(ttl)),
            other => {
                return Err(Error::Config {
                    message: format!("unknown ephemeral backend: {other}"),
                });
            }
        };

        let episodic = TrackingEpisodicStore::new(episodic);
        let access = Some(episodic.tracker().clone());

        info!(
            durable = %config.durable.backend,
            ephemeral = %config.ephemeral.backend,
            embedder = embedder.name(),
            "Memory tiers ready"
        );

        Ok(Self {
            core,
            working,
            episodic: Arc::new(episodic),
            semantic: Arc::new(SemanticMemory::new(semantic_store, embedder)),
            access,
        })
    }

    /// Wait for queued access-count updates to land.
    pub async fn flush(&self) {
        if let Some(access) = &self.access {
            access.flush().await;
        }
    }
}

async fn open_sqlite(url: &str) -> Result<SqliteStore, MemoryError> {
    if let Some(parent) = sqlite_file(url).and_then(Path::parent) {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MemoryError::Storage(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
    }
    SqliteStore::new(url).await
}

/// Filesystem path of a `sqlite:` URL, or `None` for in-process databases.
fn sqlite_file(url: &str) -> Option<&Path> {
    if url.contains(":memory:") {
        return None;
    }
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);
    Some(Path::new(path))
}
