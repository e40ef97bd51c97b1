//! Access-count bookkeeping off the read path.
//!
//! Recall results are returned immediately; the ids are queued on an
//! unbounded channel and a background task bumps their counters. Lost or
//! failed bumps only skew an advisory statistic, so failures are logged
//! and counted, never surfaced to the reader.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use agentmem_core::episode::{Episode, EpisodicStore, RecallQuery};
use agentmem_core::error::MemoryError;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

enum Command {
    Record(Vec<String>),
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct Counters {
    recorded: AtomicU64,
    failed: AtomicU64,
}

/// Handle to the access-count worker. Cheap to clone.
///
/// Must be created inside a tokio runtime. The worker exits once every
/// handle is dropped.
#[derive(Clone)]
pub struct AccessTracker {
    tx: mpsc::UnboundedSender<Command>,
    counters: Arc<Counters>,
}

impl AccessTracker {
    pub fn spawn(store: Arc<dyn EpisodicStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let worker_counters = counters.clone();

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    Command::Record(ids) => match store.record_access(&ids).await {
                        Ok(()) => {
                            worker_counters
                                .recorded
                                .fetch_add(ids.len() as u64, Ordering::Relaxed);
                        }
                        Err(e) => {
                            worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                            warn!(episodes = ids.len(), error = %e, "Access count update failed");
                        }
                    },
                    Command::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Access tracker stopped");
        });

        Self { tx, counters }
    }

    /// Queue a bump for each id. Never blocks.
    pub fn track(&self, episode_ids: Vec<String>) {
        if episode_ids.is_empty() {
            return;
        }
        if self.tx.send(Command::Record(episode_ids)).is_err() {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            warn!("Access tracker worker is gone; dropping update");
        }
    }

    /// Wait until everything queued before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Episodes whose counter was bumped.
    pub fn recorded(&self) -> u64 {
        self.counters.recorded.load(Ordering::Relaxed)
    }

    /// Batches that could not be applied.
    pub fn failures(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }
}

/// Episodic store decorator that feeds recalled ids to an [`AccessTracker`].
pub struct TrackingEpisodicStore {
    inner: Arc<dyn EpisodicStore>,
    tracker: AccessTracker,
}

impl TrackingEpisodicStore {
    pub fn new(inner: Arc<dyn EpisodicStore>) -> Self {
        let tracker = AccessTracker::spawn(inner.clone());
        Self { inner, tracker }
    }

    pub fn tracker(&self) -> &AccessTracker {
        &self.tracker
    }
}

#[async_trait]
impl EpisodicStore for TrackingEpisodicStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn write(&self, episode: Episode) -> Result<String, MemoryError> {
        self.inner.write(episode).await
    }

    async fn recall(
        &self,
        agent_id: &str,
        query: &RecallQuery,
    ) -> Result<Vec<Episode>, MemoryError> {
        let episodes = self.inner.recall(agent_id, query).await?;
        self.tracker
            .track(episodes.iter().map(|e| e.id.clone()).collect());
        Ok(episodes)
    }

    async fn boost(&self, episode_id: &str, new_importance: u8) -> Result<bool, MemoryError> {
        self.inner.boost(episode_id, new_importance).await
    }

    async fn get(&self, episode_id: &str) -> Result<Option<Episode>, MemoryError> {
        self.inner.get(episode_id).await
    }

    async fn record_access(&self, episode_ids: &[String]) -> Result<(), MemoryError> {
        self.inner.record_access(episode_ids).await
    }
}
