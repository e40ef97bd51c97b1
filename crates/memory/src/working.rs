//! In-process working memory with time-based expiry.
//!
//! Each (agent, task) log carries a deadline that every append pushes
//! forward by the TTL. A read past the deadline drops the log and returns
//! nothing. Deadlines use `tokio::time::Instant`, so paused-clock tests can
//! advance through a TTL without sleeping.

use agentmem_core::error::MemoryError;
use agentmem_core::working::{WorkingEntry, WorkingMemoryStore, DEFAULT_TTL};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

struct TaskLog {
    entries: Vec<WorkingEntry>,
    expires_at: Instant,
}

type TaskKey = (String, String);

pub struct InMemoryWorkingStore {
    ttl: Duration,
    logs: Mutex<HashMap<TaskKey, TaskLog>>,
}

impl InMemoryWorkingStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            logs: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for InMemoryWorkingStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

fn key(agent_id: &str, task_id: &str) -> TaskKey {
    (agent_id.to_string(), task_id.to_string())
}

#[async_trait]
impl WorkingMemoryStore for InMemoryWorkingStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(
        &self,
        agent_id: &str,
        task_id: &str,
        entry: WorkingEntry,
    ) -> Result<(), MemoryError> {
        let now = Instant::now();
        let mut logs = self.logs.lock().await;
        let log = logs.entry(key(agent_id, task_id)).or_insert_with(|| TaskLog {
            entries: Vec::new(),
            expires_at: now,
        });
        // A log that lapsed before this append starts over.
        if log.expires_at <= now {
            log.entries.clear();
        }
        log.entries.push(entry);
        log.expires_at = now + self.ttl;
        Ok(())
    }

    async fn read(
        &self,
        agent_id: &str,
        task_id: &str,
        max_entries: usize,
    ) -> Result<Vec<WorkingEntry>, MemoryError> {
        let k = key(agent_id, task_id);
        let mut logs = self.logs.lock().await;
        let expired = match logs.get(&k) {
            None => return Ok(Vec::new()),
            Some(log) => log.expires_at <= Instant::now(),
        };
        if expired {
            logs.remove(&k);
            debug!(agent_id, task_id, "Working memory expired");
            return Ok(Vec::new());
        }

        let entries = &logs[&k].entries;
        let start = entries.len().saturating_sub(max_entries);
        Ok(entries[start..].to_vec())
    }

    async fn clear(&self, agent_id: &str, task_id: &str) -> Result<(), MemoryError> {
        self.logs.lock().await.remove(&key(agent_id, task_id));
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, MemoryError> {
        let now = Instant::now();
        let mut logs = self.logs.lock().await;
        let before = logs.len();
        logs.retain(|_, log| log.expires_at > now);
        Ok(before - logs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmem_core::working::WorkingRole;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn append_then_read_preserves_order() {
        let store = InMemoryWorkingStore::new(TTL);
        for i in 0..5 {
            store
                .append("a1", "t1", WorkingEntry::user(format!("turn {i}")))
                .await
                .unwrap();
        }
        let entries = store.read("a1", "t1", 5).await.unwrap();
        let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["turn 0", "turn 1", "turn 2", "turn 3", "turn 4"]);
    }

    #[tokio::test]
    async fn read_returns_most_recent_oldest_first() {
        let store = InMemoryWorkingStore::new(TTL);
        for i in 0..10 {
            store
                .append("a1", "t1", WorkingEntry::assistant(format!("turn {i}")))
                .await
                .unwrap();
        }
        let entries = store.read("a1", "t1", 3).await.unwrap();
        let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["turn 7", "turn 8", "turn 9"]);
    }

    #[tokio::test]
    async fn logs_are_scoped_per_task() {
        let store = InMemoryWorkingStore::new(TTL);
        store.append("a1", "t1", WorkingEntry::user("mine")).await.unwrap();
        store
            .append("a1", "t2", WorkingEntry::tool_result("other task"))
            .await
            .unwrap();
        store.append("a2", "t1", WorkingEntry::user("other agent")).await.unwrap();

        let entries = store.read("a1", "t1", 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].role, WorkingRole::User);
        assert_eq!(entries[0].content, "mine");
    }

    #[tokio::test]
    async fn clear_drops_log() {
        let store = InMemoryWorkingStore::new(TTL);
        store.append("a1", "t1", WorkingEntry::user("x")).await.unwrap();
        store.clear("a1", "t1").await.unwrap();
        assert!(store.read("a1", "t1", 10).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expires_after_ttl_without_appends() {
        let store = InMemoryWorkingStore::new(TTL);
        store.append("a1", "t1", WorkingEntry::user("x")).await.unwrap();

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        assert!(store.read("a1", "t1", 10).await.unwrap().is_empty());
        // Reading again stays empty.
        assert!(store.read("a1", "t1", 10).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn append_resets_ttl() {
        let store = InMemoryWorkingStore::new(TTL);
        store.append("a1", "t1", WorkingEntry::user("first")).await.unwrap();

        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(45)).await;
            store
                .append("a1", "t1", WorkingEntry::assistant("still going"))
                .await
                .unwrap();
        }
        // 225s elapsed in total, far beyond one TTL, but never 60s idle.
        assert_eq!(store.read("a1", "t1", 10).await.unwrap().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn append_after_expiry_starts_fresh() {
        let store = InMemoryWorkingStore::new(TTL);
        store.append("a1", "t1", WorkingEntry::user("stale")).await.unwrap();
        tokio::time::advance(TTL * 2).await;
        store.append("a1", "t1", WorkingEntry::user("fresh")).await.unwrap();

        let entries = store.read("a1", "t1", 10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "fresh");
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let store = InMemoryWorkingStore::new(TTL);
        store.append("a1", "old", WorkingEntry::user("x")).await.unwrap();
        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        store.append("a1", "new", WorkingEntry::user("y")).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.read("a1", "new", 10).await.unwrap().len(), 1);
    }
}
