//! SQLite backend for every memory tier.
//!
//! One database file holds five tables:
//! - `agents` — core memory as a JSON document plus a `version` counter
//! - `episodes` — the episodic log, indexed for importance-then-recency recall
//! - `semantic_fragments` — knowledge with little-endian f32 embedding blobs
//! - `working_tasks` / `working_entries` — per-task transcripts and their expiry
//!
//! Core merges are serialized per agent inside the process by a per-agent
//! lock held across read, apply and write. The write is still conditional
//! on the document `version`, so a writer in another process that wins the
//! race makes this one re-read and retry with backoff. Timestamps are stored as fixed-width
//! RFC 3339 strings so lexical order is chronological order.

use crate::vector;
use agentmem_core::core_memory::{CoreMemory, CoreMemoryStore, CorePatch};
use agentmem_core::episode::{Episode, EpisodicStore, RecallQuery, clamp_importance};
use agentmem_core::error::MemoryError;
use agentmem_core::semantic::{Scope, SearchOptions, SemanticFragment, SemanticStore};
use agentmem_core::working::{DEFAULT_TTL, WorkingEntry, WorkingMemoryStore};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Upper bound on the pause between merge retries.
const MAX_MERGE_BACKOFF: Duration = Duration::from_millis(100);

/// One async lock per agent id, shared by every clone of the store.
type MergeLocks = Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    working_ttl: chrono::Duration,
    merge_locks: MergeLocks,
}

impl SqliteStore {
    /// Open (or create) a database and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for a throwaway in-process database.
    pub async fn new(url: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // Every connection to `:memory:` sees its own database, so pin the
        // pool to one connection that never idles out.
        let in_process = url.contains(":memory:");
        let pool_options = if in_process {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!(url, "SQLite memory store initialized");
        Ok(store)
    }

    /// Wrap an existing pool and run migrations.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let store = Self {
            pool,
            working_ttl: ttl_delta(DEFAULT_TTL),
            merge_locks: MergeLocks::default(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Idle lifetime of working-memory transcripts.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.working_ttl = ttl_delta(ttl);
        self
    }

    async fn merge_lock(&self, agent_id: &str) -> Arc<Mutex<()>> {
        self.merge_locks
            .lock()
            .await
            .entry(agent_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop one task's transcript if it is still expired at `now`.
    ///
    /// Both deletes re-check `expires_at`, so an append that refreshed the
    /// log after the caller saw it expired keeps its entries.
    async fn expire_task(&self, agent_id: &str, task_id: &str, now: &str) -> Result<bool, MemoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("begin: {e}")))?;

        sqlx::query(
            r#"
            DELETE FROM working_entries
            WHERE agent_id = ?1 AND task_id = ?2
              AND EXISTS (
                SELECT 1 FROM working_tasks t
                WHERE t.agent_id = ?1 AND t.task_id = ?2 AND t.expires_at <= ?3
              )
            "#,
        )
        .bind(agent_id)
        .bind(task_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("expire entries: {e}")))?;

        let expired = sqlx::query(
            "DELETE FROM working_tasks WHERE agent_id = ?1 AND task_id = ?2 AND expires_at <= ?3",
        )
        .bind(agent_id)
        .bind(task_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("expire task: {e}")))?
        .rows_affected();

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("commit: {e}")))?;
        Ok(expired > 0)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        let statements: [(&str, &str); 9] = [
            (
                "agents table",
                r#"
                CREATE TABLE IF NOT EXISTS agents (
                    agent_id    TEXT PRIMARY KEY,
                    document    TEXT NOT NULL,
                    version     INTEGER NOT NULL DEFAULT 0,
                    updated_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "episodes table",
                r#"
                CREATE TABLE IF NOT EXISTS episodes (
                    iid           INTEGER PRIMARY KEY AUTOINCREMENT,
                    id            TEXT UNIQUE NOT NULL,
                    agent_id      TEXT NOT NULL,
                    org_id        TEXT NOT NULL,
                    task_id       TEXT,
                    kind          TEXT NOT NULL,
                    summary       TEXT NOT NULL,
                    outcome       TEXT NOT NULL,
                    importance    INTEGER NOT NULL,
                    metadata      TEXT NOT NULL DEFAULT '{}',
                    access_count  INTEGER NOT NULL DEFAULT 0,
                    created_at    TEXT NOT NULL
                )
                "#,
            ),
            (
                "episodes recall index",
                "CREATE INDEX IF NOT EXISTS idx_episodes_recall \
                 ON episodes(agent_id, importance DESC, created_at DESC)",
            ),
            (
                "semantic_fragments table",
                r#"
                CREATE TABLE IF NOT EXISTS semantic_fragments (
                    iid          INTEGER PRIMARY KEY AUTOINCREMENT,
                    id           TEXT UNIQUE NOT NULL,
                    org_id       TEXT NOT NULL,
                    agent_id     TEXT,
                    content      TEXT NOT NULL,
                    embedding    BLOB NOT NULL,
                    dimensions   INTEGER NOT NULL,
                    scope        TEXT NOT NULL,
                    source_type  TEXT NOT NULL,
                    importance   INTEGER NOT NULL,
                    created_at   TEXT NOT NULL
                )
                "#,
            ),
            (
                "semantic org index",
                "CREATE INDEX IF NOT EXISTS idx_semantic_org \
                 ON semantic_fragments(org_id, created_at DESC)",
            ),
            (
                "working_tasks table",
                r#"
                CREATE TABLE IF NOT EXISTS working_tasks (
                    agent_id    TEXT NOT NULL,
                    task_id     TEXT NOT NULL,
                    expires_at  TEXT NOT NULL,
                    PRIMARY KEY (agent_id, task_id)
                )
                "#,
            ),
            (
                "working_entries table",
                r#"
                CREATE TABLE IF NOT EXISTS working_entries (
                    iid        INTEGER PRIMARY KEY AUTOINCREMENT,
                    agent_id   TEXT NOT NULL,
                    task_id    TEXT NOT NULL,
                    role       TEXT NOT NULL,
                    content    TEXT NOT NULL,
                    timestamp  TEXT NOT NULL
                )
                "#,
            ),
            (
                "working entries index",
                "CREATE INDEX IF NOT EXISTS idx_working_entries_task \
                 ON working_entries(agent_id, task_id, iid)",
            ),
            (
                "working expiry index",
                "CREATE INDEX IF NOT EXISTS idx_working_tasks_expiry \
                 ON working_tasks(expires_at)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_episode(row: &sqlx::sqlite::SqliteRow) -> Result<Episode, MemoryError> {
        let kind: String = column(row, "kind")?;
        let outcome: String = column(row, "outcome")?;
        let metadata: String = column(row, "metadata")?;
        let importance: i64 = column(row, "importance")?;
        let access_count: i64 = column(row, "access_count")?;
        let created_at: String = column(row, "created_at")?;

        Ok(Episode {
            id: column(row, "id")?,
            agent_id: column(row, "agent_id")?,
            org_id: column(row, "org_id")?,
            task_id: column(row, "task_id")?,
            kind: kind.parse().map_err(MemoryError::QueryFailed)?,
            summary: column(row, "summary")?,
            outcome: outcome.parse().map_err(MemoryError::QueryFailed)?,
            importance: clamp_importance(importance.clamp(0, u8::MAX as i64) as u8),
            metadata: serde_json::from_str(&metadata)?,
            access_count: access_count.clamp(0, u32::MAX as i64) as u32,
            created_at: parse_timestamp(&created_at),
        })
    }

    fn row_to_fragment(row: &sqlx::sqlite::SqliteRow) -> Result<SemanticFragment, MemoryError> {
        let scope: String = column(row, "scope")?;
        let importance: i64 = column(row, "importance")?;
        let blob: Vec<u8> = column(row, "embedding")?;
        let created_at: String = column(row, "created_at")?;

        Ok(SemanticFragment {
            id: column(row, "id")?,
            org_id: column(row, "org_id")?,
            agent_id: column(row, "agent_id")?,
            content: column(row, "content")?,
            embedding: blob_to_embedding(&blob),
            scope: scope.parse().map_err(MemoryError::QueryFailed)?,
            source_type: column(row, "source_type")?,
            importance: clamp_importance(importance.clamp(0, u8::MAX as i64) as u8),
            created_at: parse_timestamp(&created_at),
            similarity: None,
        })
    }

    fn row_to_working(row: &sqlx::sqlite::SqliteRow) -> Result<WorkingEntry, MemoryError> {
        let role: String = column(row, "role")?;
        let timestamp: String = column(row, "timestamp")?;
        Ok(WorkingEntry {
            role: role.parse().map_err(MemoryError::QueryFailed)?,
            content: column(row, "content")?,
            timestamp: parse_timestamp(&timestamp),
        })
    }

    /// Fragments of one org passing the scope and importance filters.
    async fn filtered_fragments(
        &self,
        org_id: &str,
        options: &SearchOptions,
        dimensions: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<SemanticFragment>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM semantic_fragments
            WHERE org_id = ?1
              AND importance >= ?2
              AND (?3 IS NULL OR scope = ?3)
              AND (?4 IS NULL OR dimensions = ?4)
            ORDER BY created_at DESC, iid DESC
            LIMIT ?5
            "#,
        )
        .bind(org_id)
        .bind(options.min_importance as i64)
        .bind(options.scope.map(|s: Scope| s.as_str()))
        .bind(dimensions.map(|d| d as i64))
        .bind(limit.map(|l| l as i64).unwrap_or(-1))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("fragment scan: {e}")))?;

        rows.iter().map(Self::row_to_fragment).collect()
    }
}

fn column<'r, T>(row: &'r sqlx::sqlite::SqliteRow, name: &str) -> Result<T, MemoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| MemoryError::QueryFailed(format!("{name} column: {e}")))
}

fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!(value = s, error = %e, "Unparseable timestamp, using now");
            Utc::now()
        })
}

fn ttl_delta(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

// ── Core ──────────────────────────────────────────────────────────────────

#[async_trait]
impl CoreMemoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn initialize(&self, memory: CoreMemory) -> Result<(), MemoryError> {
        let document = serde_json::to_string(&memory)?;
        sqlx::query(
            r#"
            INSERT INTO agents (agent_id, document, version, updated_at)
            VALUES (?1, ?2, 0, ?3)
            ON CONFLICT(agent_id) DO UPDATE SET
                document = excluded.document,
                version = agents.version + 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&memory.agent_id)
        .bind(&document)
        .bind(timestamp(memory.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("agent upsert: {e}")))?;

        debug!(agent_id = %memory.agent_id, "Initialized core memory");
        Ok(())
    }

    async fn get(&self, agent_id: &str) -> Result<CoreMemory, MemoryError> {
        let row = sqlx::query("SELECT document FROM agents WHERE agent_id = ?1")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("agent lookup: {e}")))?
            .ok_or_else(|| MemoryError::not_found(agent_id))?;

        let document: String = column(&row, "document")?;
        Ok(serde_json::from_str(&document)?)
    }

    async fn merge(&self, agent_id: &str, patch: CorePatch) -> Result<CoreMemory, MemoryError> {
        let agent_lock = self.merge_lock(agent_id).await;
        let _guard = agent_lock.lock().await;

        let mut backoff = Duration::from_millis(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let row = sqlx::query("SELECT document, version FROM agents WHERE agent_id = ?1")
                .bind(agent_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| MemoryError::QueryFailed(format!("agent lookup: {e}")))?
                .ok_or_else(|| MemoryError::not_found(agent_id))?;

            let document: String = column(&row, "document")?;
            let version: i64 = column(&row, "version")?;

            let mut memory: CoreMemory = serde_json::from_str(&document)?;
            memory.apply(patch.clone());
            let updated = serde_json::to_string(&memory)?;

            let result = sqlx::query(
                r#"
                UPDATE agents
                SET document = ?1, version = version + 1, updated_at = ?2
                WHERE agent_id = ?3 AND version = ?4
                "#,
            )
            .bind(&updated)
            .bind(timestamp(memory.updated_at))
            .bind(agent_id)
            .bind(version)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("agent update: {e}")))?;

            if result.rows_affected() == 1 {
                return Ok(memory);
            }

            debug!(agent_id, attempt, "Core merge lost a race to another writer, retrying");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_MERGE_BACKOFF);
        }
    }

    async fn delete(&self, agent_id: &str) -> Result<bool, MemoryError> {
        let result = sqlx::query("DELETE FROM agents WHERE agent_id = ?1")
            .bind(agent_id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("agent delete: {e}")))?;

        self.merge_locks.lock().await.remove(agent_id);
        Ok(result.rows_affected() > 0)
    }
}

// ── Episodic ──────────────────────────────────────────────────────────────

#[async_trait]
impl EpisodicStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn write(&self, episode: Episode) -> Result<String, MemoryError> {
        let episode = episode.normalized();
        let metadata = serde_json::to_string(&episode.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO episodes
                (id, agent_id, org_id, task_id, kind, summary, outcome,
                 importance, metadata, access_count, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&episode.id)
        .bind(&episode.agent_id)
        .bind(&episode.org_id)
        .bind(episode.task_id.as_deref())
        .bind(episode.kind.as_str())
        .bind(&episode.summary)
        .bind(episode.outcome.as_str())
        .bind(episode.importance as i64)
        .bind(&metadata)
        .bind(episode.access_count as i64)
        .bind(timestamp(episode.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("episode insert: {e}")))?;

        debug!(
            episode_id = %episode.id,
            agent_id = %episode.agent_id,
            kind = episode.kind.as_str(),
            importance = episode.importance,
            "Stored episode"
        );
        Ok(episode.id)
    }

    async fn recall(
        &self,
        agent_id: &str,
        query: &RecallQuery,
    ) -> Result<Vec<Episode>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM episodes
            WHERE agent_id = ?1
              AND importance >= ?2
              AND (?3 IS NULL OR kind = ?3)
            ORDER BY importance DESC, created_at DESC, iid DESC
            LIMIT ?4
            "#,
        )
        .bind(agent_id)
        .bind(query.min_importance as i64)
        .bind(query.kind.map(|k| k.as_str()))
        .bind(query.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("episode recall: {e}")))?;

        rows.iter().map(Self::row_to_episode).collect()
    }

    async fn boost(&self, episode_id: &str, new_importance: u8) -> Result<bool, MemoryError> {
        let result = sqlx::query("UPDATE episodes SET importance = ?1 WHERE id = ?2")
            .bind(clamp_importance(new_importance) as i64)
            .bind(episode_id)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("episode boost: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, episode_id: &str) -> Result<Option<Episode>, MemoryError> {
        let row = sqlx::query("SELECT * FROM episodes WHERE id = ?1")
            .bind(episode_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("episode lookup: {e}")))?;

        row.as_ref().map(Self::row_to_episode).transpose()
    }

    async fn record_access(&self, episode_ids: &[String]) -> Result<(), MemoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("begin: {e}")))?;

        for id in episode_ids {
            sqlx::query("UPDATE episodes SET access_count = access_count + 1 WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| MemoryError::Storage(format!("access bump: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("commit: {e}")))
    }
}

// ── Semantic ──────────────────────────────────────────────────────────────

#[async_trait]
impl SemanticStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, mut fragment: SemanticFragment) -> Result<String, MemoryError> {
        if fragment.id.is_empty() {
            fragment.id = Uuid::new_v4().to_string();
        }

        sqlx::query(
            r#"
            INSERT INTO semantic_fragments
                (id, org_id, agent_id, content, embedding, dimensions,
                 scope, source_type, importance, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&fragment.id)
        .bind(&fragment.org_id)
        .bind(fragment.agent_id.as_deref())
        .bind(&fragment.content)
        .bind(embedding_to_blob(&fragment.embedding))
        .bind(fragment.embedding.len() as i64)
        .bind(fragment.scope.as_str())
        .bind(&fragment.source_type)
        .bind(clamp_importance(fragment.importance) as i64)
        .bind(timestamp(fragment.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("fragment insert: {e}")))?;

        Ok(fragment.id)
    }

    async fn nearest(
        &self,
        org_id: &str,
        query_embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SemanticFragment>, MemoryError> {
        let candidates = self
            .filtered_fragments(org_id, options, Some(query_embedding.len()), None)
            .await?;
        Ok(vector::rank_by_similarity(
            &candidates,
            query_embedding,
            options.limit,
        ))
    }

    async fn recent(
        &self,
        org_id: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SemanticFragment>, MemoryError> {
        self.filtered_fragments(org_id, options, None, Some(options.limit))
            .await
    }

    async fn count(&self, org_id: &str) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM semantic_fragments WHERE org_id = ?1")
            .bind(org_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("fragment count: {e}")))?;

        let cnt: i64 = column(&row, "cnt")?;
        Ok(cnt as usize)
    }
}

// ── Working ───────────────────────────────────────────────────────────────

#[async_trait]
impl WorkingMemoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(
        &self,
        agent_id: &str,
        task_id: &str,
        entry: WorkingEntry,
    ) -> Result<(), MemoryError> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("begin: {e}")))?;

        // A transcript that lapsed before this append starts over.
        sqlx::query(
            r#"
            DELETE FROM working_entries
            WHERE agent_id = ?1 AND task_id = ?2
              AND EXISTS (
                SELECT 1 FROM working_tasks t
                WHERE t.agent_id = ?1 AND t.task_id = ?2 AND t.expires_at <= ?3
              )
            "#,
        )
        .bind(agent_id)
        .bind(task_id)
        .bind(timestamp(now))
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("stale transcript: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO working_entries (agent_id, task_id, role, content, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(agent_id)
        .bind(task_id)
        .bind(entry.role.as_str())
        .bind(&entry.content)
        .bind(timestamp(entry.timestamp))
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("working insert: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO working_tasks (agent_id, task_id, expires_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(agent_id, task_id) DO UPDATE SET expires_at = excluded.expires_at
            "#,
        )
        .bind(agent_id)
        .bind(task_id)
        .bind(timestamp(now + self.working_ttl))
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("working ttl: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("commit: {e}")))
    }

    async fn read(
        &self,
        agent_id: &str,
        task_id: &str,
        max_entries: usize,
    ) -> Result<Vec<WorkingEntry>, MemoryError> {
        let expiry = sqlx::query(
            "SELECT expires_at FROM working_tasks WHERE agent_id = ?1 AND task_id = ?2",
        )
        .bind(agent_id)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("working expiry: {e}")))?;

        let Some(expiry) = expiry else {
            return Ok(Vec::new());
        };
        let expires_at: String = column(&expiry, "expires_at")?;
        let now = timestamp(Utc::now());
        if expires_at <= now {
            debug!(agent_id, task_id, "Working memory expired");
            self.expire_task(agent_id, task_id, &now).await?;
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT * FROM working_entries
                WHERE agent_id = ?1 AND task_id = ?2
                ORDER BY iid DESC
                LIMIT ?3
            ) ORDER BY iid ASC
            "#,
        )
        .bind(agent_id)
        .bind(task_id)
        .bind(max_entries as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("working read: {e}")))?;

        rows.iter().map(Self::row_to_working).collect()
    }

    async fn clear(&self, agent_id: &str, task_id: &str) -> Result<(), MemoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("begin: {e}")))?;

        for sql in [
            "DELETE FROM working_entries WHERE agent_id = ?1 AND task_id = ?2",
            "DELETE FROM working_tasks WHERE agent_id = ?1 AND task_id = ?2",
        ] {
            sqlx::query(sql)
                .bind(agent_id)
                .bind(task_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| MemoryError::Storage(format!("working clear: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("commit: {e}")))
    }

    async fn purge_expired(&self) -> Result<usize, MemoryError> {
        let now = timestamp(Utc::now());
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("begin: {e}")))?;

        sqlx::query(
            r#"
            DELETE FROM working_entries
            WHERE EXISTS (
                SELECT 1 FROM working_tasks t
                WHERE t.agent_id = working_entries.agent_id
                  AND t.task_id = working_entries.task_id
                  AND t.expires_at <= ?1
            )
            "#,
        )
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("purge entries: {e}")))?;

        let purged = sqlx::query("DELETE FROM working_tasks WHERE expires_at <= ?1")
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("purge tasks: {e}")))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("commit: {e}")))?;

        if purged > 0 {
            info!(purged, "Purged expired working memory");
        }
        Ok(purged as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmem_core::core_memory::{
        Identity, IdentityPatch, MAX_DIRECTIVES, MAX_PINNED_FACTS, OrganizationProfile,
    };
    use agentmem_core::episode::{EpisodeKind, Outcome};
    use agentmem_core::semantic::SaveOptions;
    use std::sync::Arc;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn core(agent_id: &str) -> CoreMemory {
        CoreMemory::new(
            agent_id,
            Identity {
                name: "Ada".into(),
                role: "growth lead".into(),
                persona: "direct".into(),
            },
            OrganizationProfile {
                name: "Acme".into(),
                values: vec!["candor".into()],
                ..Default::default()
            },
        )
    }

    fn episode(agent: &str, summary: &str, importance: u8) -> Episode {
        Episode::new(agent, "org", EpisodeKind::TaskComplete, Outcome::Success, summary, importance)
    }

    #[tokio::test]
    async fn core_round_trip_and_not_found() {
        let db = test_store().await;
        let err = CoreMemoryStore::get(&db, "a1").await.unwrap_err();
        assert!(err.is_not_found());

        db.initialize(core("a1")).await.unwrap();
        let fetched = CoreMemoryStore::get(&db, "a1").await.unwrap();
        assert_eq!(fetched.identity.name, "Ada");
        assert_eq!(fetched.organization.values, vec!["candor"]);
    }

    #[tokio::test]
    async fn merge_on_missing_agent_does_not_create() {
        let db = test_store().await;
        let err = db.add_pin("ghost", "fact").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(CoreMemoryStore::get(&db, "ghost").await.is_err());
    }

    #[tokio::test]
    async fn merge_keeps_sibling_fields() {
        let db = test_store().await;
        db.initialize(core("a1")).await.unwrap();

        let patch = CorePatch::Identity(IdentityPatch {
            role: Some("head of growth".into()),
            ..Default::default()
        });
        let merged = db.merge("a1", patch).await.unwrap();
        assert_eq!(merged.identity.role, "head of growth");
        assert_eq!(merged.identity.name, "Ada");

        let stored = CoreMemoryStore::get(&db, "a1").await.unwrap();
        assert_eq!(stored, merged);
    }

    #[tokio::test]
    async fn directives_stay_bounded() {
        let db = test_store().await;
        db.initialize(core("a1")).await.unwrap();
        for i in 0..12 {
            db.add_directive("a1", &format!("directive {i}")).await.unwrap();
        }
        let stored = CoreMemoryStore::get(&db, "a1").await.unwrap();
        assert_eq!(stored.directives.len(), 10);
        assert_eq!(stored.directives[0], "directive 2");
        assert_eq!(stored.directives[9], "directive 11");
    }

    async fn file_store(dir: &tempfile::TempDir) -> SqliteStore {
        let url = format!("sqlite://{}", dir.path().join("memory.sqlite").display());
        SqliteStore::new(&url).await.unwrap()
    }

    async fn version(db: &SqliteStore, agent_id: &str) -> i64 {
        sqlx::query_scalar("SELECT version FROM agents WHERE agent_id = ?1")
            .bind(agent_id)
            .fetch_one(&db.pool)
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn heavily_contended_merges_all_apply() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(file_store(&dir).await);
        db.initialize(core("a1")).await.unwrap();

        let writers = 64;
        let handles: Vec<_> = (0..writers)
            .map(|i| {
                let db = db.clone();
                tokio::spawn(async move { db.add_directive("a1", &format!("directive {i}")).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let stored = CoreMemoryStore::get(db.as_ref(), "a1").await.unwrap();
        assert_eq!(stored.directives.len(), writers.min(MAX_DIRECTIVES));
        assert_eq!(version(&db, "a1").await, writers as i64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn merges_from_separate_stores_retry_instead_of_losing_updates() {
        let dir = tempfile::tempdir().unwrap();
        let first = Arc::new(file_store(&dir).await);
        let second = Arc::new(file_store(&dir).await);
        first.initialize(core("a1")).await.unwrap();

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let db = if i % 2 == 0 { first.clone() } else { second.clone() };
                tokio::spawn(async move { db.add_pin("a1", &format!("fact {i}")).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let stored = CoreMemoryStore::get(first.as_ref(), "a1").await.unwrap();
        assert_eq!(stored.pinned_facts.len(), MAX_PINNED_FACTS);
        assert_eq!(version(&first, "a1").await, 32);
    }

    #[tokio::test]
    async fn delete_agent() {
        let db = test_store().await;
        db.initialize(core("a1")).await.unwrap();
        assert!(db.delete("a1").await.unwrap());
        assert!(!db.delete("a1").await.unwrap());
    }

    #[tokio::test]
    async fn recall_orders_by_importance_then_recency() {
        let db = test_store().await;
        let mut old_important = episode("a1", "old but important", 9);
        old_important.created_at = Utc::now() - chrono::Duration::days(30);
        db.write(old_important).await.unwrap();

        let mut older = episode("a1", "older", 5);
        older.created_at = Utc::now() - chrono::Duration::hours(1);
        db.write(older).await.unwrap();
        db.write(episode("a1", "newer", 5)).await.unwrap();
        db.write(episode("a1", "trivial", 2)).await.unwrap();
        db.write(episode("a2", "someone else", 10)).await.unwrap();

        let recalled = db.recall("a1", &RecallQuery::default()).await.unwrap();
        let order: Vec<&str> = recalled.iter().map(|e| e.summary.as_str()).collect();
        assert_eq!(order, vec!["old but important", "newer", "older"]);
    }

    #[tokio::test]
    async fn recall_filters_by_kind_and_limit() {
        let db = test_store().await;
        db.write(episode("a1", "done", 6)).await.unwrap();
        db.write(Episode::new(
            "a1",
            "org",
            EpisodeKind::Correction,
            Outcome::Partial,
            "use the EU region",
            3,
        ))
        .await
        .unwrap();

        let query = RecallQuery {
            kind: Some(EpisodeKind::Correction),
            ..Default::default()
        };
        let recalled = db.recall("a1", &query).await.unwrap();
        assert_eq!(recalled.len(), 1);
        assert_eq!(recalled[0].importance, 9);

        let limited = RecallQuery {
            limit: 1,
            ..Default::default()
        };
        assert_eq!(db.recall("a1", &limited).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn write_clamps_and_boost_clamps() {
        let db = test_store().await;
        let id = db.write(episode("a1", "x", 11)).await.unwrap();
        let stored = EpisodicStore::get(&db, &id).await.unwrap().unwrap();
        assert_eq!(stored.importance, 10);

        assert!(db.boost(&id, 0).await.unwrap());
        let stored = EpisodicStore::get(&db, &id).await.unwrap().unwrap();
        assert_eq!(stored.importance, 1);

        assert!(!db.boost("missing", 7).await.unwrap());
    }

    #[tokio::test]
    async fn episode_metadata_and_task_survive() {
        let db = test_store().await;
        let ep = episode("a1", "shipped", 5)
            .with_task("t-42")
            .with_metadata("goal", serde_json::json!("launch"));
        let id = db.write(ep).await.unwrap();

        let stored = EpisodicStore::get(&db, &id).await.unwrap().unwrap();
        assert_eq!(stored.task_id.as_deref(), Some("t-42"));
        assert_eq!(stored.metadata["goal"], "launch");
    }

    #[tokio::test]
    async fn record_access_increments() {
        let db = test_store().await;
        let id = db.write(episode("a1", "x", 5)).await.unwrap();
        db.record_access(std::slice::from_ref(&id)).await.unwrap();
        db.record_access(std::slice::from_ref(&id)).await.unwrap();
        let stored = EpisodicStore::get(&db, &id).await.unwrap().unwrap();
        assert_eq!(stored.access_count, 2);
    }

    #[tokio::test]
    async fn semantic_nearest_is_org_scoped_and_ranked() {
        let db = test_store().await;
        let opts = SaveOptions::default();
        db.insert(SemanticFragment::new("org", None, "close", vec![1.0, 0.0], &opts))
            .await
            .unwrap();
        db.insert(SemanticFragment::new("org", None, "far", vec![0.0, 1.0], &opts))
            .await
            .unwrap();
        db.insert(SemanticFragment::new("other", None, "foreign", vec![1.0, 0.0], &opts))
            .await
            .unwrap();

        let results = db
            .nearest("org", &[1.0, 0.0], &SearchOptions::default())
            .await
            .unwrap();
        let order: Vec<&str> = results.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(order, vec!["close", "far"]);
        assert!((results[0].similarity.unwrap() - 1.0).abs() < 1e-6);
        assert_eq!(results[0].embedding, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn semantic_filters_scope_and_importance() {
        let db = test_store().await;
        let domain = SaveOptions {
            scope: Scope::Domain,
            importance: 8,
            ..Default::default()
        };
        db.insert(SemanticFragment::new("org", None, "domain fact", vec![1.0], &domain))
            .await
            .unwrap();
        db.insert(SemanticFragment::new(
            "org",
            None,
            "minor fact",
            vec![1.0],
            &SaveOptions {
                importance: 2,
                ..Default::default()
            },
        ))
        .await
        .unwrap();

        let opts = SearchOptions {
            scope: Some(Scope::Domain),
            ..Default::default()
        };
        let results = db.nearest("org", &[1.0], &opts).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "domain fact");

        let floor = SearchOptions {
            min_importance: 5,
            ..Default::default()
        };
        assert_eq!(db.recent("org", &floor).await.unwrap().len(), 1);
        assert_eq!(db.count("org").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn semantic_recent_is_newest_first() {
        let db = test_store().await;
        let opts = SaveOptions::default();
        let mut old = SemanticFragment::new("org", None, "old", vec![1.0], &opts);
        old.created_at = Utc::now() - chrono::Duration::days(1);
        db.insert(old).await.unwrap();
        db.insert(SemanticFragment::new("org", None, "new", vec![1.0], &opts))
            .await
            .unwrap();

        let results = db
            .recent(
                "org",
                &SearchOptions {
                    limit: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "new");
        assert!(results[0].similarity.is_none());
    }

    #[tokio::test]
    async fn working_read_keeps_most_recent_oldest_first() {
        let db = test_store().await;
        for i in 0..6 {
            db.append("a1", "t1", WorkingEntry::user(format!("turn {i}")))
                .await
                .unwrap();
        }
        let entries = db.read("a1", "t1", 4).await.unwrap();
        let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["turn 2", "turn 3", "turn 4", "turn 5"]);

        db.clear("a1", "t1").await.unwrap();
        assert!(db.read("a1", "t1", 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn working_expires_and_purges() {
        let db = test_store().await.with_ttl(Duration::ZERO);
        db.append("a1", "t1", WorkingEntry::assistant("gone soon"))
            .await
            .unwrap();
        db.append("a1", "t2", WorkingEntry::assistant("also gone"))
            .await
            .unwrap();

        assert!(db.read("a1", "t1", 10).await.unwrap().is_empty());
        assert_eq!(db.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn append_extends_the_deadline() {
        let db = test_store().await.with_ttl(Duration::from_secs(1));
        db.append("a1", "t1", WorkingEntry::user("start"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(600)).await;
        db.append("a1", "t1", WorkingEntry::assistant("still working"))
            .await
            .unwrap();

        // Past the first deadline, inside the refreshed one.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(db.read("a1", "t1", 10).await.unwrap().len(), 2);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(db.read("a1", "t1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expiry_spares_a_refreshed_log() {
        let db = test_store().await.with_ttl(Duration::from_secs(3600));
        db.append("a1", "t1", WorkingEntry::user("fresh"))
            .await
            .unwrap();

        // A reader that judged the log expired against an older deadline.
        let stale_now = timestamp(Utc::now());
        assert!(!db.expire_task("a1", "t1", &stale_now).await.unwrap());
        assert_eq!(db.read("a1", "t1", 10).await.unwrap().len(), 1);

        let far_future = timestamp(Utc::now() + chrono::Duration::days(1));
        assert!(db.expire_task("a1", "t1", &far_future).await.unwrap());
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM working_entries")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = test_store().await;
        db.run_migrations().await.unwrap();
        assert_eq!(CoreMemoryStore::name(&db), "sqlite");
    }

    #[test]
    fn timestamps_sort_lexically() {
        use chrono::SubsecRound;
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::milliseconds(1);
        assert!(timestamp(earlier) < timestamp(later));
        assert_eq!(parse_timestamp(&timestamp(earlier)), earlier.trunc_subsecs(6));
    }
}
