//! Episodic memory: ranked records of past task outcomes.
//!
//! Episodes are append-only. The only mutation is [`EpisodicStore::boost`],
//! which raises importance, and the advisory access counter.
//!
//! Importance is clamped to `1..=10` at the store boundary for every write
//! and boost. Corrections are always stored at [`CORRECTION_IMPORTANCE`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MemoryError;

pub const MIN_IMPORTANCE: u8 = 1;
pub const MAX_IMPORTANCE: u8 = 10;

/// Fixed importance of every `correction` episode.
pub const CORRECTION_IMPORTANCE: u8 = 9;

/// Clamp an importance value onto the `1..=10` scale.
pub fn clamp_importance(value: u8) -> u8 {
    value.clamp(MIN_IMPORTANCE, MAX_IMPORTANCE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeKind {
    TaskComplete,
    TaskFailed,
    Decision,
    Correction,
    Learning,
}

impl EpisodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskComplete => "task_complete",
            Self::TaskFailed => "task_failed",
            Self::Decision => "decision",
            Self::Correction => "correction",
            Self::Learning => "learning",
        }
    }
}

impl std::str::FromStr for EpisodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task_complete" => Ok(Self::TaskComplete),
            "task_failed" => Ok(Self::TaskFailed),
            "decision" => Ok(Self::Decision),
            "correction" => Ok(Self::Correction),
            "learning" => Ok(Self::Learning),
            other => Err(format!("unknown episode type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Partial,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Partial => "partial",
        }
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "partial" => Ok(Self::Partial),
            other => Err(format!("unknown outcome: {other}")),
        }
    }
}

/// A record of something that happened to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub agent_id: String,
    pub org_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: EpisodeKind,
    pub summary: String,
    pub outcome: Outcome,
    pub importance: u8,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Advisory read counter, bumped asynchronously after recall.
    #[serde(default)]
    pub access_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Episode {
    pub fn new(
        agent_id: impl Into<String>,
        org_id: impl Into<String>,
        kind: EpisodeKind,
        outcome: Outcome,
        summary: impl Into<String>,
        importance: u8,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            org_id: org_id.into(),
            task_id: None,
            kind,
            summary: summary.into(),
            outcome,
            importance,
            metadata: serde_json::Map::new(),
            access_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Apply the store-boundary rules: corrections pin to
    /// [`CORRECTION_IMPORTANCE`], everything else is clamped to `1..=10`.
    /// An empty id is replaced with a fresh one.
    pub fn normalized(mut self) -> Self {
        if self.id.is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        self.importance = match self.kind {
            EpisodeKind::Correction => CORRECTION_IMPORTANCE,
            _ => clamp_importance(self.importance),
        };
        self
    }
}

/// Filters for [`EpisodicStore::recall`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Episodes below this importance are invisible to recall.
    #[serde(default = "default_min_importance")]
    pub min_importance: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EpisodeKind>,
}

fn default_limit() -> usize {
    10
}

fn default_min_importance() -> u8 {
    3
}

impl Default for RecallQuery {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            min_importance: default_min_importance(),
            kind: None,
        }
    }
}

impl RecallQuery {
    /// `true` if the episode passes the importance floor and type filter.
    pub fn matches(&self, episode: &Episode) -> bool {
        episode.importance >= self.min_importance
            && self.kind.is_none_or(|k| k == episode.kind)
    }
}

/// Ordering used by recall: importance descending, then recency descending.
pub fn recall_order(a: &Episode, b: &Episode) -> std::cmp::Ordering {
    b.importance
        .cmp(&a.importance)
        .then_with(|| b.created_at.cmp(&a.created_at))
}

/// Durable, append-only store of episodes.
#[async_trait]
pub trait EpisodicStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Persist an episode (normalised first). Returns its id.
    async fn write(&self, episode: Episode) -> Result<String, MemoryError>;

    /// Episodes of one agent ordered by importance, then recency.
    async fn recall(
        &self,
        agent_id: &str,
        query: &RecallQuery,
    ) -> Result<Vec<Episode>, MemoryError>;

    /// Set importance to `new_importance` clamped to `1..=10`.
    ///
    /// Does not enforce non-decrease; callers only ever boost upward.
    /// Returns `false` if the episode does not exist.
    async fn boost(&self, episode_id: &str, new_importance: u8) -> Result<bool, MemoryError>;

    /// Get an episode by id.
    async fn get(&self, episode_id: &str) -> Result<Option<Episode>, MemoryError>;

    /// Increment the advisory access counter of each episode.
    async fn record_access(&self, episode_ids: &[String]) -> Result<(), MemoryError>;
}
