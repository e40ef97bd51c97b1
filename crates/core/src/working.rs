//! Working memory: the live transcript of one task.
//!
//! Entries are scoped to exactly one (agent, task) pair, read back in
//! insertion order, and expire after a fixed TTL unless the task keeps
//! appending. Expiry is the only thing that reclaims abandoned tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::MemoryError;

/// Default time-to-live of a task log after its last append (4 hours).
pub const DEFAULT_TTL: Duration = Duration::from_secs(4 * 60 * 60);

/// Who produced a working-memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkingRole {
    User,
    Assistant,
    System,
    ToolResult,
}

impl WorkingRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::ToolResult => "tool_result",
        }
    }
}

impl std::str::FromStr for WorkingRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            "tool_result" => Ok(Self::ToolResult),
            other => Err(format!("unknown working-memory role: {other}")),
        }
    }
}

/// A single turn in a task transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingEntry {
    pub role: WorkingRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl WorkingEntry {
    pub fn new(role: WorkingRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(WorkingRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(WorkingRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(WorkingRole::System, content)
    }

    pub fn tool_result(content: impl Into<String>) -> Self {
        Self::new(WorkingRole::ToolResult, content)
    }
}

/// Ephemeral, TTL-bound store of task transcripts.
#[async_trait]
pub trait WorkingMemoryStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Append an entry and reset the TTL of the (agent, task) log.
    async fn append(
        &self,
        agent_id: &str,
        task_id: &str,
        entry: WorkingEntry,
    ) -> Result<(), MemoryError>;

    /// Read at most the `max_entries` most recent entries, oldest first.
    ///
    /// An expired log reads as empty.
    async fn read(
        &self,
        agent_id: &str,
        task_id: &str,
        max_entries: usize,
    ) -> Result<Vec<WorkingEntry>, MemoryError>;

    /// Drop the (agent, task) log.
    async fn clear(&self, agent_id: &str, task_id: &str) -> Result<(), MemoryError>;

    /// Eagerly drop every expired log. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [
            WorkingRole::User,
            WorkingRole::Assistant,
            WorkingRole::System,
            WorkingRole::ToolResult,
        ] {
            assert_eq!(role.as_str().parse::<WorkingRole>().unwrap(), role);
        }
        assert!("narrator".parse::<WorkingRole>().is_err());
    }

    #[test]
    fn entry_serializes_snake_case_role() {
        let json = serde_json::to_string(&WorkingEntry::tool_result("42 rows")).unwrap();
        assert!(json.contains("\"tool_result\""));
    }
}
