//! Post-task consolidation.
//!
//! Turns the end of a task into durable memory: one episode always, a
//! semantic fragment when a successful result is substantial, and a
//! cleared transcript. The episode is the record of what happened, so its
//! failure is returned. Promotion and clearing are best effort.

use agentmem_config::ConsolidationConfig;
use agentmem_core::episode::{Episode, EpisodeKind, Outcome};
use agentmem_core::error::MemoryError;
use agentmem_core::semantic::{SaveOptions, Scope};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::tiers::MemoryTiers;

/// Source type recorded on fragments promoted from task results.
pub const TASK_RESULT_SOURCE: &str = "task_result";

/// Which task is being consolidated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationRequest {
    pub agent_id: String,
    pub org_id: String,
    pub task_id: String,
    #[serde(default = "default_importance")]
    pub importance: u8,
}

fn default_importance() -> u8 {
    5
}

impl ConsolidationRequest {
    pub fn new(
        agent_id: impl Into<String>,
        org_id: impl Into<String>,
        task_id: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            org_id: org_id.into(),
            task_id: task_id.into(),
            importance: default_importance(),
        }
    }

    pub fn with_importance(mut self, importance: u8) -> Self {
        self.importance = importance;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsolidationReport {
    pub episode_id: String,
    pub promoted: bool,
    pub working_cleared: bool,
}

#[derive(Debug, Error)]
pub enum ConsolidationError {
    #[error("failed to record episode for {agent_id}: {source}")]
    EpisodeWrite {
        agent_id: String,
        #[source]
        source: MemoryError,
    },

    #[error("consolidation task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A consolidation running on its own task.
pub struct ConsolidationHandle(JoinHandle<Result<ConsolidationReport, ConsolidationError>>);

impl ConsolidationHandle {
    pub async fn wait(self) -> Result<ConsolidationReport, ConsolidationError> {
        self.0.await?
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

#[derive(Clone)]
pub struct Consolidator {
    tiers: MemoryTiers,
    config: ConsolidationConfig,
}

impl Consolidator {
    pub fn new(tiers: MemoryTiers, config: ConsolidationConfig) -> Self {
        Self { tiers, config }
    }

    /// Record the outcome of a finished task.
    ///
    /// The episode write and the promotion run concurrently; the
    /// transcript is cleared after both. When the episode write fails the
    /// transcript is left for TTL reclamation.
    pub async fn consolidate(
        &self,
        result_text: &str,
        goal: &str,
        success: bool,
        request: &ConsolidationRequest,
    ) -> Result<ConsolidationReport, ConsolidationError> {
        let episode = self.episode(result_text, goal, success, request);
        let should_promote =
            success && result_text.chars().count() > self.config.min_promotion_chars;

        let (written, promoted) = tokio::join!(
            self.tiers.episodic.write(episode),
            self.promote(result_text, request, should_promote),
        );

        let episode_id = written.map_err(|source| {
            warn!(
                agent_id = %request.agent_id,
                task_id = %request.task_id,
                error = %source,
                "Episode write failed, keeping working memory"
            );
            ConsolidationError::EpisodeWrite {
                agent_id: request.agent_id.clone(),
                source,
            }
        })?;

        let working_cleared = match self
            .tiers
            .working
            .clear(&request.agent_id, &request.task_id)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    agent_id = %request.agent_id,
                    task_id = %request.task_id,
                    error = %e,
                    "Failed to clear working memory"
                );
                false
            }
        };

        info!(
            agent_id = %request.agent_id,
            task_id = %request.task_id,
            episode_id = %episode_id,
            success,
            promoted,
            "Task consolidated"
        );

        Ok(ConsolidationReport {
            episode_id,
            promoted,
            working_cleared,
        })
    }

    /// Run [`consolidate`](Self::consolidate) on a spawned task.
    pub fn spawn(
        &self,
        result_text: String,
        goal: String,
        success: bool,
        request: ConsolidationRequest,
    ) -> ConsolidationHandle {
        let this = self.clone();
        ConsolidationHandle(tokio::spawn(async move {
            this.consolidate(&result_text, &goal, success, &request).await
        }))
    }

    fn episode(
        &self,
        result_text: &str,
        goal: &str,
        success: bool,
        request: &ConsolidationRequest,
    ) -> Episode {
        let (kind, outcome, importance) = if success {
            (EpisodeKind::TaskComplete, Outcome::Success, request.importance)
        } else {
            (
                EpisodeKind::TaskFailed,
                Outcome::Failure,
                request.importance.saturating_add(self.config.failure_bonus),
            )
        };

        let excerpt = truncate_chars(result_text.trim(), self.config.summary_chars);
        let summary = if excerpt.is_empty() {
            goal.to_string()
        } else {
            format!("{goal}: {excerpt}")
        };

        Episode::new(
            &request.agent_id,
            &request.org_id,
            kind,
            outcome,
            summary,
            importance,
        )
        .with_task(&request.task_id)
        .with_metadata("goal", serde_json::Value::from(goal))
        .with_metadata(
            "result_chars",
            serde_json::Value::from(result_text.chars().count()),
        )
    }

    async fn promote(
        &self,
        result_text: &str,
        request: &ConsolidationRequest,
        should_promote: bool,
    ) -> bool {
        if !should_promote {
            return false;
        }
        let content = truncate_chars(result_text, self.config.summary_chars);
        let options = SaveOptions {
            scope: Scope::Organization,
            source_type: TASK_RESULT_SOURCE.into(),
            importance: request.importance,
        };
        match self
            .tiers
            .semantic
            .save(&request.org_id, Some(&request.agent_id), content, options)
            .await
        {
            Ok(id) => {
                debug!(fragment_id = %id, agent_id = %request.agent_id, "Promoted task result");
                true
            }
            Err(e) => {
                warn!(
                    agent_id = %request.agent_id,
                    task_id = %request.task_id,
                    error = %e,
                    "Semantic promotion failed"
                );
                false
            }
        }
    }
}

/// The first `max` characters of `text`, on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
