//! Semantic memory: organization-scoped, vector-indexed knowledge.
//!
//! [`SemanticStore`] is the backing index: it persists fragments together
//! with their embedding and answers nearest-neighbour queries. Computing
//! embeddings is the job of the service layer in `agentmem-memory`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::episode::clamp_importance;
use crate::error::MemoryError;

/// Visibility boundary of a fragment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    Organization,
    Agent,
    Domain,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Agent => "agent",
            Self::Domain => "domain",
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organization" => Ok(Self::Organization),
            "agent" => Ok(Self::Agent),
            "domain" => Ok(Self::Domain),
            other => Err(format!("unknown scope: {other}")),
        }
    }
}

/// A piece of knowledge with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticFragment {
    pub id: String,
    pub org_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub content: String,
    /// Fixed-dimension embedding (stored as blob in DB).
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub scope: Scope,
    pub source_type: String,
    pub importance: u8,
    pub created_at: DateTime<Utc>,
    /// Cosine similarity to the query. Only set on search results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

impl SemanticFragment {
    pub fn new(
        org_id: impl Into<String>,
        agent_id: Option<String>,
        content: impl Into<String>,
        embedding: Vec<f32>,
        options: &SaveOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            org_id: org_id.into(),
            agent_id,
            content: content.into(),
            embedding,
            scope: options.scope,
            source_type: options.source_type.clone(),
            importance: clamp_importance(options.importance),
            created_at: Utc::now(),
            similarity: None,
        }
    }
}

/// How a fragment is filed when saved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveOptions {
    #[serde(default)]
    pub scope: Scope,
    #[serde(default = "default_source_type")]
    pub source_type: String,
    #[serde(default = "default_importance")]
    pub importance: u8,
}

fn default_source_type() -> String {
    "manual".into()
}

fn default_importance() -> u8 {
    5
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            scope: Scope::default(),
            source_type: default_source_type(),
            importance: default_importance(),
        }
    }
}

/// Query shape for semantic search and its recency fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Restrict to one scope; `None` searches every scope in the org.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    #[serde(default = "default_min_importance")]
    pub min_importance: u8,
}

fn default_limit() -> usize {
    5
}

fn default_min_importance() -> u8 {
    1
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            scope: None,
            min_importance: default_min_importance(),
        }
    }
}

impl SearchOptions {
    /// `true` if the fragment passes the scope and importance filters.
    /// Organization membership is checked separately.
    pub fn matches(&self, fragment: &SemanticFragment) -> bool {
        fragment.importance >= self.min_importance
            && self.scope.is_none_or(|s| s == fragment.scope)
    }
}

/// Backing index for semantic fragments.
#[async_trait]
pub trait SemanticStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Persist a fragment with its embedding. Returns its id.
    async fn insert(&self, fragment: SemanticFragment) -> Result<String, MemoryError>;

    /// Fragments of `org_id` ranked by cosine similarity to
    /// `query_embedding`, with `similarity` populated.
    async fn nearest(
        &self,
        org_id: &str,
        query_embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SemanticFragment>, MemoryError>;

    /// Most recent fragments of `org_id`, newest first. No similarity.
    async fn recent(
        &self,
        org_id: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SemanticFragment>, MemoryError>;

    /// Number of fragments stored for `org_id`.
    async fn count(&self, org_id: &str) -> Result<usize, MemoryError>;
}
