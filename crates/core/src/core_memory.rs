//! Core memory: the durable identity record of one agent.
//!
//! Holds who the agent is, the organization it works for, its active
//! directives and a handful of pinned facts. Every assembled context starts
//! from this record, so a missing record is a hard failure
//! ([`MemoryError::NotFound`]) rather than an empty default.
//!
//! Updates go through [`CorePatch`], a typed partial update per field
//! group. A patch touches only the fields it names; siblings are kept.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// Directives kept per agent (oldest dropped first).
pub const MAX_DIRECTIVES: usize = 10;

/// Pinned facts kept per agent (oldest dropped first).
pub const MAX_PINNED_FACTS: usize = 20;

/// Who the agent is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub persona: String,
}

/// The organization that owns the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub industry: String,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// The durable per-agent record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreMemory {
    pub agent_id: String,
    pub identity: Identity,
    pub organization: OrganizationProfile,
    /// Active directives, oldest first. Bounded to [`MAX_DIRECTIVES`].
    #[serde(default)]
    pub directives: Vec<String>,
    /// Pinned facts, oldest first. Bounded to [`MAX_PINNED_FACTS`].
    #[serde(default)]
    pub pinned_facts: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl CoreMemory {
    pub fn new(
        agent_id: impl Into<String>,
        identity: Identity,
        organization: OrganizationProfile,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            identity,
            organization,
            directives: Vec::new(),
            pinned_facts: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Apply a patch in place, trimming bounded lists.
    pub fn apply(&mut self, patch: CorePatch) {
        match patch {
            CorePatch::Identity(p) => p.apply_to(&mut self.identity),
            CorePatch::Organization(p) => p.apply_to(&mut self.organization),
            CorePatch::AddDirective(text) => {
                self.directives.push(text);
                keep_last(&mut self.directives, MAX_DIRECTIVES);
            }
            CorePatch::AddPin(fact) => {
                self.pinned_facts.push(fact);
                keep_last(&mut self.pinned_facts, MAX_PINNED_FACTS);
            }
        }
        self.updated_at = Utc::now();
    }
}

fn keep_last(items: &mut Vec<String>, max: usize) {
    if items.len() > max {
        let excess = items.len() - max;
        items.drain(..excess);
    }
}

/// A typed partial update to a [`CoreMemory`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum CorePatch {
    Identity(IdentityPatch),
    Organization(OrganizationPatch),
    AddDirective(String),
    AddPin(String),
}

/// Partial identity update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
}

impl IdentityPatch {
    fn apply_to(self, identity: &mut Identity) {
        if let Some(name) = self.name {
            identity.name = name;
        }
        if let Some(role) = self.role {
            identity.role = role;
        }
        if let Some(persona) = self.persona {
            identity.persona = persona;
        }
    }
}

/// Partial organization update. `values`, when present, replaces the list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

impl OrganizationPatch {
    fn apply_to(self, org: &mut OrganizationProfile) {
        if let Some(name) = self.name {
            org.name = name;
        }
        if let Some(description) = self.description {
            org.description = description;
        }
        if let Some(industry) = self.industry {
            org.industry = industry;
        }
        if let Some(stage) = self.stage {
            org.stage = stage;
        }
        if let Some(values) = self.values {
            org.values = values;
        }
    }
}

/// Durable store for core memory records.
///
/// Implementations must serialize concurrent merges on the same agent so
/// that no update is lost.
#[async_trait]
pub trait CoreMemoryStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Create or replace the record for `memory.agent_id`.
    async fn initialize(&self, memory: CoreMemory) -> Result<(), MemoryError>;

    /// Fetch the record. Missing records yield [`MemoryError::NotFound`].
    async fn get(&self, agent_id: &str) -> Result<CoreMemory, MemoryError>;

    /// Apply a patch to an existing record and return the result.
    ///
    /// Never creates a record: a missing agent yields `NotFound`.
    async fn merge(&self, agent_id: &str, patch: CorePatch) -> Result<CoreMemory, MemoryError>;

    /// Remove the record. Returns `true` if one existed.
    async fn delete(&self, agent_id: &str) -> Result<bool, MemoryError>;

    /// Append a directive, keeping the last [`MAX_DIRECTIVES`].
    async fn add_directive(&self, agent_id: &str, text: &str) -> Result<CoreMemory, MemoryError> {
        self.merge(agent_id, CorePatch::AddDirective(text.to_string()))
            .await
    }

    /// Append a pinned fact, keeping the last [`MAX_PINNED_FACTS`].
    async fn add_pin(&self, agent_id: &str, fact: &str) -> Result<CoreMemory, MemoryError> {
        self.merge(agent_id, CorePatch::AddPin(fact.to_string()))
            .await
    }
}
