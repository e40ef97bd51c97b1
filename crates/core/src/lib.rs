//! # agentmem core
//!
//! Domain types, store traits, and error definitions for layered agent
//! memory. This crate has **no storage or network dependencies**. It
//! defines the model that every other crate implements against.
//!
//! ## Tiers
//!
//! | Tier | Lifetime | Retrieval |
//! |------|----------|-----------|
//! | Core | durable, one record per agent | by agent id |
//! | Working | ephemeral, per (agent, task), TTL-bound | most recent N, oldest first |
//! | Episodic | durable, append-only | importance desc, then recency desc |
//! | Semantic | durable, vector-indexed | cosine similarity within an organization |
//!
//! Every store is a trait here so implementations can be swapped via
//! configuration and replaced with in-memory versions in tests.

pub mod core_memory;
pub mod embedding;
pub mod episode;
pub mod error;
pub mod semantic;
pub mod working;

// Re-export key types at crate root for ergonomics
pub use core_memory::{
    CoreMemory, CoreMemoryStore, CorePatch, Identity, IdentityPatch, OrganizationPatch,
    OrganizationProfile, MAX_DIRECTIVES, MAX_PINNED_FACTS,
};
pub use embedding::{Embedder, EmbeddingCache};
pub use episode::{
    clamp_importance, recall_order, Episode, EpisodeKind, EpisodicStore, Outcome, RecallQuery,
    CORRECTION_IMPORTANCE, MAX_IMPORTANCE, MIN_IMPORTANCE,
};
pub use error::{EmbeddingError, Error, MemoryError, Result};
pub use semantic::{SaveOptions, Scope, SearchOptions, SemanticFragment, SemanticStore};
pub use working::{WorkingEntry, WorkingMemoryStore, WorkingRole, DEFAULT_TTL};
