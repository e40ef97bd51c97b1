//! Memory store implementations for agentmem.
//!
//! - [`in_memory`] — all durable tiers in process, for tests and embedding
//! - [`working`] — TTL-bound in-process working memory
//! - [`sqlite`] — one SQLite database implementing every store trait
//! - [`semantic`] — embedding-aware service over a [`SemanticStore`](agentmem_core::SemanticStore)
//! - [`access`] — asynchronous access-count bookkeeping for recalled episodes

pub mod access;
pub mod in_memory;
pub mod semantic;
pub mod vector;
pub mod working;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use access::{AccessTracker, TrackingEpisodicStore};
pub use in_memory::{InMemoryCoreStore, InMemoryEpisodicStore, InMemorySemanticStore};
pub use semantic::{RetrievalMode, SemanticMemory, SemanticResults};
pub use vector::{cosine_similarity, rank_by_similarity};
pub use working::InMemoryWorkingStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
