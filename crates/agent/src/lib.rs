//! The two pipelines that sit between an agent and its memory.
//!
//! 1. **Before a task**: [`ContextAssembler`] reads every tier and renders
//!    one prompt-ready block within a token budget.
//! 2. **After a task**: [`Consolidator`] records an episode, promotes
//!    substantial results to semantic memory, and clears the transcript.
//!
//! Both share a [`MemoryTiers`] bundle built from configuration.

pub mod consolidation;
pub mod context;
pub mod tiers;

pub use consolidation::{
    ConsolidationError, ConsolidationHandle, ConsolidationReport, ConsolidationRequest,
    Consolidator,
};
pub use context::{
    AssembledContext, AssemblyError, AssemblyOptions, ContextAssembler, DropInfo, LayerStats,
};
pub use tiers::MemoryTiers;
