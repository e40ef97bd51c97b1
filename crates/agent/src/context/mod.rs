//! Context assembly from the four memory tiers.
//!
//! # Sections (fixed order)
//!
//! | Section | Tier | Trim strategy |
//! |---------|------|---------------|
//! | Identity, Organization, Directives, Pinned Facts | Core | Never trimmed |
//! | Past Experience | Episodic | Cut to first `trim_to` when over budget |
//! | Company Knowledge | Semantic | Cut to first `trim_to` when over budget |
//! | Current Task Transcript | Working | Never trimmed |

pub mod assembler;
pub mod token;

pub use assembler::{
    AssembledContext, AssemblyError, AssemblyOptions, ContextAssembler, DropInfo, LayerStats,
};
