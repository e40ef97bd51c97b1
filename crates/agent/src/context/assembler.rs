//! Context assembly pipeline.
//!
//! Loads the four tiers concurrently and renders them into one text block:
//!
//! 1. **Core** (identity, organization, directives, pinned facts): required, never trimmed
//! 2. **Past Experience** (episodes): optional, cut to `trim_to` when over budget
//! 3. **Company Knowledge** (semantic fragments): optional, cut to `trim_to` when over budget
//! 4. **Current Task Transcript** (working memory): always rendered in full
//!
//! The transcript goes last so it sits next to the task instruction the
//! caller appends.
//!
//! # Budget
//!
//! The estimate is checked once. If it exceeds `max_tokens`, episodes and
//! fragments are cut to their first `trim_to` entries, the text is
//! re-rendered and re-estimated, and the result is returned even if still
//! over. Core and working memory are never cut.
//!
//! # Determinism
//!
//! Rendering is deterministic: identical tier contents always produce
//! identical text.

use crate::context::token;
use crate::tiers::MemoryTiers;
use agentmem_config::{AppConfig, AssemblyConfig, EphemeralStoreConfig};
use agentmem_core::core_memory::CoreMemory;
use agentmem_core::episode::{Episode, RecallQuery};
use agentmem_core::error::MemoryError;
use agentmem_core::semantic::{SearchOptions, SemanticFragment};
use agentmem_core::working::WorkingEntry;
use agentmem_memory::RetrievalMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

// ── Types ─────────────────────────────────────────────────────────────────

/// Per-call switches. Tier limits and `trim_to` belong to the assembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyOptions {
    pub max_tokens: usize,
    pub include_episodes: bool,
    pub include_semantic: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            max_tokens: AssemblyConfig::default().max_tokens,
            include_episodes: true,
            include_semantic: true,
        }
    }
}

impl AssemblyOptions {
    pub fn from_config(config: &AssemblyConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            ..Self::default()
        }
    }
}

/// The assembled context for one task invocation. Rebuilt on every call.
#[derive(Debug, Clone, Serialize)]
pub struct AssembledContext {
    pub core: CoreMemory,
    pub working: Vec<WorkingEntry>,
    pub episodes: Vec<Episode>,
    pub semantic: Vec<SemanticFragment>,
    /// How the semantic tier was retrieved. `None` when not requested.
    pub semantic_mode: Option<RetrievalMode>,
    pub text: String,
    pub token_estimate: usize,
    /// The over-budget trim pass ran.
    pub trimmed: bool,
    pub layers: Vec<LayerStats>,
    pub drops: Vec<DropInfo>,
}

/// Statistics for a single rendered section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerStats {
    /// Layer name.
    pub name: String,
    /// Tokens consumed by this layer.
    pub tokens: usize,
    /// Items rendered.
    pub items_included: usize,
    /// Items loaded before trimming.
    pub items_total: usize,
}

/// Items removed from a layer by the trim pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropInfo {
    pub layer: String,
    pub items_dropped: usize,
    /// Estimated tokens of dropped content.
    pub tokens_dropped: usize,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    /// No core record: the agent cannot act without an identity.
    #[error("agent not initialized: {agent_id}")]
    AgentNotInitialized { agent_id: String },

    #[error("core memory unavailable for {agent_id}: {source}")]
    CoreUnavailable {
        agent_id: String,
        #[source]
        source: MemoryError,
    },
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Builds an [`AssembledContext`] from the tiers. Cheap to clone and reuse.
#[derive(Clone)]
pub struct ContextAssembler {
    tiers: MemoryTiers,
    config: AssemblyConfig,
    working_entries: usize,
}

impl ContextAssembler {
    pub fn new(tiers: MemoryTiers, config: AssemblyConfig) -> Self {
        Self {
            tiers,
            config,
            working_entries: EphemeralStoreConfig::default().max_entries,
        }
    }

    /// Assembler driven by the `[assembly]` section, reading up to
    /// `ephemeral.max_entries` working entries per task.
    pub fn from_config(tiers: MemoryTiers, config: &AppConfig) -> Self {
        Self::new(tiers, config.assembly.clone()).with_working_entries(config.ephemeral.max_entries)
    }

    /// Number of most recent working-memory entries to read.
    pub fn with_working_entries(mut self, max_entries: usize) -> Self {
        self.working_entries = max_entries;
        self
    }

    /// Assemble context for one task.
    ///
    /// # Algorithm
    ///
    /// 1. Load core, working, episodic and semantic tiers concurrently
    /// 2. Core missing → [`AssemblyError::AgentNotInitialized`]; any other
    ///    core failure → [`AssemblyError::CoreUnavailable`]
    /// 3. Other tier failures degrade to empty with a warning
    /// 4. Render, estimate, and trim once if over budget
    pub async fn assemble(
        &self,
        agent_id: &str,
        org_id: &str,
        task_goal: &str,
        task_id: &str,
        options: &AssemblyOptions,
    ) -> Result<AssembledContext, AssemblyError> {
        let (core, working, episodes, (semantic, semantic_mode)) = tokio::join!(
            self.tiers.core.get(agent_id),
            self.load_working(agent_id, task_id),
            self.load_episodes(agent_id, options.include_episodes),
            self.load_semantic(org_id, task_goal, options.include_semantic),
        );

        let core = core.map_err(|e| {
            if e.is_not_found() {
                AssemblyError::AgentNotInitialized {
                    agent_id: agent_id.to_string(),
                }
            } else {
                AssemblyError::CoreUnavailable {
                    agent_id: agent_id.to_string(),
                    source: e,
                }
            }
        })?;

        let mut episodes = episodes;
        let mut semantic = semantic;
        let episodes_total = episodes.len();
        let semantic_total = semantic.len();

        let mut rendered = render(&core, &episodes, &semantic, &working);
        let mut token_estimate = token::estimate_tokens(&rendered.text);
        let mut trimmed = false;
        let mut drops = Vec::new();

        // ── Single trim pass ───────────────────────────────────────────────
        if token_estimate > options.max_tokens {
            let keep = self.config.trim_to;
            drops.extend(trim(
                "past_experience",
                &mut episodes,
                keep,
                render_episode,
            ));
            drops.extend(trim(
                "company_knowledge",
                &mut semantic,
                keep,
                render_fragment,
            ));
            trimmed = true;

            rendered = render(&core, &episodes, &semantic, &working);
            let before = token_estimate;
            token_estimate = token::estimate_tokens(&rendered.text);
            debug!(agent_id, before, after = token_estimate, "Trimmed soft tiers");

            if token_estimate > options.max_tokens {
                warn!(
                    agent_id,
                    token_estimate,
                    max_tokens = options.max_tokens,
                    "Context still over budget after trimming"
                );
            }
        }

        let layers = rendered
            .sections
            .iter()
            .map(|s| LayerStats {
                name: s.layer.into(),
                tokens: token::estimate_tokens(&s.text),
                items_included: s.items,
                items_total: match s.layer {
                    "past_experience" => episodes_total,
                    "company_knowledge" => semantic_total,
                    _ => s.items,
                },
            })
            .collect();

        info!(
            agent_id,
            task_id,
            token_estimate,
            episodes = episodes.len(),
            fragments = semantic.len(),
            working = working.len(),
            trimmed,
            "Context assembled"
        );

        Ok(AssembledContext {
            core,
            working,
            episodes,
            semantic,
            semantic_mode,
            text: rendered.text,
            token_estimate,
            trimmed,
            layers,
            drops,
        })
    }

    // ── Tier loaders ───────────────────────────────────────────────────────

    async fn load_working(&self, agent_id: &str, task_id: &str) -> Vec<WorkingEntry> {
        match self
            .tiers
            .working
            .read(agent_id, task_id, self.working_entries)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(agent_id, task_id, error = %e, "Working memory unavailable");
                Vec::new()
            }
        }
    }

    async fn load_episodes(&self, agent_id: &str, enabled: bool) -> Vec<Episode> {
        if !enabled {
            return Vec::new();
        }
        let query = RecallQuery {
            limit: self.config.episode_limit,
            min_importance: self.config.episode_min_importance,
            kind: None,
        };
        match self.tiers.episodic.recall(agent_id, &query).await {
            Ok(episodes) => episodes,
            Err(e) => {
                warn!(agent_id, error = %e, "Episodic recall failed, continuing without episodes");
                Vec::new()
            }
        }
    }

    async fn load_semantic(
        &self,
        org_id: &str,
        task_goal: &str,
        enabled: bool,
    ) -> (Vec<SemanticFragment>, Option<RetrievalMode>) {
        if !enabled {
            return (Vec::new(), None);
        }
        let options = SearchOptions {
            limit: self.config.semantic_limit,
            ..SearchOptions::default()
        };
        let results = self.tiers.semantic.search(org_id, task_goal, &options).await;
        (results.fragments, Some(results.mode))
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────

struct Section {
    layer: &'static str,
    text: String,
    items: usize,
}

struct Rendered {
    text: String,
    sections: Vec<Section>,
}

fn render(
    core: &CoreMemory,
    episodes: &[Episode],
    semantic: &[SemanticFragment],
    working: &[WorkingEntry],
) -> Rendered {
    let mut sections = Vec::new();

    let mut identity = String::from("[Identity]\n");
    identity.push_str(&format!("Name: {}\n", core.identity.name));
    identity.push_str(&format!("Role: {}\n", core.identity.role));
    if !core.identity.persona.is_empty() {
        identity.push_str(&format!("Persona: {}\n", core.identity.persona));
    }
    sections.push(Section {
        layer: "identity",
        text: identity,
        items: 1,
    });

    let org = &core.organization;
    let mut organization = String::from("[Organization]\n");
    organization.push_str(&format!("Name: {}\n", org.name));
    for (label, value) in [
        ("Description", &org.description),
        ("Industry", &org.industry),
        ("Stage", &org.stage),
    ] {
        if !value.is_empty() {
            organization.push_str(&format!("{label}: {value}\n"));
        }
    }
    if !org.values.is_empty() {
        organization.push_str(&format!("Values: {}\n", org.values.join(", ")));
    }
    sections.push(Section {
        layer: "organization",
        text: organization,
        items: 1,
    });

    push_list(&mut sections, "directives", "[Directives]\n", &core.directives, |d| {
        format!("- {d}\n")
    });
    push_list(
        &mut sections,
        "pinned_facts",
        "[Pinned Facts]\n",
        &core.pinned_facts,
        |f| format!("- {f}\n"),
    );
    push_list(
        &mut sections,
        "past_experience",
        "[Past Experience]\n",
        episodes,
        render_episode,
    );
    push_list(
        &mut sections,
        "company_knowledge",
        "[Company Knowledge]\n",
        semantic,
        render_fragment,
    );
    push_list(
        &mut sections,
        "working_memory",
        "[Current Task Transcript]\n",
        working,
        |e| format!("{}: {}\n", e.role.as_str(), e.content),
    );

    let text = sections
        .iter()
        .map(|s| s.text.trim_end())
        .collect::<Vec<_>>()
        .join("\n\n");

    Rendered { text, sections }
}

/// Append a bulleted section; empty lists are omitted.
fn push_list<T>(
    sections: &mut Vec<Section>,
    layer: &'static str,
    header: &str,
    items: &[T],
    line: impl Fn(&T) -> String,
) {
    if items.is_empty() {
        return;
    }
    let mut text = String::from(header);
    for item in items {
        text.push_str(&line(item));
    }
    sections.push(Section {
        layer,
        text,
        items: items.len(),
    });
}

fn render_episode(e: &Episode) -> String {
    format!(
        "- [{}, {}, importance {}] {}\n",
        e.kind.as_str(),
        e.outcome.as_str(),
        e.importance,
        e.summary
    )
}

fn render_fragment(f: &SemanticFragment) -> String {
    format!("- {}\n", f.content)
}

/// Cut `items` to its first `keep` entries, reporting what was dropped.
fn trim<T>(
    layer: &str,
    items: &mut Vec<T>,
    keep: usize,
    line: impl Fn(&T) -> String,
) -> Option<DropInfo> {
    if items.len() <= keep {
        return None;
    }
    let tokens_dropped = items[keep..]
        .iter()
        .map(|item| token::estimate_tokens(&line(item)))
        .sum();
    let items_dropped = items.len() - keep;
    items.truncate(keep);
    Some(DropInfo {
        layer: layer.into(),
        items_dropped,
        tokens_dropped,
        reason: format!("Over token budget, kept first {keep}"),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────
