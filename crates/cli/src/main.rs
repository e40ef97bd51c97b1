//! agentmem CLI — the main entry point.
//!
//! Commands:
//! - `init`        — Write a default config file
//! - `agent`       — Create and edit core memory records
//! - `working`     — Append to or inspect a task transcript
//! - `assemble`    — Print the context an agent would start a task with
//! - `consolidate` — Record the outcome of a finished task
//! - `recall` / `boost`    — Episodic memory
//! - `remember` / `search` — Semantic memory

use std::path::PathBuf;

use agentmem_core::{EpisodeKind, Scope, WorkingRole};
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "agentmem",
    about = "agentmem — layered memory for autonomous agents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.agentmem/config.toml)
    #[arg(short, long, global = true, env = "AGENTMEM_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Manage core memory
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Manage working memory
    Working {
        #[command(subcommand)]
        command: WorkingCommand,
    },

    /// Assemble the context for a task
    Assemble {
        agent: String,
        org: String,
        task: String,
        goal: String,

        /// Token budget (defaults to assembly.max_tokens)
        #[arg(long)]
        max_tokens: Option<usize>,

        #[arg(long)]
        no_episodes: bool,

        #[arg(long)]
        no_semantic: bool,

        /// Print per-layer token stats after the text
        #[arg(long)]
        stats: bool,
    },

    /// Consolidate a finished task into long-term memory
    Consolidate {
        agent: String,
        org: String,
        task: String,
        goal: String,

        /// The task's final output
        #[arg(long)]
        result: String,

        /// The task failed
        #[arg(long)]
        failed: bool,

        /// Base importance (defaults to consolidation.default_importance)
        #[arg(long)]
        importance: Option<u8>,
    },

    /// Recall an agent's episodes
    Recall {
        agent: String,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        #[arg(long, default_value_t = 3)]
        min_importance: u8,

        /// Only episodes of this kind (e.g. task_failed)
        #[arg(long)]
        kind: Option<EpisodeKind>,
    },

    /// Set an episode's importance (by convention only ever raised)
    Boost { episode: String, importance: u8 },

    /// Save a fragment to semantic memory
    Remember {
        org: String,
        agent: String,
        content: String,

        #[arg(long, default_value = "organization")]
        scope: Scope,

        #[arg(long, default_value_t = 5)]
        importance: u8,

        #[arg(long, default_value = "manual")]
        source_type: String,
    },

    /// Search an organization's semantic memory
    Search {
        org: String,
        query: String,

        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        #[arg(long)]
        scope: Option<Scope>,
    },
}

#[derive(Subcommand)]
enum AgentCommand {
    /// Create (or replace) an agent from a TOML file
    Create {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Print an agent's core memory
    Show { id: String },
    /// Append a directive
    Directive { id: String, text: String },
    /// Pin a fact
    Pin { id: String, fact: String },
    /// Delete an agent's core memory
    Delete { id: String },
}

#[derive(Subcommand)]
enum WorkingCommand {
    /// Append an entry to a task transcript
    Append {
        agent: String,
        task: String,
        content: String,

        #[arg(short, long, default_value = "user")]
        role: WorkingRole,
    },
    /// Print a task transcript, oldest first
    Show {
        agent: String,
        task: String,

        /// Entries to show (defaults to ephemeral.max_entries)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Drop a task transcript
    Clear { agent: String, task: String },
    /// Remove every expired transcript
    Purge,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries command output.
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.json {
        builder.json().init();
    } else {
        builder.init();
    }

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Init { force } => commands::init::run(config, force)?,
        Commands::Agent { command } => match command {
            AgentCommand::Create { file } => commands::agent::create(config, &file).await?,
            AgentCommand::Show { id } => commands::agent::show(config, &id).await?,
            AgentCommand::Directive { id, text } => {
                commands::agent::directive(config, &id, &text).await?
            }
            AgentCommand::Pin { id, fact } => commands::agent::pin(config, &id, &fact).await?,
            AgentCommand::Delete { id } => commands::agent::delete(config, &id).await?,
        },
        Commands::Working { command } => match command {
            WorkingCommand::Append {
                agent,
                task,
                content,
                role,
            } => commands::working::append(config, &agent, &task, role, &content).await?,
            WorkingCommand::Show { agent, task, limit } => {
                commands::working::show(config, &agent, &task, limit).await?
            }
            WorkingCommand::Clear { agent, task } => {
                commands::working::clear(config, &agent, &task).await?
            }
            WorkingCommand::Purge => commands::working::purge(config).await?,
        },
        Commands::Assemble {
            agent,
            org,
            task,
            goal,
            max_tokens,
            no_episodes,
            no_semantic,
            stats,
        } => {
            let args = commands::assemble::AssembleArgs {
                agent,
                org,
                task,
                goal,
                max_tokens,
                include_episodes: !no_episodes,
                include_semantic: !no_semantic,
                stats,
            };
            commands::assemble::run(config, args).await?
        }
        Commands::Consolidate {
            agent,
            org,
            task,
            goal,
            result,
            failed,
            importance,
        } => {
            let args = commands::consolidate::ConsolidateArgs {
                agent,
                org,
                task,
                goal,
                result,
                success: !failed,
                importance,
            };
            commands::consolidate::run(config, args).await?
        }
        Commands::Recall {
            agent,
            limit,
            min_importance,
            kind,
        } => commands::episodes::recall(config, &agent, limit, min_importance, kind).await?,
        Commands::Boost {
            episode,
            importance,
        } => commands::episodes::boost(config, &episode, importance).await?,
        Commands::Remember {
            org,
            agent,
            content,
            scope,
            importance,
            source_type,
        } => {
            let options = agentmem_core::SaveOptions {
                scope,
                source_type,
                importance,
            };
            commands::knowledge::remember(config, &org, &agent, &content, options).await?
        }
        Commands::Search {
            org,
            query,
            limit,
            scope,
        } => commands::knowledge::search(config, &org, &query, limit, scope).await?,
    }

    Ok(())
}
