//! `agentmem assemble` — print the context for a task.

use std::path::Path;

use agentmem_agent::{AssemblyOptions, ContextAssembler};

use super::CmdResult;

pub struct AssembleArgs {
    pub agent: String,
    pub org: String,
    pub task: String,
    pub goal: String,
    pub max_tokens: Option<usize>,
    pub include_episodes: bool,
    pub include_semantic: bool,
    pub stats: bool,
}

pub async fn run(config: Option<&Path>, args: AssembleArgs) -> CmdResult {
    let (config, tiers) = super::open(config).await?;

    let mut options = AssemblyOptions::from_config(&config.assembly);
    if let Some(max_tokens) = args.max_tokens {
        options.max_tokens = max_tokens;
    }
    options.include_episodes = args.include_episodes;
    options.include_semantic = args.include_semantic;

    let assembler = ContextAssembler::from_config(tiers.clone(), &config);
    let context = assembler
        .assemble(&args.agent, &args.org, &args.goal, &args.task, &options)
        .await?;

    println!("{}", context.text);
    println!();
    println!(
        "~{} tokens (budget {}){}",
        context.token_estimate,
        options.max_tokens,
        if context.trimmed { ", trimmed" } else { "" }
    );

    if args.stats {
        for layer in &context.layers {
            println!(
                "  {:<18} {:>6} tokens  {}/{} items",
                layer.name, layer.tokens, layer.items_included, layer.items_total
            );
        }
        for drop in &context.drops {
            println!(
                "  dropped {} from {} (~{} tokens): {}",
                drop.items_dropped, drop.layer, drop.tokens_dropped, drop.reason
            );
        }
        if let Some(mode) = context.semantic_mode {
            println!("  semantic retrieval: {}", mode.as_str());
        }
    }

    // Let access counts from this recall land before exit.
    tiers.flush().await;
    Ok(())
}
