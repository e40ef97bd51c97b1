//! `agentmem remember` and `agentmem search` — semantic memory.

use std::path::Path;

use agentmem_core::{SaveOptions, Scope, SearchOptions};

use super::CmdResult;

pub async fn remember(
    config: Option<&Path>,
    org: &str,
    agent: &str,
    content: &str,
    options: SaveOptions,
) -> CmdResult {
    let (_, tiers) = super::open(config).await?;
    let id = tiers.semantic.save(org, Some(agent), content, options).await?;
    println!("Saved {id}");
    Ok(())
}

pub async fn search(
    config: Option<&Path>,
    org: &str,
    query: &str,
    limit: usize,
    scope: Option<Scope>,
) -> CmdResult {
    let (_, tiers) = super::open(config).await?;
    let options = SearchOptions {
        limit,
        scope,
        ..SearchOptions::default()
    };
    let results = tiers.semantic.search(org, query, &options).await;

    println!("retrieval: {}", results.mode.as_str());
    if results.fragments.is_empty() {
        println!("No fragments found.");
    }
    for (i, fragment) in results.fragments.iter().enumerate() {
        let score = fragment
            .similarity
            .map(|s| format!("{s:.3}"))
            .unwrap_or_else(|| "-".into());
        println!(
            "  {:>2}. [{score}] ({}, {}) {}",
            i + 1,
            fragment.scope.as_str(),
            fragment.source_type,
            super::preview(&fragment.content, 80)
        );
    }
    Ok(())
}
