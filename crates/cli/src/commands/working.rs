//! `agentmem working` — per-task transcripts.

use std::path::Path;

use agentmem_core::{WorkingEntry, WorkingRole};

use super::CmdResult;

pub async fn append(
    config: Option<&Path>,
    agent: &str,
    task: &str,
    role: WorkingRole,
    content: &str,
) -> CmdResult {
    let (_, tiers) = super::open(config).await?;
    tiers
        .working
        .append(agent, task, WorkingEntry::new(role, content))
        .await?;
    Ok(())
}

pub async fn show(config: Option<&Path>, agent: &str, task: &str, limit: Option<usize>) -> CmdResult {
    let (config, tiers) = super::open(config).await?;
    let limit = limit.unwrap_or(config.ephemeral.max_entries);
    let entries = tiers.working.read(agent, task, limit).await?;

    if entries.is_empty() {
        println!("No working memory for {agent}/{task}");
        return Ok(());
    }
    for entry in &entries {
        println!(
            "{} [{}] {}",
            entry.timestamp.format("%H:%M:%S"),
            entry.role.as_str(),
            entry.content
        );
    }
    Ok(())
}

pub async fn clear(config: Option<&Path>, agent: &str, task: &str) -> CmdResult {
    let (_, tiers) = super::open(config).await?;
    tiers.working.clear(agent, task).await?;
    println!("Cleared {agent}/{task}");
    Ok(())
}

pub async fn purge(config: Option<&Path>) -> CmdResult {
    let (_, tiers) = super::open(config).await?;
    let removed = tiers.working.purge_expired().await?;
    println!("Removed {removed} expired transcript(s)");
    Ok(())
}
