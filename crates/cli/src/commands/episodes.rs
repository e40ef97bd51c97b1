//! `agentmem recall` and `agentmem boost`.

use std::path::Path;

use agentmem_core::{EpisodeKind, RecallQuery};

use super::CmdResult;

pub async fn recall(
    config: Option<&Path>,
    agent: &str,
    limit: usize,
    min_importance: u8,
    kind: Option<EpisodeKind>,
) -> CmdResult {
    let (_, tiers) = super::open(config).await?;
    let query = RecallQuery {
        limit,
        min_importance,
        kind,
    };
    let episodes = tiers.episodic.recall(agent, &query).await?;

    if episodes.is_empty() {
        println!("No episodes for {agent}");
    }
    for episode in &episodes {
        println!(
            "[{:>2}] {} {:<13} {:<7} {}",
            episode.importance,
            episode.created_at.format("%Y-%m-%d %H:%M"),
            episode.kind.as_str(),
            episode.outcome.as_str(),
            super::preview(&episode.summary, 80)
        );
        println!("     id: {}  accessed: {}", episode.id, episode.access_count);
    }

    tiers.flush().await;
    Ok(())
}

pub async fn boost(config: Option<&Path>, episode: &str, importance: u8) -> CmdResult {
    let (_, tiers) = super::open(config).await?;
    if tiers.episodic.boost(episode, importance).await? {
        println!("Set importance of {episode}");
    } else {
        return Err(format!("No episode {episode}").into());
    }
    Ok(())
}
