//! `agentmem consolidate` — record a finished task.

use std::path::Path;

use agentmem_agent::{ConsolidationRequest, Consolidator};

use super::CmdResult;

pub struct ConsolidateArgs {
    pub agent: String,
    pub org: String,
    pub task: String,
    pub goal: String,
    pub result: String,
    pub success: bool,
    pub importance: Option<u8>,
}

pub async fn run(config: Option<&Path>, args: ConsolidateArgs) -> CmdResult {
    let (config, tiers) = super::open(config).await?;

    let request = ConsolidationRequest::new(args.agent, args.org, args.task).with_importance(
        args.importance
            .unwrap_or(config.consolidation.default_importance),
    );
    let consolidator = Consolidator::new(tiers, config.consolidation.clone());
    let report = consolidator
        .consolidate(&args.result, &args.goal, args.success, &request)
        .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
