//! `agentmem agent` — core memory records.

use std::path::Path;

use agentmem_core::{CoreMemory, CorePatch, Identity, OrganizationProfile};
use serde::Deserialize;

use super::CmdResult;

/// The TOML accepted by `agent create --file`.
///
/// ```toml
/// agent_id = "growth-1"
/// directives = ["Prefer experiments under $500"]
///
/// [identity]
/// name = "Ada"
/// role = "Growth lead"
///
/// [organization]
/// name = "Acme"
/// industry = "Retail"
/// ```
#[derive(Debug, Deserialize)]
struct AgentFile {
    agent_id: String,
    identity: Identity,
    organization: OrganizationProfile,
    #[serde(default)]
    directives: Vec<String>,
    #[serde(default)]
    pinned_facts: Vec<String>,
}

impl AgentFile {
    fn into_core(self) -> CoreMemory {
        let mut core = CoreMemory::new(self.agent_id, self.identity, self.organization);
        for directive in self.directives {
            core.apply(CorePatch::AddDirective(directive));
        }
        for fact in self.pinned_facts {
            core.apply(CorePatch::AddPin(fact));
        }
        core
    }
}

fn parse_agent_file(content: &str) -> Result<CoreMemory, toml::de::Error> {
    toml::from_str::<AgentFile>(content).map(AgentFile::into_core)
}

pub async fn create(config: Option<&Path>, file: &Path) -> CmdResult {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let core = parse_agent_file(&content)
        .map_err(|e| format!("Invalid agent file {}: {e}", file.display()))?;

    let (_, tiers) = super::open(config).await?;
    let agent_id = core.agent_id.clone();
    tiers.core.initialize(core).await?;
    println!("Created agent {agent_id}");
    Ok(())
}

pub async fn show(config: Option<&Path>, id: &str) -> CmdResult {
    let (_, tiers) = super::open(config).await?;
    let core = tiers.core.get(id).await?;
    println!("{}", serde_json::to_string_pretty(&core)?);
    Ok(())
}

pub async fn directive(config: Option<&Path>, id: &str, text: &str) -> CmdResult {
    let (_, tiers) = super::open(config).await?;
    let core = tiers.core.add_directive(id, text).await?;
    println!("{id} now has {} directive(s)", core.directives.len());
    Ok(())
}

pub async fn pin(config: Option<&Path>, id: &str, fact: &str) -> CmdResult {
    let (_, tiers) = super::open(config).await?;
    let core = tiers.core.add_pin(id, fact).await?;
    println!("{id} now has {} pinned fact(s)", core.pinned_facts.len());
    Ok(())
}

pub async fn delete(config: Option<&Path>, id: &str) -> CmdResult {
    let (_, tiers) = super::open(config).await?;
    if tiers.core.delete(id).await? {
        println!("Deleted {id}");
    } else {
        println!("No agent {id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_file_builds_core_memory() {
        let core = parse_agent_file(
            r#"
agent_id = "growth-1"
directives = ["Prefer experiments under $500"]
pinned_facts = ["Launch is on the 14th", "CFO is Sam"]

[identity]
name = "Ada"
role = "Growth lead"

[organization]
name = "Acme"
industry = "Retail"
values = ["speed"]
"#,
        )
        .unwrap();

        assert_eq!(core.agent_id, "growth-1");
        assert_eq!(core.identity.name, "Ada");
        assert_eq!(core.identity.persona, "");
        assert_eq!(core.organization.values, vec!["speed"]);
        assert_eq!(core.directives.len(), 1);
        assert_eq!(core.pinned_facts, vec!["Launch is on the 14th", "CFO is Sam"]);
    }

    #[test]
    fn agent_file_lists_are_bounded() {
        let pins: Vec<String> = (0..25).map(|i| format!("\"fact {i}\"")).collect();
        let content = format!(
            "agent_id = \"a\"\npinned_facts = [{}]\n[identity]\nname = \"A\"\nrole = \"r\"\n[organization]\nname = \"O\"\n",
            pins.join(", ")
        );
        let core = parse_agent_file(&content).unwrap();
        assert_eq!(core.pinned_facts.len(), agentmem_core::MAX_PINNED_FACTS);
        assert_eq!(core.pinned_facts[0], "fact 5");
    }

    #[test]
    fn agent_file_requires_identity() {
        assert!(parse_agent_file("agent_id = \"a\"\n[organization]\nname = \"O\"\n").is_err());
    }
}
