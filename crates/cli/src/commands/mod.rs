//! Subcommand implementations. Each command loads the config, opens the
//! tiers it needs, and prints to stdout.

pub mod agent;
pub mod assemble;
pub mod consolidate;
pub mod episodes;
pub mod init;
pub mod knowledge;
pub mod working;

use std::path::{Path, PathBuf};

use agentmem_agent::MemoryTiers;
use agentmem_config::AppConfig;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// The config file in use: `--config` if given, else the default location.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let path = config_path(explicit);
    tracing::debug!(path = %path.display(), "Loading config");
    AppConfig::load_with_env(&path).map_err(|e| format!("Failed to load config: {e}").into())
}

pub async fn open(
    explicit: Option<&Path>,
) -> Result<(AppConfig, MemoryTiers), Box<dyn std::error::Error>> {
    let config = load_config(explicit)?;
    let tiers = MemoryTiers::from_config(&config).await?;
    Ok((config, tiers))
}

/// First `max` characters of `text` on one line, for listings.
pub fn preview(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &flat[..idx]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_path_wins() {
        let path = config_path(Some(Path::new("/tmp/agentmem.toml")));
        assert_eq!(path, PathBuf::from("/tmp/agentmem.toml"));
    }

    #[test]
    fn default_config_path_is_in_config_dir() {
        let path = config_path(None);
        assert!(path.ends_with(".agentmem/config.toml"));
    }

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("one\n two   three", 80), "one two three");
        assert_eq!(preview("abcdef", 3), "abc…");
    }
}
