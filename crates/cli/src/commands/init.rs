//! `agentmem init` — write a default config file.

use std::path::Path;

use agentmem_config::AppConfig;

use super::CmdResult;

pub fn run(config: Option<&Path>, force: bool) -> CmdResult {
    let path = super::config_path(config);

    if path.exists() && !force {
        println!("Config already exists at: {}", path.display());
        println!("Edit it manually or re-run with --force to overwrite.");
        return Ok(());
    }

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("Created config at: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set embedding.provider (openai needs OPENAI_API_KEY)");
    println!("  2. Run: agentmem agent create --file agent.toml");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_a_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        run(Some(path.as_path()), false).unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.assembly.max_tokens, 6000);
    }

    #[test]
    fn keeps_existing_file_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[assembly]\nmax_tokens = 100\n").unwrap();

        run(Some(path.as_path()), false).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("max_tokens = 100"));

        run(Some(path.as_path()), true).unwrap();
        assert!(!std::fs::read_to_string(&path).unwrap().contains("max_tokens = 100"));
    }
}
