//! Configuration loading, validation, and management for agentmem.
//!
//! Loads configuration from `~/.agentmem/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.agentmem/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Embedding service
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Durable store (core, episodic, semantic)
    #[serde(default)]
    pub durable: DurableStoreConfig,

    /// Ephemeral store (working memory)
    #[serde(default)]
    pub ephemeral: EphemeralStoreConfig,

    /// Context assembly limits
    #[serde(default)]
    pub assembly: AssemblyConfig,

    /// Post-task consolidation
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "openai" (any OpenAI-compatible endpoint), "hash" (offline), or "none"
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_embedding_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Vector length. Defaults per provider when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Cache key length in characters
    #[serde(default = "default_cache_prefix_chars")]
    pub cache_prefix_chars: usize,

    /// Stop caching new inputs beyond this many entries
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,
}

fn default_embedding_provider() -> String {
    "openai".into()
}
fn default_embedding_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_cache_prefix_chars() -> usize {
    256
}
fn default_cache_max_entries() -> usize {
    10_000
}
fn default_true() -> bool {
    true
}

impl EmbeddingConfig {
    /// Configured dimensions, or the provider's default.
    pub fn effective_dimensions(&self) -> usize {
        self.dimensions.unwrap_or(match self.provider.as_str() {
            "hash" => 256,
            _ => 1536,
        })
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_url: default_embedding_url(),
            api_key: None,
            model: default_embedding_model(),
            dimensions: None,
            cache_enabled: true,
            cache_prefix_chars: default_cache_prefix_chars(),
            cache_max_entries: default_cache_max_entries(),
        }
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("cache_enabled", &self.cache_enabled)
            .field("cache_prefix_chars", &self.cache_prefix_chars)
            .field("cache_max_entries", &self.cache_max_entries)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableStoreConfig {
    /// "sqlite" or "in_memory"
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default = "default_durable_url")]
    pub url: String,
}

fn default_backend() -> String {
    "sqlite".into()
}
fn default_durable_url() -> String {
    sqlite_url("memory.sqlite")
}

fn sqlite_url(file: &str) -> String {
    format!("sqlite://{}", AppConfig::config_dir().join(file).display())
}

impl Default for DurableStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_durable_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralStoreConfig {
    /// "sqlite" or "in_memory"
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default = "default_ephemeral_url")]
    pub url: String,

    /// Seconds a task log survives after its last append
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Most recent entries read back per task
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_ephemeral_url() -> String {
    sqlite_url("working.sqlite")
}
fn default_ttl_secs() -> u64 {
    4 * 60 * 60
}
fn default_max_entries() -> usize {
    20
}

impl Default for EphemeralStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_ephemeral_url(),
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_tier_limit")]
    pub episode_limit: usize,

    #[serde(default = "default_episode_min_importance")]
    pub episode_min_importance: u8,

    #[serde(default = "default_tier_limit")]
    pub semantic_limit: usize,

    /// Entries kept per soft tier when over budget
    #[serde(default = "default_trim_to")]
    pub trim_to: usize,
}

fn default_max_tokens() -> usize {
    6000
}
fn default_tier_limit() -> usize {
    6
}
fn default_episode_min_importance() -> u8 {
    4
}
fn default_trim_to() -> usize {
    3
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            episode_limit: default_tier_limit(),
            episode_min_importance: default_episode_min_importance(),
            semantic_limit: default_tier_limit(),
            trim_to: default_trim_to(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    #[serde(default = "default_importance")]
    pub default_importance: u8,

    /// Added to importance for failed tasks
    #[serde(default = "default_failure_bonus")]
    pub failure_bonus: u8,

    /// Successful results must be longer than this to be promoted
    #[serde(default = "default_min_promotion_chars")]
    pub min_promotion_chars: usize,

    /// Characters of the result kept in the promoted fragment
    #[serde(default = "default_summary_chars")]
    pub summary_chars: usize,
}

fn default_importance() -> u8 {
    5
}
fn default_failure_bonus() -> u8 {
    2
}
fn default_min_promotion_chars() -> usize {
    100
}
fn default_summary_chars() -> usize {
    500
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            default_importance: default_importance(),
            failure_bonus: default_failure_bonus(),
            min_promotion_chars: default_min_promotion_chars(),
            summary_chars: default_summary_chars(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.agentmem/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `AGENTMEM_EMBEDDING_API_KEY`, then `OPENAI_API_KEY`
    /// - `AGENTMEM_EMBEDDING_URL`
    /// - `AGENTMEM_DATABASE_URL`
    /// - `AGENTMEM_EPHEMERAL_URL`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) =
            lookup("AGENTMEM_EMBEDDING_API_KEY").or_else(|| lookup("OPENAI_API_KEY"))
        {
            self.embedding.api_key = Some(key);
        }
        if let Some(url) = lookup("AGENTMEM_EMBEDDING_URL") {
            self.embedding.api_url = url;
        }
        if let Some(url) = lookup("AGENTMEM_DATABASE_URL") {
            self.durable.url = url;
        }
        if let Some(url) = lookup("AGENTMEM_EPHEMERAL_URL") {
            self.ephemeral.url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentmem")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.embedding.provider.as_str(), "openai" | "hash" | "none") {
            return Err(ConfigError::ValidationError(format!(
                "unknown embedding provider '{}'",
                self.embedding.provider
            )));
        }
        if self.embedding.cache_prefix_chars == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.cache_prefix_chars must be > 0".into(),
            ));
        }
        if self.embedding.effective_dimensions() == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimensions must be > 0".into(),
            ));
        }
        for (section, backend) in [
            ("durable", &self.durable.backend),
            ("ephemeral", &self.ephemeral.backend),
        ] {
            if !matches!(backend.as_str(), "sqlite" | "in_memory") {
                return Err(ConfigError::ValidationError(format!(
                    "unknown {section} backend '{backend}'"
                )));
            }
        }
        if self.ephemeral.ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "ephemeral.ttl_secs must be > 0".into(),
            ));
        }
        if self.ephemeral.max_entries == 0 {
            return Err(ConfigError::ValidationError(
                "ephemeral.max_entries must be > 0".into(),
            ));
        }
        if self.assembly.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "assembly.max_tokens must be > 0".into(),
            ));
        }
        if self.assembly.trim_to == 0 {
            return Err(ConfigError::ValidationError(
                "assembly.trim_to must be > 0".into(),
            ));
        }
        if self.assembly.trim_to > self.assembly.episode_limit
            || self.assembly.trim_to > self.assembly.semantic_limit
        {
            return Err(ConfigError::ValidationError(
                "assembly.trim_to must not exceed the tier limits".into(),
            ));
        }
        if !(1..=10).contains(&self.consolidation.default_importance) {
            return Err(ConfigError::ValidationError(
                "consolidation.default_importance must be between 1 and 10".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.assembly.max_tokens, 6000);
        assert_eq!(config.ephemeral.ttl_secs, 14_400);
        assert_eq!(config.embedding.effective_dimensions(), 1536);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.durable.url, config.durable.url);
        assert_eq!(parsed.assembly.trim_to, config.assembly.trim_to);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[embedding]
provider = "hash"

[ephemeral]
backend = "in_memory"
ttl_secs = 60
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.embedding.effective_dimensions(), 256);
        assert_eq!(config.ephemeral.ttl_secs, 60);
        assert_eq!(config.ephemeral.max_entries, 20);
        assert_eq!(config.durable.backend, "sqlite");
    }

    #[test]
    fn unknown_backend_rejected() {
        let mut config = AppConfig::default();
        config.durable.backend = "redis".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn trim_above_limits_rejected() {
        let mut config = AppConfig::default();
        config.assembly.trim_to = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_trim_rejected() {
        let mut config = AppConfig::default();
        config.assembly.trim_to = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(err.to_string().contains("assembly.trim_to"));
    }

    #[test]
    fn zero_working_entries_rejected() {
        let mut config = AppConfig::default();
        config.ephemeral.max_entries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_error_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[assembly\nmax_tokens = ").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.embedding.provider, "openai");
    }

    #[test]
    fn overrides_prefer_specific_key() {
        let env: HashMap<&str, &str> = [
            ("AGENTMEM_EMBEDDING_API_KEY", "sk-specific"),
            ("OPENAI_API_KEY", "sk-generic"),
            ("AGENTMEM_DATABASE_URL", "sqlite::memory:"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-specific"));
        assert_eq!(config.durable.url, "sqlite::memory:");
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.embedding.api_key = Some("sk-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("[assembly]"));
        assert!(toml_str.contains("6000"));
    }
}
