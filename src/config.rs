use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SparkConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub completion: CompletionConfig,
    pub retry: RetryConfig,
    pub retrieval: RetrievalConfig,
    pub profile: ProfileConfig,
    pub classification: ClassificationConfig,
    pub conversation: ConversationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub dimensions: usize,
    /// Provider token limit; input is head-truncated to roughly this many tokens.
    pub max_input_tokens: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub call_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub over_fetch_factor: usize,
    /// Min score for conversation context lookups.
    pub context_min_score: f64,
    /// Min score for related-thought suggestions.
    pub related_min_score: f64,
    pub recency_epsilon: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProfileConfig {
    pub window_days: i64,
    pub staleness_minutes: i64,
    /// Recompute once this many new items/events arrive after the last compute.
    pub refresh_after_new_rows: usize,
    pub fetch_timeout_ms: u64,
    pub max_items: usize,
    pub max_events: usize,
    pub max_summary_items: usize,
    pub theme_count: usize,
    pub behavior_retention_days: i64,
    /// Owners kept in the profile cache before idle entries are evicted.
    pub cache_capacity: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClassificationConfig {
    pub confidence_gate: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConversationConfig {
    pub readiness_gate: f64,
    pub deepening_min_turns: usize,
    pub ready_min_turns: usize,
    pub recent_turns: usize,
    pub context_top_k: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 7411,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_spark_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            base_url: "https://api.openai.com/v1".into(),
            model: "text-embedding-3-small".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            dimensions: 1536,
            max_input_tokens: 8191,
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            temperature: 0.3,
            max_tokens: 1000,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 4000,
            call_timeout_ms: 15_000,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            over_fetch_factor: 3,
            context_min_score: 0.6,
            related_min_score: 0.7,
            recency_epsilon: 0.02,
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            staleness_minutes: 60,
            refresh_after_new_rows: 5,
            fetch_timeout_ms: 5000,
            max_items: 50,
            max_events: 100,
            max_summary_items: 20,
            theme_count: 5,
            behavior_retention_days: 90,
            cache_capacity: 1024,
        }
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            confidence_gate: 0.6,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            readiness_gate: 0.7,
            deepening_min_turns: 2,
            ready_min_turns: 3,
            recent_turns: 8,
            context_top_k: 5,
        }
    }
}

/// Returns `~/.sparkmind/`
pub fn default_spark_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sparkmind")
}

/// Returns the default config file path: `~/.sparkmind/config.toml`
pub fn default_config_path() -> PathBuf {
    default_spark_dir().join("config.toml")
}

impl SparkConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            SparkConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SPARKMIND_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("SPARKMIND_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("SPARKMIND_EMBEDDING_URL") {
            self.embedding.base_url = val;
        }
        if let Ok(val) = std::env::var("SPARKMIND_COMPLETION_URL") {
            self.completion.base_url = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Read an API key from the environment variable named in config.
pub fn api_key_from_env(var: &str) -> Result<String> {
    std::env::var(var).with_context(|| format!("environment variable {var} is not set"))
}
