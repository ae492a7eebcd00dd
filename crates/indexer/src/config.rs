// Indexer configuration.
//
// Global config: `~/.quire/config.toml`
// Index database: `~/.quire/index.db` unless `index_path` is set.

use std::path::{Path, PathBuf};
use std::time::Duration;

use quire_common::patch::FuzzyMatcher;
use quire_common::ChunkOptions;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use url::Url;

/// Root directory for Quire global state: `~/.quire/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".quire"))
}

/// Path to the global config file: `~/.quire/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

// ── Global config ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct QuireConfig {
    /// SQLite file holding chunks and embeddings.
    pub index_path: Option<PathBuf>,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkOptions,
    pub patch: PatchConfig,
}

impl QuireConfig {
    /// Load from `~/.quire/config.toml`. Returns defaults if the file
    /// doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        match global_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load and validate a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.endpoint_url()?;
        if self.embedding.max_batch_size == 0 {
            return Err(ConfigError::Invalid("embedding.max_batch_size must be at least 1".into()));
        }
        if self.embedding.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "embedding.request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.chunking.max_chunk_chars == 0 || self.chunking.simple_chunk_chars == 0 {
            return Err(ConfigError::Invalid("chunk sizes must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.patch.max_error_ratio) {
            return Err(ConfigError::Invalid("patch.max_error_ratio must be in [0, 1)".into()));
        }
        Ok(())
    }

    /// Configured index path, or `~/.quire/index.db`.
    pub fn index_db_path(&self) -> Option<PathBuf> {
        self.index_path.clone().or_else(|| global_dir().map(|d| d.join("index.db")))
    }
}

/// Embedding service settings. API keys are read from the environment
/// variable named by `api_key_env`, never from this file. An empty
/// `api_key_env` sends requests without a key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible API (`{endpoint}/embeddings`).
    pub endpoint: String,
    pub model: String,
    #[serde(with = "env_var_name")]
    pub api_key_env: Option<String>,
    pub max_batch_size: usize,
    pub request_timeout_secs: u64,
    /// Chunks above this many cl100k tokens are logged.
    pub max_input_tokens: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".into(),
            model: "text-embedding-3-small".into(),
            api_key_env: Some("OPENAI_API_KEY".into()),
            max_batch_size: 96,
            request_timeout_secs: 30,
            max_input_tokens: 8191,
        }
    }
}

impl EmbeddingConfig {
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|error| ConfigError::Invalid(format!("embedding.endpoint: {error}")))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ConfigError::Invalid(format!(
                "embedding.endpoint must be http or https, got `{scheme}`"
            ))),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `None` is written as `""` since TOML has no null.
mod env_var_name {
    use super::*;

    pub fn serialize<S: Serializer>(name: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(name.as_deref().unwrap_or_default())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let name = String::deserialize(deserializer)?;
        let name = name.trim();
        Ok((!name.is_empty()).then(|| name.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatchConfig {
    /// Let `overwrite` changes use approximate matching.
    pub fuzzy_fallback: bool,
    pub max_error_ratio: f64,
    pub max_pattern_chars: usize,
}

impl Default for PatchConfig {
    fn default() -> Self {
        let matcher = FuzzyMatcher::default();
        Self {
            fuzzy_fallback: true,
            max_error_ratio: matcher.max_error_ratio,
            max_pattern_chars: matcher.max_pattern_chars,
        }
    }
}

impl PatchConfig {
    pub fn matcher(&self) -> Option<FuzzyMatcher> {
        self.fuzzy_fallback.then_some(FuzzyMatcher {
            max_error_ratio: self.max_error_ratio,
            max_pattern_chars: self.max_pattern_chars,
        })
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}
