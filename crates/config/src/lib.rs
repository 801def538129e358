//! Configuration loading, validation, and management for inkloop.
//!
//! Loads configuration from `~/.inkloop/config.toml`, then a `.env` file in
//! the working directory, then environment variable overrides. Validates all
//! settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.inkloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the chat endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Root folder under which project folders are created
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Agent loop tuning
    #[serde(default)]
    pub agent: AgentConfig,
}

fn default_base_url() -> String {
    "https://api.moonshot.ai/v1".into()
}
fn default_model() -> String {
    "kimi-k2-thinking".into()
}
fn default_temperature() -> f32 {
    1.0
}
fn default_max_tokens() -> u32 {
    65_536
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("output_dir", &self.output_dir)
            .field("agent", &self.agent)
            .finish()
    }
}

/// Loop limits and context-budget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on loop iterations per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Context window budget in tokens
    #[serde(default = "default_token_limit")]
    pub token_limit: usize,

    /// Fraction of `token_limit` at which compression kicks in
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: f64,

    /// Messages kept verbatim when compressing
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    /// Write a full checkpoint every N iterations (0 disables)
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u32,
}

fn default_max_iterations() -> u32 {
    300
}
fn default_token_limit() -> usize {
    200_000
}
fn default_compression_threshold() -> f64 {
    0.9
}
fn default_keep_recent() -> usize {
    10
}
fn default_checkpoint_interval() -> u32 {
    10
}

impl AgentConfig {
    /// The absolute token count at which compression triggers.
    pub fn compression_trigger(&self) -> usize {
        (self.token_limit as f64 * self.compression_threshold) as usize
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            token_limit: default_token_limit(),
            compression_threshold: default_compression_threshold(),
            keep_recent: default_keep_recent(),
            checkpoint_interval: default_checkpoint_interval(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.inkloop/config.toml).
    ///
    /// A `.env` file in the working directory is loaded first. Then these
    /// environment variables override the file:
    /// - `MOONSHOT_API_KEY` (or `INKLOOP_API_KEY`)
    /// - `MOONSHOT_BASE_URL`
    /// - `MOONSHOT_MODEL_NAME`
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "Ignoring unreadable .env"),
        }

        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("MOONSHOT_API_KEY").or_else(|| non_empty("INKLOOP_API_KEY"))
        {
            self.api_key = Some(key);
        }
        if let Some(url) = non_empty("MOONSHOT_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = non_empty("MOONSHOT_MODEL_NAME") {
            self.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".inkloop")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let threshold = self.agent.compression_threshold;
        if threshold <= 0.0 || threshold > 1.0 {
            return Err(ConfigError::ValidationError(
                "agent.compression_threshold must be in (0, 1]".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }

        if self.agent.token_limit == 0 {
            return Err(ConfigError::ValidationError(
                "agent.token_limit must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// The API key, or the fatal startup error when none is configured.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            output_dir: default_output_dir(),
            agent: AgentConfig::default(),
        }
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

    #[error(
        "No API key configured. Set MOONSHOT_API_KEY in the environment or a .env file, \
         or api_key in ~/.inkloop/config.toml"
    )]
    MissingApiKey,
}
