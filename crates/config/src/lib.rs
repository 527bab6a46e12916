//! Configuration loading, validation, and management for Recap.
//!
//! Loads configuration from `~/.recap/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.recap/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Degraded backends tried, in order, once the default one gives up
    #[serde(default)]
    pub fallbacks: Vec<FallbackConfig>,

    /// Summary tree shape and build concurrency
    #[serde(default)]
    pub tree: TreeConfig,

    /// Retry and timeout policy for backend calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// System prompts per generation role
    #[serde(default)]
    pub prompts: PromptConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}

/// Redact a secret string for Debug output.
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
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("providers", &self.providers)
            .field("fallbacks", &self.fallbacks)
            .field("tree", &self.tree)
            .field("retry", &self.retry)
            .field("prompts", &self.prompts)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

/// One entry of the fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Provider name (a key of `providers`, or a well-known provider)
    pub provider: String,

    /// Model to request; defaults to the provider's default model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum tokens per leaf slice
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Target number of nodes merged per reduction
    #[serde(default = "default_group_size")]
    pub group_size: usize,

    /// Reductions over more than this many remaining nodes are intermediate
    #[serde(default = "default_intermediate_threshold")]
    pub intermediate_threshold: usize,

    /// Concurrent backend calls per reduction round
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// BPE encoding used to measure and slice documents
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_max_chunk_size() -> usize {
    3900
}
fn default_group_size() -> usize {
    2
}
fn default_intermediate_threshold() -> usize {
    3
}
fn default_concurrency() -> usize {
    8
}
fn default_encoding() -> String {
    "cl100k_base".into()
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            group_size: default_group_size(),
            intermediate_threshold: default_intermediate_threshold(),
            concurrency: default_concurrency(),
            encoding: default_encoding(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per backend before moving to the next fallback
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay; doubled after every failed attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// System prompts, one per generation role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_leaf_prompt")]
    pub leaf: String,

    #[serde(default = "default_intermediate_prompt")]
    pub intermediate: String,

    #[serde(default = "default_final_prompt", rename = "final")]
    pub final_synthesis: String,

    #[serde(default = "default_summary_prompt")]
    pub summary: String,

    #[serde(default = "default_quiz_prompt")]
    pub quiz: String,
}

fn default_leaf_prompt() -> String {
    "You will be given a passage from a longer text. Reply only with bullet points \
     covering the key events, characters and facts needed to follow the whole text."
        .into()
}
fn default_intermediate_prompt() -> String {
    "You will be given bullet points covering consecutive parts of a longer text. \
     Merge them into one shorter list of bullet points that keeps only what is \
     essential to follow the plot. Reply only with the bullet points."
        .into()
}
fn default_final_prompt() -> String {
    "You will be given bullet points covering a longer text. Write a coherent, \
     concise summary of the text from them."
        .into()
}
fn default_summary_prompt() -> String {
    "You will be given notes on what a reader has read so far, followed by the \
     most recent passage. Summarize what has happened up to this point."
        .into()
}
fn default_quiz_prompt() -> String {
    "You will be given notes on what a reader has read so far, followed by the \
     most recent passage. Write between 2 and 10 open questions, with answers, \
     that check understanding of the story so far. Use exactly this format:\n\
     Number of Questions: <n>\n1Q: <question>\n1A: <answer>"
        .into()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            leaf: default_leaf_prompt(),
            intermediate: default_intermediate_prompt(),
            final_synthesis: default_final_prompt(),
            summary: default_summary_prompt(),
            quiz: default_quiz_prompt(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.recap/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `RECAP_API_KEY` (highest priority)
    /// - `OPENAI_API_KEY`
    /// - `OPENROUTER_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load from `path` (or the default location) and apply environment
    /// overrides on top.
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(path.unwrap_or(&default_path))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment variable overrides (highest priority).
    pub fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("RECAP_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("RECAP_PROVIDER") {
            self.default_provider = provider;
        }

        if let Ok(model) = std::env::var("RECAP_MODEL") {
            self.default_model = model;
        }
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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".recap")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.tree.max_chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "tree.max_chunk_size must be > 0".into(),
            ));
        }

        if self.tree.group_size < 2 {
            return Err(ConfigError::ValidationError(
                "tree.group_size must be >= 2".into(),
            ));
        }

        if self.tree.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "tree.concurrency must be >= 1".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be >= 1".into(),
            ));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::ValidationError(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            providers: HashMap::new(),
            fallbacks: vec![],
            tree: TreeConfig::default(),
            retry: RetryConfig::default(),
            prompts: PromptConfig::default(),
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
}
