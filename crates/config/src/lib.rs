//! Configuration loading, validation, and management for Promptforge.
//!
//! Loads configuration from `~/.promptforge/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.promptforge/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model backend configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Size ceilings and token budgets
    #[serde(default)]
    pub budgets: BudgetConfig,

    /// Gateway retry and timeout policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Topic store configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Staging configuration
    #[serde(default)]
    pub staging: StagingConfig,

    /// User-defined workflow definitions
    #[serde(default)]
    pub workflows: Vec<WorkflowConfig>,
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
            .field("model", &self.model)
            .field("budgets", &self.budgets)
            .field("retry", &self.retry)
            .field("storage", &self.storage)
            .field("staging", &self.staging)
            .field("workflows", &self.workflows)
            .finish()
    }
}

/// Model backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// OpenAI-compatible base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Size ceilings for collection and the prompt token budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Per-fragment byte ceiling; longer content is truncated with a marker
    #[serde(default = "default_fragment_bytes")]
    pub fragment_bytes: usize,

    /// Aggregate byte ceiling across all fragments of one collection
    #[serde(default = "default_aggregate_bytes")]
    pub aggregate_bytes: usize,

    /// Token budget for one composed prompt
    #[serde(default = "default_prompt_tokens")]
    pub prompt_tokens: usize,
}

fn default_fragment_bytes() -> usize {
    65_536
}
fn default_aggregate_bytes() -> usize {
    262_144
}
fn default_prompt_tokens() -> usize {
    4096
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            fragment_bytes: default_fragment_bytes(),
            aggregate_bytes: default_aggregate_bytes(),
            prompt_tokens: default_prompt_tokens(),
        }
    }
}

/// Gateway retry and timeout policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per model call (1 = no retries)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff in milliseconds; doubles per attempt, with jitter
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_backoff_ms() -> u64 {
    500
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Topic store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend: "sqlite" or "in_memory"
    #[serde(default = "default_backend")]
    pub backend: String,

    /// SQLite database path (ignored by the in-memory backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_backend() -> String {
    "sqlite".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
        }
    }
}

impl StorageConfig {
    /// Resolve the database path, defaulting under the config directory.
    pub fn database_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("topics.db"))
    }
}

/// Application staging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Whether `apply` creates a git commit when the model proposed
    /// a commit message
    #[serde(default = "default_true")]
    pub commit: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self { commit: true }
    }
}

/// A user-defined workflow: a named sequence of model-call steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Unique workflow name
    pub name: String,

    /// Ordered steps
    pub steps: Vec<StepConfig>,
}

/// One step of a user-defined workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step name, unique within the workflow
    pub name: String,

    /// How the step's prompt text is produced
    pub transform: TransformConfig,

    /// What happens after the step's model call completes
    #[serde(default)]
    pub termination: TerminationConfig,
}

/// Input transform for a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformConfig {
    /// Use the run's user instruction verbatim
    Instruction,
    /// Expand a template; `{instruction}` and `{input}` (the prior step's
    /// output) are substituted
    Template { text: String },
}

/// Termination rule for a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminationConfig {
    /// Advance to the next step unconditionally
    Advance,
    /// Repeat this step until the response contains the marker,
    /// up to `max_repeats` extra attempts
    RepeatUntilContains { marker: String, max_repeats: u32 },
    /// Stop the whole run early if the response contains the marker
    StopIfContains { marker: String },
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self::Advance
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.promptforge/config.toml).
    ///
    /// Also checks environment variables for the API key:
    /// - `PROMPTFORGE_API_KEY` (highest priority)
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        // Environment variable overrides (highest priority)
        if config.api_key.is_none() {
            config.api_key = std::env::var("PROMPTFORGE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("PROMPTFORGE_MODEL") {
            config.model.model = model;
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".promptforge")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.temperature < 0.0 || self.model.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.budgets.prompt_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "budgets.prompt_tokens must be greater than 0".into(),
            ));
        }

        if self.budgets.fragment_bytes > self.budgets.aggregate_bytes {
            return Err(ConfigError::ValidationError(
                "budgets.fragment_bytes cannot exceed budgets.aggregate_bytes".into(),
            ));
        }

        for wf in &self.workflows {
            if wf.steps.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "workflow '{}' has no steps",
                    wf.name
                )));
            }
            let mut seen = std::collections::HashSet::new();
            for step in &wf.steps {
                if !seen.insert(step.name.as_str()) {
                    return Err(ConfigError::ValidationError(format!(
                        "workflow '{}' has duplicate step '{}'",
                        wf.name, step.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: ModelConfig::default(),
            budgets: BudgetConfig::default(),
            retry: RetryConfig::default(),
            storage: StorageConfig::default(),
            staging: StagingConfig::default(),
            workflows: vec![],
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
