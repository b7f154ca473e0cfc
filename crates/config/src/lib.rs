//! Configuration loading and validation for agentloop.
//!
//! Loads configuration from `~/.agentloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use agentloop_core::plugin::ConflictStrategy;
use agentloop_plugins::RegistryOptions;
use serde::{Deserialize, Serialize};

/// Log levels accepted by `logging.level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Upper bound for `agent.max_iterations`.
pub const MAX_ITERATIONS_LIMIT: u32 = 1000;

/// The root configuration structure.
///
/// Maps directly to `~/.agentloop/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Loop defaults
    #[serde(default)]
    pub agent: AgentConfig,

    /// Plugin registry policy
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Iteration bound per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Per-iteration LLM timeout in seconds
    #[serde(default = "default_iteration_timeout_secs")]
    pub iteration_timeout_secs: u64,

    /// Run the tool calls of one response concurrently
    #[serde(default = "default_true")]
    pub parallel_tool_calls: bool,

    /// System prompt prepended to every run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl AgentConfig {
    pub fn iteration_timeout(&self) -> Duration {
        Duration::from_secs(self.iteration_timeout_secs)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            iteration_timeout_secs: default_iteration_timeout_secs(),
            parallel_tool_calls: true,
            system_prompt: None,
        }
    }
}

fn default_max_iterations() -> u32 {
    10
}

fn default_iteration_timeout_secs() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Reject plugins that fail validation
    #[serde(default = "default_true")]
    pub strict_validation: bool,

    /// Prefix tool names with the plugin namespace
    #[serde(default = "default_true")]
    pub auto_namespace: bool,

    /// What to do when a tool name is already taken: "error", "replace", or "skip"
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            strict_validation: true,
            auto_namespace: true,
            conflict_strategy: ConflictStrategy::default(),
        }
    }
}

impl RegistryConfig {
    pub fn options(&self) -> RegistryOptions {
        RegistryOptions {
            strict: self.strict_validation,
            auto_namespace: self.auto_namespace,
            conflict_strategy: self.conflict_strategy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

impl AppConfig {
    /// Load configuration from the default path (~/.agentloop/config.toml).
    ///
    /// Environment variables override file values:
    /// - `AGENTLOOP_MAX_ITERATIONS`
    /// - `AGENTLOOP_ITERATION_TIMEOUT_SECS`
    /// - `AGENTLOOP_PARALLEL_TOOLS`
    /// - `AGENTLOOP_LOG_LEVEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
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

    /// Apply environment overrides read through `lookup`, then re-validate.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("AGENTLOOP_MAX_ITERATIONS") {
            self.agent.max_iterations = parse_env("AGENTLOOP_MAX_ITERATIONS", &value)?;
        }
        if let Some(value) = lookup("AGENTLOOP_ITERATION_TIMEOUT_SECS") {
            self.agent.iteration_timeout_secs =
                parse_env("AGENTLOOP_ITERATION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("AGENTLOOP_PARALLEL_TOOLS") {
            self.agent.parallel_tool_calls = parse_env("AGENTLOOP_PARALLEL_TOOLS", &value)?;
        }
        if let Some(value) = lookup("AGENTLOOP_LOG_LEVEL") {
            self.logging.level = value.to_ascii_lowercase();
        }
        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentloop")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_iterations == 0 || self.agent.max_iterations > MAX_ITERATIONS_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "agent.max_iterations must be between 1 and {MAX_ITERATIONS_LIMIT}"
            )));
        }

        if self.agent.iteration_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.iteration_timeout_secs must be > 0".into(),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::ValidationError(format!("{key} has an invalid value '{value}'"))
    })
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
