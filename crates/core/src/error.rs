//! Error types for the agentloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] wraps them all.

use thiserror::Error;

/// The top-level error type for all agentloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- LLM service errors ---
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Plugin registration errors ---
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    // --- Invalid run options ---
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures surfaced by the LLM completion service.
///
/// [`LlmError::Cancelled`] is the distinguished marker the loop maps to a
/// `cancelled` status; every other variant ends the run with `error`.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("LLM call cancelled")]
    Cancelled,

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("LLM service unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),
}

impl LlmError {
    /// Whether this failure is the cancellation marker.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Registration and lifecycle failures raised by the plugin registry.
///
/// Every variant names the offending plugin so callers can report it.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    #[error("Plugin '{plugin}' failed validation: {reason}")]
    Validation { plugin: String, reason: String },

    #[error("Plugin '{plugin}' depends on '{dependency}', which is not loaded")]
    MissingDependency { plugin: String, dependency: String },

    #[error("Circular dependency detected while loading plugin '{plugin}'")]
    CircularDependency { plugin: String },

    #[error("Plugin '{plugin}' registers tool '{tool}', which already exists")]
    ToolConflict { plugin: String, tool: String },

    #[error("Plugin '{0}' is already loaded")]
    AlreadyLoaded(String),

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Plugin '{0}' is not loaded")]
    NotLoaded(String),

    #[error("Plugin '{plugin}' is required by loaded plugins: {dependents}")]
    HasDependents { plugin: String, dependents: String },

    #[error("Plugin '{plugin}' lifecycle hook failed: {message}")]
    Hook { plugin: String, message: String },
}

impl PluginError {
    /// Name of the plugin this error is about.
    pub fn plugin(&self) -> &str {
        match self {
            Self::Validation { plugin, .. }
            | Self::MissingDependency { plugin, .. }
            | Self::CircularDependency { plugin }
            | Self::ToolConflict { plugin, .. }
            | Self::HasDependents { plugin, .. }
            | Self::Hook { plugin, .. } => plugin,
            Self::AlreadyLoaded(plugin) | Self::NotFound(plugin) | Self::NotLoaded(plugin) => plugin,
        }
    }
}
