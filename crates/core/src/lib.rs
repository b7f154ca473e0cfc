//! # agentloop core
//!
//! Domain types, traits, and error definitions for the agentloop
//! tool-calling runtime. This crate has **no runtime dependencies** beyond
//! serialization and a cancellation token type. It defines the domain model
//! that the registry, the loop, and the CLI implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here ([`LlmService`], [`Tool`],
//! [`PluginLifecycle`]). Implementations live in their respective crates or
//! in user code.

pub mod error;
pub mod llm;
pub mod message;
pub mod plugin;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, LlmError, PluginError, Result, ToolError};
pub use llm::{ChunkCallback, LlmRequest, LlmResponse, LlmService, TaskKind};
pub use message::{ConversationId, Message, MessageToolCall, Role};
pub use plugin::{
    ConflictStrategy, HealthStatus, LifecycleContext, Plugin, PluginContext, PluginLifecycle,
    PluginStatus,
};
pub use tool::{
    ExecutionContext, ParameterType, RiskLevel, Tool, ToolArguments, ToolCallRecord,
    ToolDefinition, ToolErrorInfo, ToolParameter, ToolResult, EXECUTION_ERROR, TOOL_NOT_FOUND,
};

/// Cancellation handle accepted by the loop and the LLM service.
pub use tokio_util::sync::CancellationToken;
