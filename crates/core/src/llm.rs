//! LLM service trait: the abstraction over the completion backend.
//!
//! The loop only needs one call: send the transcript and the available tool
//! schemas, get back text and/or requested tool calls. Wire protocols live
//! behind implementations of [`LlmService`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::message::{Message, MessageToolCall};
use crate::tool::ToolDefinition;

/// What the caller is asking the model to do; lets a service pick a model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Tool-calling reasoning loop.
    #[default]
    Agentic,
    /// Plain conversational reply.
    Chat,
    /// Plan generation.
    Planning,
}

/// Incremental-content callback, invoked once per streamed chunk.
pub type ChunkCallback<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// One request to the LLM service.
pub struct LlmRequest<'a> {
    pub task: TaskKind,
    pub messages: &'a [Message],
    pub tools: &'a [ToolDefinition],
    /// Trips when the call should stop; services report it as [`LlmError::Cancelled`].
    pub cancel: CancellationToken,
    /// Present when the caller wants content as it is generated.
    pub on_chunk: Option<ChunkCallback<'a>>,
}

/// A complete response from the LLM service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// True when `content` was already delivered through the chunk callback.
    #[serde(default)]
    pub streamed: bool,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<MessageToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            streamed: false,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The completion service consumed by the agentic loop.
#[async_trait]
pub trait LlmService: Send + Sync {
    /// A human-readable name for this service.
    fn name(&self) -> &str;

    /// Send the transcript and tool schemas; return content and/or tool calls.
    ///
    /// Implementations must return [`LlmError::Cancelled`] when they stop
    /// because `request.cancel` tripped.
    async fn call(&self, request: LlmRequest<'_>) -> std::result::Result<LlmResponse, LlmError>;
}
