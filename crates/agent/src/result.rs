//! The caller-facing summary of a finished run.

use agentloop_core::message::Message;
use agentloop_core::tool::ToolCallRecord;
use serde::{Deserialize, Serialize};

use crate::state::{LoopState, LoopStatus};

/// Outcome of [`AgentLoop::run`](crate::AgentLoop::run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopResult {
    pub status: LoopStatus,
    pub content: String,
    pub tool_calls: Vec<ToolCallRecord>,
    /// Iterations that ran to completion.
    pub iterations: u32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Full transcript, including the system prompt and tool results.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transcript: Vec<Message>,
}

impl LoopResult {
    pub fn is_completed(&self) -> bool {
        self.status == LoopStatus::Completed
    }
}

/// Summarize a finished run. Pure; consumes the state.
///
/// Duration runs from the state's start to its end (or to the start, for a
/// state that never finished).
pub fn build_result(state: LoopState) -> LoopResult {
    let started = state.started_at();
    let ended = state.ended_at().unwrap_or(started);
    let duration_ms = (ended - started).num_milliseconds().max(0) as u64;

    LoopResult {
        status: state.status(),
        content: state.content().to_string(),
        tool_calls: state.tool_calls().to_vec(),
        iterations: state.iteration(),
        duration_ms,
        error: state.error().map(str::to_string),
        transcript: state.messages().to_vec(),
    }
}
