//! Mutable state of one loop run.

use std::collections::HashSet;

use agentloop_core::message::{Message, MessageToolCall};
use agentloop_core::tool::ToolCallRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a run stands. Every status but `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Running,
    Completed,
    MaxIterations,
    Error,
    Cancelled,
}

impl LoopStatus {
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }
}

impl std::fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::MaxIterations => "max_iterations",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// State owned by a single run.
///
/// The transcript and the tool-call ledger only grow, and once the status
/// leaves `Running` it never changes again.
#[derive(Debug, Clone)]
pub struct LoopState {
    iteration: u32,
    messages: Vec<Message>,
    tool_calls: Vec<ToolCallRecord>,
    status: LoopStatus,
    content: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    error: Option<String>,
    call_ids: HashSet<String>,
}

impl LoopState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            iteration: 0,
            messages,
            tool_calls: Vec::new(),
            status: LoopStatus::Running,
            content: String::new(),
            started_at: Utc::now(),
            ended_at: None,
            error: None,
            call_ids: HashSet::new(),
        }
    }

    /// Completed iterations.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    pub fn status(&self) -> LoopStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The final answer once completed, otherwise the assistant text
    /// gathered so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub(crate) fn complete_iteration(&mut self) {
        self.iteration += 1;
    }

    pub(crate) fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub(crate) fn record(&mut self, record: ToolCallRecord) {
        self.tool_calls.push(record);
    }

    /// Append non-final assistant text to the partial content.
    pub(crate) fn append_partial(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.content.is_empty() {
            self.content.push_str("\n\n");
        }
        self.content.push_str(text);
    }

    /// Give every call an id unique within this run.
    ///
    /// Ids the LLM issued are kept unless empty or already used; those get a
    /// fresh id, which the transcript and the ledger then share.
    pub(crate) fn claim_call_ids(&mut self, calls: Vec<MessageToolCall>) -> Vec<MessageToolCall> {
        calls
            .into_iter()
            .map(|mut call| {
                if call.id.is_empty() || self.call_ids.contains(&call.id) {
                    let fresh = format!("call_{}", Uuid::new_v4().simple());
                    tracing::debug!(issued = %call.id, assigned = %fresh, "Reassigned tool call id");
                    call.id = fresh;
                }
                self.call_ids.insert(call.id.clone());
                call
            })
            .collect()
    }

    /// Move to a terminal status. Returns false if already terminal.
    pub(crate) fn finish(&mut self, status: LoopStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.error = error;
        self.ended_at = Some(Utc::now().max(self.started_at));
        true
    }

    /// Finish as completed with `content` as the final answer.
    pub(crate) fn complete(&mut self, content: String) -> bool {
        if self.finish(LoopStatus::Completed, None) {
            self.content = content;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_is_sticky() {
        let mut state = LoopState::new(vec![Message::user("hi")]);
        assert!(state.finish(LoopStatus::Cancelled, None));
        assert!(!state.finish(LoopStatus::Error, Some("late".into())));
        assert!(!state.complete("too late".into()));
        assert_eq!(state.status(), LoopStatus::Cancelled);
        assert!(state.error().is_none());
        assert!(state.content().is_empty());
    }

    #[test]
    fn running_is_not_a_finish() {
        let mut state = LoopState::new(vec![]);
        assert!(!state.finish(LoopStatus::Running, None));
        assert!(state.ended_at().is_none());
    }

    #[test]
    fn ended_at_never_precedes_started_at() {
        let mut state = LoopState::new(vec![]);
        state.finish(LoopStatus::MaxIterations, None);
        assert!(state.ended_at().unwrap() >= state.started_at());
    }

    #[test]
    fn duplicate_call_ids_are_reassigned() {
        let mut state = LoopState::new(vec![]);
        let first = state.claim_call_ids(vec![MessageToolCall::new("c1", "a", "{}")]);
        let second = state.claim_call_ids(vec![
            MessageToolCall::new("c1", "a", "{}"),
            MessageToolCall::new("", "b", "{}"),
            MessageToolCall::new("c2", "b", "{}"),
        ]);

        assert_eq!(first[0].id, "c1");
        assert_ne!(second[0].id, "c1");
        assert!(second[1].id.starts_with("call_"));
        assert_eq!(second[2].id, "c2");
    }

    #[test]
    fn partial_content_joins_paragraphs() {
        let mut state = LoopState::new(vec![]);
        state.append_partial("Looking it up.");
        state.append_partial("");
        state.append_partial("Still looking.");
        assert_eq!(state.content(), "Looking it up.\n\nStill looking.");
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&LoopStatus::MaxIterations).unwrap();
        assert_eq!(json, r#""max_iterations""#);
        assert_eq!(LoopStatus::MaxIterations.to_string(), "max_iterations");
    }
}
