//! A scripted [`LlmService`] that replays canned responses.
//!
//! Used by the test suites and by `agentloop replay` to exercise the loop
//! without a real completion backend.

use std::collections::VecDeque;
use std::sync::Mutex;

use agentloop_core::error::LlmError;
use agentloop_core::llm::{LlmRequest, LlmResponse, LlmService};
use agentloop_core::message::Message;
use agentloop_core::message::MessageToolCall;
use async_trait::async_trait;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Return this response.
    Respond(LlmResponse),
    /// Deliver `chunks` through the chunk callback, then return their
    /// concatenation with `tool_calls`.
    Stream {
        chunks: Vec<String>,
        tool_calls: Vec<MessageToolCall>,
    },
    /// Fail with this error.
    Fail(LlmError),
    /// Block until the request's token trips, then report cancellation.
    WaitForCancel,
}

impl From<LlmResponse> for ScriptStep {
    fn from(response: LlmResponse) -> Self {
        Self::Respond(response)
    }
}

/// What the service was asked, captured per call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
    pub streaming: bool,
}

/// Replays a fixed sequence of steps, one per call.
///
/// Once the script runs out, calls fail with [`LlmError::Unavailable`].
pub struct ScriptedLlm {
    steps: Mutex<VecDeque<ScriptStep>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ScriptStep>,
    {
        Self {
            steps: Mutex::new(steps.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Load a script from a JSON array of responses.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let responses: Vec<LlmResponse> = serde_json::from_str(json)?;
        Ok(Self::new(responses))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl LlmService for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn call(&self, request: LlmRequest<'_>) -> Result<LlmResponse, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                messages: request.messages.to_vec(),
                tools: request.tools.iter().map(|t| t.name.clone()).collect(),
                streaming: request.on_chunk.is_some(),
            });

        if request.cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }

        let step = self
            .steps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| LlmError::Unavailable("script exhausted".into()))?;

        match step {
            ScriptStep::Respond(response) => Ok(response),
            ScriptStep::Stream { chunks, tool_calls } => {
                let streamed = match request.on_chunk {
                    Some(on_chunk) => {
                        for chunk in &chunks {
                            if request.cancel.is_cancelled() {
                                return Err(LlmError::Cancelled);
                            }
                            on_chunk(chunk);
                        }
                        true
                    }
                    None => false,
                };
                Ok(LlmResponse {
                    content: chunks.concat(),
                    tool_calls,
                    streamed,
                })
            }
            ScriptStep::Fail(error) => Err(error),
            ScriptStep::WaitForCancel => {
                request.cancel.cancelled().await;
                Err(LlmError::Cancelled)
            }
        }
    }
}
