//! The agentic loop: call the LLM, run the tools it asks for, feed the
//! results back, repeat until it answers or a bound is hit.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use agentloop_core::error::{Error, LlmError, Result};
use agentloop_core::llm::{ChunkCallback, LlmRequest, LlmResponse, LlmService, TaskKind};
use agentloop_core::message::{ConversationId, Message, Role};
use agentloop_core::tool::{ExecutionContext, ToolDefinition};
use agentloop_plugins::PluginRegistry;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cancel::{CancelReason, IterationCancellation};
use crate::dispatch::Dispatcher;
use crate::result::{LoopResult, build_result};
use crate::state::{LoopState, LoopStatus};
use crate::stream_event::{Decision, EventEmitter, EventFactory, EventKind, EventObserver};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_ITERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Per-run options for [`AgentLoop::run`].
#[derive(Clone, Default)]
pub struct LoopOptions {
    /// Prepended to the transcript as a system message.
    pub system_prompt: Option<String>,
    /// Prior conversation. System messages in it are dropped.
    pub history: Vec<Message>,
    /// Overrides the loop's default.
    pub max_iterations: Option<u32>,
    /// Overrides the loop's default.
    pub iteration_timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
    pub observer: Option<Arc<dyn EventObserver>>,
    /// Stamped on every event; defaults to the execution context's session id.
    pub conversation_id: Option<ConversationId>,
}

impl LoopOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn with_iteration_timeout(mut self, timeout: Duration) -> Self {
        self.iteration_timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_conversation_id(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }
}

impl fmt::Debug for LoopOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopOptions")
            .field("system_prompt", &self.system_prompt)
            .field("history", &self.history.len())
            .field("max_iterations", &self.max_iterations)
            .field("iteration_timeout", &self.iteration_timeout)
            .field("cancel", &self.cancel)
            .field("observer", &self.observer.is_some())
            .field("conversation_id", &self.conversation_id)
            .finish()
    }
}

/// Why an LLM call ended the iteration.
enum CallFailure {
    Cancelled(Option<CancelReason>),
    Fatal(LlmError),
}

/// Drives tool-calling conversations against an [`LlmService`] and the
/// tools of a [`PluginRegistry`].
///
/// One `AgentLoop` can serve many runs; each [`run`](Self::run) owns its
/// own state. The registry must not be reconfigured while a run is active.
pub struct AgentLoop {
    llm: Arc<dyn LlmService>,
    registry: Arc<PluginRegistry>,
    max_iterations: u32,
    iteration_timeout: Option<Duration>,
    parallel_tools: bool,
    task: TaskKind,
    streaming: bool,
}

impl AgentLoop {
    pub fn new(llm: Arc<dyn LlmService>, registry: Arc<PluginRegistry>) -> Self {
        Self {
            llm,
            registry,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            iteration_timeout: Some(DEFAULT_ITERATION_TIMEOUT),
            parallel_tools: true,
            task: TaskKind::Agentic,
            streaming: false,
        }
    }

    /// Set the default iteration bound.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the default per-iteration LLM timeout. `None` disables it.
    pub fn with_iteration_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.iteration_timeout = timeout;
        self
    }

    /// Run the tool calls of one response concurrently (default) or one by one.
    pub fn with_parallel_tools(mut self, parallel: bool) -> Self {
        self.parallel_tools = parallel;
        self
    }

    pub fn with_task_kind(mut self, task: TaskKind) -> Self {
        self.task = task;
        self
    }

    /// Ask the LLM service to stream content through chunk events.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Run the loop for one user message.
    ///
    /// Every outcome, including LLM failure and cancellation, is reported
    /// through the returned [`LoopResult`]. Only invalid options are an `Err`.
    pub async fn run(
        &self,
        user_message: &str,
        ctx: &ExecutionContext,
        options: LoopOptions,
    ) -> Result<LoopResult> {
        let max_iterations = options.max_iterations.unwrap_or(self.max_iterations);
        if max_iterations == 0 {
            return Err(Error::InvalidOptions("max_iterations must be at least 1".into()));
        }
        let timeout = options.iteration_timeout.or(self.iteration_timeout);
        if timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::InvalidOptions("iteration timeout must be positive".into()));
        }

        let conversation_id = options
            .conversation_id
            .clone()
            .unwrap_or_else(|| ctx.session_id.clone());
        let events = EventEmitter::new(EventFactory::new(conversation_id.clone()), options.observer.clone());

        let mut transcript = Vec::with_capacity(options.history.len() + 2);
        if let Some(prompt) = &options.system_prompt {
            transcript.push(Message::system(prompt));
        }
        transcript.extend(
            options
                .history
                .iter()
                .filter(|m| m.role != Role::System)
                .cloned(),
        );
        transcript.push(Message::user(user_message));

        let mut state = LoopState::new(transcript);
        let tools = self.registry.get_tool_definitions();
        let dispatcher = Dispatcher {
            registry: &self.registry,
            ctx,
            events: &events,
        };

        info!(
            conversation_id = %conversation_id,
            llm = self.llm.name(),
            tools = tools.len(),
            max_iterations,
            "Starting agent loop"
        );

        while !state.is_terminal() {
            if state.iteration() >= max_iterations {
                warn!(conversation_id = %conversation_id, max_iterations, "Max iterations reached");
                state.finish(LoopStatus::MaxIterations, None);
                events.emit(EventKind::Decision {
                    decision: Decision::MaxIterationsReached,
                    reasoning: format!("Reached the limit of {max_iterations} iterations"),
                });
                break;
            }

            if options.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                info!(conversation_id = %conversation_id, "Agent loop cancelled");
                state.finish(LoopStatus::Cancelled, None);
                events.emit(EventKind::Decision {
                    decision: Decision::Cancelled,
                    reasoning: "Cancelled before the next iteration".into(),
                });
                break;
            }

            let iteration = state.iteration() + 1;
            let started = Instant::now();
            debug!(conversation_id = %conversation_id, iteration, "Agent loop iteration");
            events.emit(EventKind::IterationStarted {
                iteration,
                max_iterations,
            });

            let response = match self
                .call_llm(&state, &tools, options.cancel.as_ref(), timeout, &events)
                .await
            {
                Ok(response) => response,
                Err(failure) => {
                    // A caller cancel carries no error; a timeout or failure does.
                    let (status, decision, message, reported) = match failure {
                        CallFailure::Cancelled(Some(CancelReason::Timeout)) => (
                            LoopStatus::Cancelled,
                            Decision::Cancelled,
                            format!(
                                "LLM call timed out after {}ms",
                                timeout.map_or(0, |t| t.as_millis())
                            ),
                            true,
                        ),
                        CallFailure::Cancelled(_) => (
                            LoopStatus::Cancelled,
                            Decision::Cancelled,
                            "LLM call cancelled".to_string(),
                            false,
                        ),
                        CallFailure::Fatal(e) => {
                            (LoopStatus::Error, Decision::Failed, e.to_string(), true)
                        }
                    };
                    warn!(conversation_id = %conversation_id, iteration, %status, "Iteration aborted: {message}");
                    events.emit(EventKind::Error {
                        iteration,
                        message: message.clone(),
                        recoverable: false,
                    });
                    let error = reported.then(|| message.clone());
                    state.finish(status, error);
                    events.emit(EventKind::Decision {
                        decision,
                        reasoning: message,
                    });
                    break;
                }
            };

            let tool_calls = if response.has_tool_calls() {
                let calls = state.claim_call_ids(response.tool_calls);
                if !response.streamed && !response.content.is_empty() {
                    events.emit(EventKind::ContentChunk {
                        content: response.content.clone(),
                        is_final: false,
                    });
                }
                state.append_partial(&response.content);
                state.push_message(Message::assistant_with_calls(&response.content, calls.clone()));

                debug!(count = calls.len(), "Executing tool calls");
                let records = dispatcher.dispatch(&calls, self.parallel_tools).await;
                for record in records {
                    state.push_message(Message::tool_result(&record.id, &record.result.content));
                    state.record(record);
                }
                calls.len()
            } else {
                events.emit(EventKind::ContentChunk {
                    content: if response.streamed {
                        String::new()
                    } else {
                        response.content.clone()
                    },
                    is_final: true,
                });
                state.push_message(Message::assistant(&response.content));
                state.complete(response.content);
                events.emit(EventKind::Decision {
                    decision: Decision::TaskCompleted,
                    reasoning: "The model answered without requesting tools".into(),
                });
                0
            };

            events.emit(EventKind::IterationCompleted {
                iteration,
                duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                tool_calls,
            });
            state.complete_iteration();
        }

        let result = build_result(state);
        info!(
            conversation_id = %conversation_id,
            status = %result.status,
            iterations = result.iterations,
            tool_calls = result.tool_calls.len(),
            duration_ms = result.duration_ms,
            "Agent loop finished"
        );
        Ok(result)
    }

    async fn call_llm(
        &self,
        state: &LoopState,
        tools: &[ToolDefinition],
        cancel: Option<&CancellationToken>,
        timeout: Option<Duration>,
        events: &EventEmitter,
    ) -> std::result::Result<LlmResponse, CallFailure> {
        let guard = IterationCancellation::new(cancel, timeout);
        let on_chunk: ChunkCallback<'_> = &|chunk: &str| {
            events.emit(EventKind::ContentChunk {
                content: chunk.to_string(),
                is_final: false,
            })
        };

        let request = LlmRequest {
            task: self.task,
            messages: state.messages(),
            tools,
            cancel: guard.token(),
            on_chunk: self.streaming.then_some(on_chunk),
        };

        match guard.guard(self.llm.call(request)).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_cancellation() => Err(CallFailure::Cancelled(guard.reason())),
            Err(e) => Err(CallFailure::Fatal(e)),
        }
    }
}
