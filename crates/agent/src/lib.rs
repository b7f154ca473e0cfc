//! The agentic loop.
//!
//! A run follows a **call → act → observe** cycle:
//!
//! 1. **Send** the transcript and the registry's tool schemas to the LLM
//! 2. **If tool calls**: run them (concurrently by default), append one
//!    tool-result message per call, and go back to step 1
//! 3. **If text only**: that text is the answer and the run completes
//!
//! The run also stops when the iteration bound is hit, when the caller's
//! cancellation token trips, when an LLM call times out, or when the LLM
//! service fails. Every outcome is summarized in a [`LoopResult`], and the
//! caller can follow along through [`StreamEvent`]s.

pub mod cancel;
mod dispatch;
pub mod loop_runner;
pub mod result;
pub mod scripted;
pub mod state;
pub mod stream_event;

pub use cancel::{CancelReason, IterationCancellation};
pub use loop_runner::{AgentLoop, DEFAULT_ITERATION_TIMEOUT, DEFAULT_MAX_ITERATIONS, LoopOptions};
pub use result::{LoopResult, build_result};
pub use scripted::{RecordedCall, ScriptStep, ScriptedLlm};
pub use state::{LoopState, LoopStatus};
pub use stream_event::{
    Decision, EventBus, EventEmitter, EventFactory, EventKind, EventObserver, EventRecorder,
    StreamEvent,
};
