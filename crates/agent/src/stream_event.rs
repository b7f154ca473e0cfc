//! Loop lifecycle events.
//!
//! [`EventFactory`] stamps immutable [`StreamEvent`]s with a unique id and a
//! timestamp that never decreases within one run. [`EventEmitter`] pairs a
//! factory with the caller's [`EventObserver`] and delivers events
//! synchronously, in emission order, with no buffering.

use std::sync::{Arc, Mutex};

use agentloop_core::message::ConversationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Why the loop stopped (or chose to stop).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    TaskCompleted,
    MaxIterationsReached,
    Cancelled,
    Failed,
}

/// Kind-specific payload of a stream event.
///
/// Serialized with an internal `type` tag:
/// - `iteration_started` / `iteration_completed`: bracket one iteration
/// - `content_chunk`: assistant text, streamed or forwarded whole
/// - `tool_call_started`: a tool call is about to run
/// - `tool_call_completed`: it succeeded
/// - `tool_error`: it failed (always recoverable)
/// - `error`: the iteration was aborted by the LLM call
/// - `decision`: the loop reached a terminal decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    IterationStarted {
        iteration: u32,
        max_iterations: u32,
    },

    IterationCompleted {
        iteration: u32,
        duration_ms: u64,
        tool_calls: usize,
    },

    ContentChunk {
        content: String,
        is_final: bool,
    },

    ToolCallStarted {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    ToolCallCompleted {
        call_id: String,
        tool_name: String,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },

    ToolError {
        call_id: String,
        tool_name: String,
        code: String,
        message: String,
        recoverable: bool,
    },

    Error {
        iteration: u32,
        message: String,
        recoverable: bool,
    },

    Decision {
        decision: Decision,
        reasoning: String,
    },
}

impl EventKind {
    /// Wire name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::IterationStarted { .. } => "iteration_started",
            Self::IterationCompleted { .. } => "iteration_completed",
            Self::ContentChunk { .. } => "content_chunk",
            Self::ToolCallStarted { .. } => "tool_call_started",
            Self::ToolCallCompleted { .. } => "tool_call_completed",
            Self::ToolError { .. } => "tool_error",
            Self::Error { .. } => "error",
            Self::Decision { .. } => "decision",
        }
    }
}

/// An immutable, timestamped, uniquely identified loop event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub conversation_id: ConversationId,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Builds events for one run.
#[derive(Debug)]
pub struct EventFactory {
    conversation_id: ConversationId,
    last: Mutex<DateTime<Utc>>,
}

impl EventFactory {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            last: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Create an event; its timestamp is never earlier than the previous one.
    pub fn create(&self, kind: EventKind) -> StreamEvent {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let timestamp = Utc::now().max(*last);
        *last = timestamp;
        StreamEvent {
            id: Uuid::new_v4().to_string(),
            timestamp,
            conversation_id: self.conversation_id.clone(),
            kind,
        }
    }
}

/// Receives every event of a run, synchronously and in order.
///
/// A slow observer blocks the loop.
pub trait EventObserver: Send + Sync {
    fn on_event(&self, event: &StreamEvent);
}

impl<F> EventObserver for F
where
    F: Fn(&StreamEvent) + Send + Sync,
{
    fn on_event(&self, event: &StreamEvent) {
        self(event)
    }
}

/// Creates and delivers events for one run.
pub struct EventEmitter {
    factory: EventFactory,
    observer: Option<Arc<dyn EventObserver>>,
    gate: Mutex<()>,
}

impl EventEmitter {
    pub fn new(factory: EventFactory, observer: Option<Arc<dyn EventObserver>>) -> Self {
        Self {
            factory,
            observer,
            gate: Mutex::new(()),
        }
    }

    /// Stamp and deliver one event.
    ///
    /// Stamping and delivery happen under one lock, so the observer sees
    /// timestamps in the order events were emitted even when concurrent
    /// tool calls emit at once.
    pub fn emit(&self, kind: EventKind) {
        let _gate = self.gate.lock().unwrap_or_else(|e| e.into_inner());
        let event = self.factory.create(kind);
        tracing::trace!(event_type = event.kind.event_type(), id = %event.id, "Loop event");
        if let Some(observer) = &self.observer {
            observer.on_event(&event);
        }
    }
}

/// Collects every event in memory.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<StreamEvent>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventObserver for EventRecorder {
    fn on_event(&self, event: &StreamEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}

/// A broadcast-based fan-out of stream events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Slow
/// subscribers lag and lose events; the loop itself never waits on them.
pub struct EventBus {
    sender: broadcast::Sender<Arc<StreamEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: StreamEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StreamEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventObserver for EventBus {
    fn on_event(&self, event: &StreamEvent) {
        self.publish(event.clone());
    }
}
