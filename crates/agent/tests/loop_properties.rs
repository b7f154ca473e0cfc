//! Behavioral tests for the agentic loop: bounds, event ordering, tool
//! failures, concurrency, cancellation, and timeouts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agentloop_agent::{
    AgentLoop, Decision, EventKind, EventRecorder, LoopOptions, LoopResult, LoopStatus,
    ScriptStep, ScriptedLlm, StreamEvent,
};
use agentloop_core::error::{LlmError, ToolError};
use agentloop_core::message::{MessageToolCall, Role};
use agentloop_core::plugin::Plugin;
use agentloop_core::tool::{
    EXECUTION_ERROR, ExecutionContext, ParameterType, TOOL_NOT_FOUND, Tool, ToolArguments,
    ToolParameter, ToolResult,
};
use agentloop_core::{CancellationToken, LlmResponse};
use agentloop_plugins::PluginRegistry;
use async_trait::async_trait;
use serde_json::Value;

// ── Test tools ───────────────────────────────────────────────────────────

struct LookupStatus;

#[async_trait]
impl Tool for LookupStatus {
    fn name(&self) -> &str {
        "lookup_status"
    }

    fn description(&self) -> &str {
        "Look up the status of an item"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::required("id", ParameterType::Integer, "Item id")]
    }

    async fn execute(
        &self,
        arguments: ToolArguments,
        _ctx: &ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let id = arguments.get("id").and_then(Value::as_i64).unwrap_or_default();
        Ok(ToolResult::ok_with_data("ok", serde_json::json!({ "id": id, "status": "ok" })))
    }
}

struct Broken;

#[async_trait]
impl Tool for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![]
    }

    async fn execute(
        &self,
        _arguments: ToolArguments,
        _ctx: &ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "broken".into(),
            reason: "disk on fire".into(),
        })
    }
}

struct Slow;

#[async_trait]
impl Tool for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "Sleeps for 100ms"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![]
    }

    async fn execute(
        &self,
        _arguments: ToolArguments,
        _ctx: &ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(ToolResult::ok("done"))
    }
}

struct Panicky;

#[async_trait]
impl Tool for Panicky {
    fn name(&self) -> &str {
        "panicky"
    }

    fn description(&self) -> &str {
        "Panics when called"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![]
    }

    async fn execute(
        &self,
        _arguments: ToolArguments,
        _ctx: &ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        panic!("lost the plot")
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

async fn registry() -> Arc<PluginRegistry> {
    let plugin = Plugin::new("testing", "1.0.0", "Tools for loop tests")
        .with_tool(Arc::new(LookupStatus))
        .with_tool(Arc::new(Broken))
        .with_tool(Arc::new(Slow))
        .with_tool(Arc::new(Panicky));
    let mut registry = PluginRegistry::new();
    registry.load(plugin).await.unwrap();
    Arc::new(registry)
}

fn call(id: &str, name: &str, arguments: &str) -> MessageToolCall {
    MessageToolCall::new(id, name, arguments)
}

fn tools(calls: Vec<MessageToolCall>) -> LlmResponse {
    LlmResponse::with_tool_calls("", calls)
}

async fn run_with(
    llm: Arc<ScriptedLlm>,
    configure: impl FnOnce(AgentLoop) -> AgentLoop,
    options: LoopOptions,
) -> (LoopResult, Vec<StreamEvent>) {
    let recorder = Arc::new(EventRecorder::new());
    let agent = configure(AgentLoop::new(llm, registry().await));
    let result = agent
        .run(
            "What is the status of item 7?",
            &ExecutionContext::default(),
            options.with_observer(recorder.clone()),
        )
        .await
        .unwrap();
    (result, recorder.events())
}

async fn run(llm: Arc<ScriptedLlm>) -> (LoopResult, Vec<StreamEvent>) {
    run_with(llm, |a| a, LoopOptions::new()).await
}

fn decisions(events: &[StreamEvent]) -> Vec<Decision> {
    events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::Decision { decision, .. } => Some(*decision),
            _ => None,
        })
        .collect()
}

fn tool_errors(events: &[StreamEvent]) -> Vec<(String, String)> {
    events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::ToolError { call_id, code, .. } => Some((call_id.clone(), code.clone())),
            _ => None,
        })
        .collect()
}

// ── Completion ───────────────────────────────────────────────────────────

#[tokio::test]
async fn plain_answer_completes_on_first_iteration() {
    let llm = Arc::new(ScriptedLlm::new([LlmResponse::text("Nothing to look up.")]));
    let (result, events) = run(llm.clone()).await;

    assert_eq!(result.status, LoopStatus::Completed);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.content, "Nothing to look up.");
    assert!(result.tool_calls.is_empty());
    assert_eq!(llm.call_count(), 1);

    let types: Vec<_> = events.iter().map(|e| e.kind.event_type()).collect();
    assert_eq!(
        types,
        vec!["iteration_started", "content_chunk", "decision", "iteration_completed"]
    );
    assert_eq!(decisions(&events), vec![Decision::TaskCompleted]);
}

#[tokio::test]
async fn lookup_then_answer() {
    let llm = Arc::new(ScriptedLlm::new([
        tools(vec![call("c1", "lookup_status", r#"{"id": 7}"#)]),
        LlmResponse::text("Item 7 is ok"),
    ]));
    let (result, _) = run(llm.clone()).await;

    assert_eq!(result.status, LoopStatus::Completed);
    assert_eq!(result.iterations, 2);
    assert_eq!(result.content, "Item 7 is ok");
    assert_eq!(result.tool_calls.len(), 1);

    let record = &result.tool_calls[0];
    assert_eq!(record.id, "c1");
    assert_eq!(record.tool_name, "lookup_status");
    assert_eq!(record.arguments["id"], 7);
    assert!(record.result.success);
    assert_eq!(record.result.content, "ok");

    // The second LLM call sees the assistant's call and the tool's result.
    let second = &llm.recorded_calls()[1];
    let tool_msg = second.messages.last().unwrap();
    assert_eq!(tool_msg.role, Role::Tool);
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
    assert_eq!(tool_msg.content, "ok");
    assert_eq!(second.tools, vec!["broken", "lookup_status", "panicky", "slow"]);
}

// ── Bounds ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn stops_at_max_iterations() {
    let steps: Vec<_> = (1..=5)
        .map(|i| {
            LlmResponse::with_tool_calls(
                format!("Checking {i}."),
                vec![call("c", "lookup_status", r#"{"id": 1}"#)],
            )
        })
        .collect();
    let llm = Arc::new(ScriptedLlm::new(steps));
    let (result, events) = run_with(llm.clone(), |a| a, LoopOptions::new().with_max_iterations(3)).await;

    assert_eq!(result.status, LoopStatus::MaxIterations);
    assert_eq!(result.iterations, 3);
    assert_eq!(llm.call_count(), 3);
    assert_eq!(result.tool_calls.len(), 3);
    assert_eq!(result.content, "Checking 1.\n\nChecking 2.\n\nChecking 3.");
    assert_eq!(decisions(&events), vec![Decision::MaxIterationsReached]);
}

#[tokio::test]
async fn repeated_call_ids_stay_unique() {
    let steps: Vec<_> = (0..2)
        .map(|_| tools(vec![call("c", "lookup_status", r#"{"id": 1}"#)]))
        .chain([LlmResponse::text("done")])
        .collect();
    let llm = Arc::new(ScriptedLlm::new(steps));
    let (result, _) = run(llm).await;

    let ids: Vec<_> = result.tool_calls.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids[0], "c");
    assert_ne!(ids[0], ids[1]);

    // Every ledger id appears as a tool-result message in the transcript.
    for id in &ids {
        assert!(result
            .transcript
            .iter()
            .any(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some(id.as_str())));
    }
}

// ── Event ordering ───────────────────────────────────────────────────────

#[tokio::test]
async fn iteration_events_are_paired_and_ordered() {
    let llm = Arc::new(ScriptedLlm::new([
        tools(vec![call("c1", "lookup_status", r#"{"id": 1}"#)]),
        tools(vec![call("c2", "lookup_status", r#"{"id": 2}"#)]),
        LlmResponse::text("done"),
    ]));
    let (_, events) = run(llm).await;

    let mut open: Option<u32> = None;
    let mut completed = Vec::new();
    for event in &events {
        match &event.kind {
            EventKind::IterationStarted { iteration, .. } => {
                assert!(open.is_none(), "iteration {iteration} started before the previous ended");
                open = Some(*iteration);
            }
            EventKind::IterationCompleted { iteration, .. } => {
                assert_eq!(open.take(), Some(*iteration));
                completed.push(*iteration);
            }
            _ => {}
        }
    }
    assert!(open.is_none());
    assert_eq!(completed, vec![1, 2, 3]);
}

#[tokio::test]
async fn tool_events_pair_by_call_id() {
    let llm = Arc::new(ScriptedLlm::new([
        tools(vec![
            call("ok", "lookup_status", r#"{"id": 1}"#),
            call("bad", "broken", "{}"),
            call("gone", "no_such_tool", "{}"),
        ]),
        LlmResponse::text("done"),
    ]));
    let (_, events) = run(llm).await;

    let mut started = HashMap::new();
    let mut finished = HashMap::new();
    for (pos, event) in events.iter().enumerate() {
        match &event.kind {
            EventKind::ToolCallStarted { call_id, .. } => {
                assert!(started.insert(call_id.clone(), pos).is_none());
            }
            EventKind::ToolCallCompleted { call_id, .. } | EventKind::ToolError { call_id, .. } => {
                assert!(finished.insert(call_id.clone(), pos).is_none());
            }
            _ => {}
        }
    }
    assert_eq!(started.len(), 3);
    for (id, start) in &started {
        assert!(finished[id] > *start, "call {id} finished before it started");
    }
}

#[tokio::test]
async fn event_timestamps_never_decrease() {
    let llm = Arc::new(ScriptedLlm::new([
        tools(vec![
            call("a", "lookup_status", r#"{"id": 1}"#),
            call("b", "lookup_status", r#"{"id": 2}"#),
        ]),
        LlmResponse::text("done"),
    ]));
    let (_, events) = run(llm).await;

    assert!(events.len() > 5);
    for pair in events.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
    let mut ids: Vec<_> = events.iter().map(|e| e.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), events.len());
}

#[tokio::test]
async fn streamed_chunks_are_forwarded() {
    let llm = Arc::new(ScriptedLlm::new([ScriptStep::Stream {
        chunks: vec!["Item 7 ".into(), "is ok".into()],
        tool_calls: vec![],
    }]));
    let (result, events) = run_with(llm, |a| a.with_streaming(true), LoopOptions::new()).await;

    assert_eq!(result.content, "Item 7 is ok");
    let chunks: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::ContentChunk { content, is_final } => Some((content.as_str(), *is_final)),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec![("Item 7 ", false), ("is ok", false), ("", true)]);
}

#[tokio::test]
async fn interim_text_is_forwarded_once() {
    let llm = Arc::new(ScriptedLlm::new([
        LlmResponse::with_tool_calls(
            "Let me check.",
            vec![call("c1", "lookup_status", r#"{"id": 7}"#)],
        ),
        LlmResponse::text("Item 7 is ok"),
    ]));
    let (_, events) = run(llm).await;

    let chunks: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::ContentChunk { content, is_final } => Some((content.clone(), *is_final)),
            _ => None,
        })
        .collect();
    assert_eq!(
        chunks,
        vec![
            ("Let me check.".to_string(), false),
            ("Item 7 is ok".to_string(), true)
        ]
    );
}

// ── Tool failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_tool_is_reported_and_loop_continues() {
    let llm = Arc::new(ScriptedLlm::new([
        tools(vec![call("c1", "no_such_tool", "{}")]),
        LlmResponse::text("I could not find that tool."),
    ]));
    let (result, events) = run(llm.clone()).await;

    assert_eq!(result.status, LoopStatus::Completed);
    let record = &result.tool_calls[0];
    assert!(!record.result.success);
    assert_eq!(record.result.error.as_ref().unwrap().code, TOOL_NOT_FOUND);
    assert_eq!(tool_errors(&events), vec![("c1".to_string(), TOOL_NOT_FOUND.to_string())]);

    let tool_msg = llm.recorded_calls()[1].messages.last().cloned().unwrap();
    assert!(tool_msg.content.starts_with("Error:"));
    assert!(tool_msg.content.contains("no_such_tool"));
}

#[tokio::test]
async fn malformed_arguments_are_execution_errors() {
    let llm = Arc::new(ScriptedLlm::new([
        tools(vec![call("c1", "lookup_status", "{id: 7")]),
        LlmResponse::text("Sorry."),
    ]));
    let (result, events) = run(llm).await;

    let record = &result.tool_calls[0];
    assert_eq!(record.result.error.as_ref().unwrap().code, EXECUTION_ERROR);
    assert!(record.arguments.is_empty());
    assert_eq!(tool_errors(&events), vec![("c1".to_string(), EXECUTION_ERROR.to_string())]);

    let started = events
        .iter()
        .find_map(|e| match &e.kind {
            EventKind::ToolCallStarted { arguments, .. } => Some(arguments.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(started, Value::String("{id: 7".into()));
}

#[tokio::test]
async fn failing_tool_does_not_stop_siblings() {
    let llm = Arc::new(ScriptedLlm::new([
        tools(vec![
            call("bad", "broken", "{}"),
            call("good", "lookup_status", r#"{"id": 3}"#),
        ]),
        LlmResponse::text("done"),
    ]));
    let (result, events) = run(llm).await;

    assert_eq!(result.status, LoopStatus::Completed);
    assert_eq!(result.tool_calls.len(), 2);
    assert_eq!(result.tool_calls[0].id, "bad");
    assert!(!result.tool_calls[0].result.success);
    assert!(result.tool_calls[0].result.content.contains("disk on fire"));
    assert_eq!(result.tool_calls[1].id, "good");
    assert!(result.tool_calls[1].result.success);

    let recoverable = events.iter().all(|e| match &e.kind {
        EventKind::ToolError { recoverable, .. } => *recoverable,
        _ => true,
    });
    assert!(recoverable);
}

#[tokio::test]
async fn panicking_tool_is_reported_and_siblings_finish() {
    let llm = Arc::new(ScriptedLlm::new([
        tools(vec![
            call("boom", "panicky", "{}"),
            call("good", "lookup_status", r#"{"id": 3}"#),
        ]),
        LlmResponse::text("done"),
    ]));
    let (result, events) = run(llm).await;

    assert_eq!(result.status, LoopStatus::Completed);
    assert_eq!(result.tool_calls.len(), 2);
    let boom = &result.tool_calls[0];
    assert!(!boom.result.success);
    assert!(boom.result.content.contains("lost the plot"));
    assert!(result.tool_calls[1].result.success);
    assert_eq!(
        tool_errors(&events),
        vec![("boom".to_string(), EXECUTION_ERROR.to_string())]
    );
}

// ── Concurrency ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn parallel_calls_overlap() {
    let llm = Arc::new(ScriptedLlm::new([
        tools(vec![call("a", "slow", "{}"), call("b", "slow", "{}")]),
        LlmResponse::text("done"),
    ]));
    let start = tokio::time::Instant::now();
    let (result, _) = run(llm).await;

    assert_eq!(result.tool_calls.len(), 2);
    assert!(start.elapsed() < Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn sequential_calls_do_not_overlap() {
    let llm = Arc::new(ScriptedLlm::new([
        tools(vec![call("a", "slow", "{}"), call("b", "slow", "{}")]),
        LlmResponse::text("done"),
    ]));
    let start = tokio::time::Instant::now();
    let (result, _) = run_with(llm, |a| a.with_parallel_tools(false), LoopOptions::new()).await;

    assert_eq!(result.tool_calls.len(), 2);
    assert!(start.elapsed() >= Duration::from_millis(200));
    assert!(result.tool_calls.iter().all(|r| r.duration_ms >= 100));
}

// ── LLM failure, cancellation, timeout ───────────────────────────────────

#[tokio::test]
async fn llm_failure_ends_run_with_error() {
    let llm = Arc::new(ScriptedLlm::new([
        ScriptStep::from(tools(vec![call("c1", "lookup_status", r#"{"id": 7}"#)])),
        ScriptStep::Fail(LlmError::ApiError {
            status_code: 500,
            message: "upstream exploded".into(),
        }),
    ]));
    let (result, events) = run(llm).await;

    assert_eq!(result.status, LoopStatus::Error);
    assert!(result.error.as_deref().unwrap().contains("upstream exploded"));
    assert_eq!(result.iterations, 1);
    assert_eq!(result.tool_calls.len(), 1);
    assert_eq!(decisions(&events), vec![Decision::Failed]);
    assert!(events.iter().any(|e| matches!(
        e.kind,
        EventKind::Error { iteration: 2, recoverable: false, .. }
    )));
}

#[tokio::test]
async fn pre_cancelled_run_never_calls_llm() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let llm = Arc::new(ScriptedLlm::new([LlmResponse::text("unused")]));
    let (result, events) = run_with(llm.clone(), |a| a, LoopOptions::new().with_cancel(cancel)).await;

    assert_eq!(result.status, LoopStatus::Cancelled);
    assert_eq!(result.iterations, 0);
    assert_eq!(llm.call_count(), 0);
    assert!(!events
        .iter()
        .any(|e| matches!(e.kind, EventKind::IterationStarted { .. })));
    assert_eq!(decisions(&events), vec![Decision::Cancelled]);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_llm_call_keeps_completed_work() {
    let llm = Arc::new(ScriptedLlm::new([
        ScriptStep::from(LlmResponse::with_tool_calls(
            "Checking item 7.",
            vec![call("c1", "lookup_status", r#"{"id": 7}"#)],
        )),
        ScriptStep::WaitForCancel,
    ]));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let (result, events) = run_with(llm, |a| a, LoopOptions::new().with_cancel(cancel)).await;

    assert_eq!(result.status, LoopStatus::Cancelled);
    assert!(result.error.is_none());
    assert_eq!(result.iterations, 1);
    assert_eq!(result.tool_calls.len(), 1);
    assert!(result.tool_calls[0].result.success);
    assert_eq!(result.content, "Checking item 7.");
    assert_eq!(decisions(&events), vec![Decision::Cancelled]);
}

#[tokio::test(start_paused = true)]
async fn iteration_timeout_cancels_the_call() {
    let llm = Arc::new(ScriptedLlm::new([ScriptStep::WaitForCancel]));
    let start = tokio::time::Instant::now();
    let (result, _) = run_with(
        llm,
        |a| a.with_iteration_timeout(Some(Duration::from_secs(5))),
        LoopOptions::new(),
    )
    .await;

    assert_eq!(result.status, LoopStatus::Cancelled);
    assert!(result.error.as_deref().unwrap().contains("timed out"));
    assert_eq!(result.iterations, 0);
    assert!(start.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn per_run_timeout_overrides_default() {
    let llm = Arc::new(ScriptedLlm::new([ScriptStep::WaitForCancel]));
    let start = tokio::time::Instant::now();
    let (result, _) = run_with(
        llm,
        |a| a,
        LoopOptions::new().with_iteration_timeout(Duration::from_secs(2)),
    )
    .await;

    assert_eq!(result.status, LoopStatus::Cancelled);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(120));
}
