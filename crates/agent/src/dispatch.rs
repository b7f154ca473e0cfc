//! Tool-call dispatch.
//!
//! Resolves each requested call against the registry, runs it, and turns
//! every outcome (including unknown tools and bad arguments) into a
//! [`ToolCallRecord`]. Nothing here fails the run: the LLM sees the error
//! and decides what to do next.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use agentloop_core::message::MessageToolCall;
use agentloop_core::tool::{
    EXECUTION_ERROR, ExecutionContext, TOOL_NOT_FOUND, ToolArguments, ToolCallRecord, ToolResult,
};
use agentloop_plugins::PluginRegistry;
use chrono::Utc;
use futures::FutureExt;
use futures::future::join_all;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{Instrument, debug, warn};

use crate::stream_event::{EventEmitter, EventKind};

pub(crate) struct Dispatcher<'a> {
    pub registry: &'a PluginRegistry,
    pub ctx: &'a ExecutionContext,
    pub events: &'a EventEmitter,
}

impl Dispatcher<'_> {
    /// Run `calls` and return one record per call, in request order.
    ///
    /// With `parallel`, all calls run concurrently and a failing call does
    /// not stop its siblings.
    pub async fn dispatch(&self, calls: &[MessageToolCall], parallel: bool) -> Vec<ToolCallRecord> {
        if parallel && calls.len() > 1 {
            debug!(count = calls.len(), "Executing tool calls in parallel");
            join_all(calls.iter().map(|call| self.execute(call))).await
        } else {
            let mut records = Vec::with_capacity(calls.len());
            for call in calls {
                records.push(self.execute(call).await);
            }
            records
        }
    }

    async fn execute(&self, call: &MessageToolCall) -> ToolCallRecord {
        let timestamp = Utc::now();
        let start = Instant::now();
        let parsed = parse_arguments(&call.arguments);

        self.events.emit(EventKind::ToolCallStarted {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: match &parsed {
                Ok(args) => Value::Object(args.clone()),
                Err(_) => Value::String(call.arguments.clone()),
            },
        });

        let (arguments, result) = match (self.registry.get_tool(&call.name), parsed) {
            (None, parsed) => (
                parsed.unwrap_or_default(),
                ToolResult::failure(TOOL_NOT_FOUND, format!("Tool '{}' not found", call.name)),
            ),
            (Some(_), Err(reason)) => (
                ToolArguments::new(),
                ToolResult::failure(
                    EXECUTION_ERROR,
                    format!("Invalid arguments for '{}': {reason}", call.name),
                ),
            ),
            (Some(tool), Ok(args)) => {
                let span = tracing::info_span!(
                    parent: &self.ctx.span,
                    "tool_call",
                    call_id = %call.id,
                    tool = %call.name
                );
                let outcome = AssertUnwindSafe(tool.execute(args.clone(), self.ctx).instrument(span))
                    .catch_unwind()
                    .await;
                let result = match outcome {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => ToolResult::failure(EXECUTION_ERROR, e.to_string()),
                    Err(panic) => ToolResult::failure(
                        EXECUTION_ERROR,
                        format!("Tool '{}' panicked: {}", call.name, panic_message(&*panic)),
                    ),
                };
                (args, result)
            }
        };

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        if result.success {
            self.events.emit(EventKind::ToolCallCompleted {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                duration_ms,
                data: result.data.clone(),
            });
        } else {
            let (code, message) = match &result.error {
                Some(info) => (info.code.clone(), info.message.clone()),
                None => (EXECUTION_ERROR.to_string(), result.content.clone()),
            };
            warn!(tool = %call.name, call_id = %call.id, %code, "Tool call failed: {message}");
            self.events.emit(EventKind::ToolError {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                code,
                message,
                recoverable: true,
            });
        }

        ToolCallRecord {
            id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments,
            result,
            timestamp,
            duration_ms,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Parse the LLM's JSON argument text. Empty text and `null` mean no arguments.
pub(crate) fn parse_arguments(raw: &str) -> Result<ToolArguments, String> {
    if raw.trim().is_empty() {
        return Ok(ToolArguments::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(ToolArguments::new()),
        Ok(_) => Err("arguments must be a JSON object".into()),
        Err(e) => Err(format!("malformed JSON ({e})")),
    }
}
