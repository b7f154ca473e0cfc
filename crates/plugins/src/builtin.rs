//! The built-in `system` plugin.
//!
//! Small, side-effect-free tools that are always safe to expose: they let
//! the loop be exercised end-to-end without network or filesystem access.

use std::sync::Arc;

use agentloop_core::error::ToolError;
use agentloop_core::plugin::Plugin;
use agentloop_core::tool::{
    ExecutionContext, ParameterType, Tool, ToolArguments, ToolParameter, ToolResult,
};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;

pub const SYSTEM_PLUGIN: &str = "system";

/// Build the `system` plugin (namespace `system`).
pub fn system_plugin() -> Plugin {
    Plugin::new(SYSTEM_PLUGIN, env!("CARGO_PKG_VERSION"), "Built-in utility tools")
        .with_namespace("system")
        .with_tool(Arc::new(EchoTool))
        .with_tool(Arc::new(CurrentTimeTool))
}

/// Echoes its `text` argument back.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text back unchanged. Useful for testing tool calling."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::required(
            "text",
            ParameterType::String,
            "The text to echo back",
        )]
    }

    async fn execute(
        &self,
        arguments: ToolArguments,
        ctx: &ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let text = arguments
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;
        ctx.span.in_scope(|| tracing::debug!(len = text.len(), "echo"));
        Ok(ToolResult::ok(text))
    }
}

/// Reports the current UTC time.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time in UTC (RFC 3339)."
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![ToolParameter::optional(
            "precision",
            ParameterType::String,
            "Fractional-second precision (default: seconds)",
        )
        .with_enum(["seconds", "millis"])]
    }

    async fn execute(
        &self,
        arguments: ToolArguments,
        _ctx: &ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let format = match arguments.get("precision").and_then(Value::as_str) {
            None | Some("seconds") => SecondsFormat::Secs,
            Some("millis") => SecondsFormat::Millis,
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "Unknown precision '{other}'"
                )));
            }
        };
        let now = Utc::now();
        let stamp = now.to_rfc3339_opts(format, true);
        Ok(ToolResult::ok_with_data(
            stamp.clone(),
            serde_json::json!({ "utc": stamp, "unix": now.timestamp() }),
        ))
    }
}
