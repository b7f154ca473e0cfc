//! `agentloop replay`: Drive the loop with a scripted LLM.
//!
//! Events are printed to stdout as JSON lines while the run progresses,
//! followed by the final result. Ctrl-C cancels the run.

use std::path::Path;
use std::sync::Arc;

use agentloop_agent::{AgentLoop, LoopOptions, ScriptedLlm, StreamEvent};
use agentloop_config::AppConfig;
use agentloop_core::tool::ExecutionContext;
use tokio_util::sync::CancellationToken;

use super::build_registry;

pub async fn run(
    config: &AppConfig,
    script: &Path,
    message: &str,
    max_iterations: Option<u32>,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let script = std::fs::read_to_string(script)
        .map_err(|e| format!("Failed to read script {}: {e}", script.display()))?;
    let llm = ScriptedLlm::from_json(&script).map_err(|e| format!("Invalid script: {e}"))?;
    let registry = build_registry(config).await?;

    let agent = AgentLoop::new(Arc::new(llm), Arc::new(registry))
        .with_max_iterations(config.agent.max_iterations)
        .with_iteration_timeout(Some(config.agent.iteration_timeout()))
        .with_parallel_tools(config.agent.parallel_tool_calls)
        .with_streaming(stream);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    let mut options = LoopOptions::new()
        .with_cancel(cancel)
        .with_observer(Arc::new(|event: &StreamEvent| {
            match serde_json::to_string(event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!("Failed to serialize event: {e}"),
            }
        }));
    if let Some(prompt) = &config.agent.system_prompt {
        options = options.with_system_prompt(prompt);
    }
    if let Some(max) = max_iterations {
        options = options.with_max_iterations(max);
    }

    let result = agent.run(message, &ExecutionContext::default(), options).await?;

    let summary = serde_json::json!({
        "status": result.status,
        "content": result.content,
        "iterations": result.iterations,
        "tool_calls": result.tool_calls.len(),
        "duration_ms": result.duration_ms,
        "error": result.error,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
