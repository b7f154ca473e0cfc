//! `agentloop check`: Validate configuration and plugin health.

use agentloop_config::AppConfig;

use super::build_registry;

pub async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("agentloop check");
    println!("===============\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ok    config file {}", config_path.display());
    } else {
        println!("  note  no config file at {}, using defaults", config_path.display());
    }

    println!("  ok    max_iterations = {}", config.agent.max_iterations);
    println!("  ok    iteration_timeout = {}s", config.agent.iteration_timeout_secs);
    println!(
        "  ok    tool calls run {}",
        if config.agent.parallel_tool_calls { "in parallel" } else { "sequentially" }
    );

    match build_registry(config).await {
        Ok(registry) => {
            let health = registry.health_check().await;
            for info in registry.list_plugins() {
                let healthy = health.get(&info.name).copied().unwrap_or(false);
                if healthy {
                    println!("  ok    plugin {} v{} ({} tools)", info.name, info.version, info.tools.len());
                } else {
                    println!("  FAIL  plugin {} is unhealthy ({:?})", info.name, info.status);
                    issues += 1;
                }
            }
        }
        Err(e) => {
            println!("  FAIL  registry: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed.");
        Ok(())
    } else {
        Err(format!("{issues} issue(s) found").into())
    }
}
