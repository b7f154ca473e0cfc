//! `agentloop tools`: List the tools offered to the LLM.

use agentloop_config::AppConfig;

use super::build_registry;

pub async fn run(config: &AppConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let registry = build_registry(config).await?;

    if json {
        let definitions = registry.get_tool_definitions();
        println!("{}", serde_json::to_string_pretty(&definitions)?);
        return Ok(());
    }

    println!("Registered tools ({}):", registry.tool_count());
    for definition in registry.get_tool_definitions() {
        let owner = registry.tool_owner(&definition.name).unwrap_or("?");
        println!("  {:<24} [{owner}] {}", definition.name, definition.description);
    }

    Ok(())
}
