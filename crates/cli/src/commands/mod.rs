pub mod check;
pub mod replay;
pub mod tools;

use std::path::Path;

use agentloop_config::{AppConfig, ConfigError};
use agentloop_plugins::{PluginRegistry, system_plugin};

/// Load config from `path`, or from the default location with env overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env(|key| std::env::var(key).ok())?;
            Ok(config)
        }
        None => AppConfig::load(),
    }
}

/// Build a registry with the configured policy and the built-in plugins loaded.
pub async fn build_registry(config: &AppConfig) -> Result<PluginRegistry, agentloop_core::Error> {
    let mut registry = PluginRegistry::with_options(config.registry.options());
    registry.load(system_plugin()).await?;
    Ok(registry)
}
