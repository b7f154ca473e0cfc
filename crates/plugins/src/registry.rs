//! Plugin registry: owns the shared tool table.
//!
//! Loading validates a plugin, checks its dependencies, runs its `on_load`
//! hook, and only then registers its tools (namespaced when configured).
//! Unloading runs `on_unload` and removes the tools again.
//!
//! The registry performs no internal locking: `load`/`unload` take
//! `&mut self`, and callers that share a registry across tasks must
//! serialize mutation themselves.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use agentloop_core::error::PluginError;
use agentloop_core::plugin::{
    ConflictStrategy, HealthStatus, LifecycleContext, Plugin, PluginContext, PluginStatus,
};
use agentloop_core::tool::{Tool, ToolDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::validation::validate_plugin;

/// Registry behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryOptions {
    /// Validate plugin manifests and tool declarations on load.
    pub strict: bool,
    /// Prefix tool names with the plugin namespace, when one is declared.
    pub auto_namespace: bool,
    pub conflict_strategy: ConflictStrategy,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            strict: true,
            auto_namespace: true,
            conflict_strategy: ConflictStrategy::Error,
        }
    }
}

/// A snapshot of one plugin's registry bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub namespace: Option<String>,
    pub status: PluginStatus,
    /// Registered tool names currently owned by this plugin.
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct PluginEntry {
    plugin: Plugin,
    status: PluginStatus,
    tools: Vec<String>,
    error: Option<String>,
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    owner: String,
}

/// Owns plugins and the tool table the agentic loop resolves calls against.
pub struct PluginRegistry {
    options: RegistryOptions,
    plugins: HashMap<String, PluginEntry>,
    tools: HashMap<String, RegisteredTool>,
    context: PluginContext,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::with_options(RegistryOptions::default())
    }

    pub fn with_options(options: RegistryOptions) -> Self {
        Self {
            options,
            plugins: HashMap::new(),
            tools: HashMap::new(),
            context: PluginContext::new(),
        }
    }

    pub fn options(&self) -> RegistryOptions {
        self.options
    }

    /// Inject the shared context handed to lifecycle hooks.
    pub fn set_context(&mut self, context: PluginContext) {
        self.context = context;
    }

    pub fn context(&self) -> &PluginContext {
        &self.context
    }

    /// Validate and activate a plugin.
    ///
    /// Dependencies must already be loaded; they are not loaded
    /// transitively. Loading is atomic: if a tool conflict aborts it, tools
    /// registered during this call are rolled back and the plugin is kept
    /// in `Error` status.
    pub async fn load(&mut self, plugin: Plugin) -> Result<(), PluginError> {
        let name = plugin.name.clone();

        match self.plugins.get(&name).map(|e| e.status) {
            Some(PluginStatus::Loading) => {
                return Err(PluginError::CircularDependency { plugin: name });
            }
            Some(PluginStatus::Loaded) => return Err(PluginError::AlreadyLoaded(name)),
            _ => {}
        }

        if self.options.strict {
            validate_plugin(&plugin)?;
        }
        self.check_dependencies(&plugin)?;

        debug!(plugin = %name, tools = plugin.tools.len(), "Loading plugin");
        let lifecycle = plugin.lifecycle.clone();
        let pending_tools = plugin.tools.clone();
        let namespaced: Vec<String> = pending_tools
            .iter()
            .map(|t| plugin.registered_name(t.name(), self.options.auto_namespace))
            .collect();

        self.plugins.insert(
            name.clone(),
            PluginEntry {
                plugin,
                status: PluginStatus::Loading,
                tools: Vec::new(),
                error: None,
            },
        );

        if let Some(lifecycle) = lifecycle {
            let registered = self.list_tools();
            let ctx = LifecycleContext {
                plugin: &name,
                shared: &self.context,
                registered_tools: &registered,
            };
            if let Err(message) = lifecycle.on_load(ctx).await {
                self.mark_failed(&name, &message);
                return Err(PluginError::Hook { plugin: name, message });
            }
        }

        let mut registered_now = Vec::new();
        for (tool, tool_name) in pending_tools.into_iter().zip(namespaced) {
            if let Some(owner) = self.tool_owner(&tool_name).map(str::to_string) {
                match self.options.conflict_strategy {
                    ConflictStrategy::Error => {
                        for rolled_back in &registered_now {
                            self.tools.remove(rolled_back);
                        }
                        let message = format!("tool '{tool_name}' already registered by '{owner}'");
                        warn!(
                            plugin = %name,
                            tool = %tool_name,
                            owner = %owner,
                            rolled_back = registered_now.len(),
                            "Tool conflict, load aborted"
                        );
                        self.mark_failed(&name, &message);
                        return Err(PluginError::ToolConflict {
                            plugin: name,
                            tool: tool_name,
                        });
                    }
                    ConflictStrategy::Skip => {
                        debug!(plugin = %name, tool = %tool_name, "Tool exists, skipping");
                        continue;
                    }
                    ConflictStrategy::Replace => {
                        debug!(plugin = %name, tool = %tool_name, previous_owner = %owner, "Replacing tool");
                        if let Some(entry) = self.plugins.get_mut(&owner) {
                            entry.tools.retain(|t| t != &tool_name);
                        }
                    }
                }
            }
            self.tools.insert(
                tool_name.clone(),
                RegisteredTool {
                    tool,
                    owner: name.clone(),
                },
            );
            registered_now.push(tool_name);
        }

        if let Some(entry) = self.plugins.get_mut(&name) {
            entry.status = PluginStatus::Loaded;
            entry.tools = registered_now;
            entry.error = None;
            info!(plugin = %name, version = %entry.plugin.version, tools = entry.tools.len(), "Loaded plugin");
        }
        Ok(())
    }

    /// Load a batch of plugins in dependency order.
    ///
    /// Stops at the first failure; plugins loaded before it stay loaded.
    pub async fn load_all(&mut self, plugins: Vec<Plugin>) -> Result<(), PluginError> {
        for plugin in dependency_order(plugins)? {
            self.load(plugin).await?;
        }
        Ok(())
    }

    /// Deactivate a plugin and remove its tools.
    ///
    /// Only `Loaded` plugins can be unloaded; an unloaded or failed plugin
    /// keeps its bookkeeping and its hooks are not run. A failing
    /// `on_unload` hook is logged and does not block removal.
    pub async fn unload(&mut self, name: &str) -> Result<(), PluginError> {
        let Some(entry) = self.plugins.get(name) else {
            return Err(PluginError::NotFound(name.to_string()));
        };
        if entry.status != PluginStatus::Loaded {
            debug!(plugin = %name, status = ?entry.status, "Unload refused, plugin not loaded");
            return Err(PluginError::NotLoaded(name.to_string()));
        }

        let mut dependents: Vec<&str> = self
            .plugins
            .values()
            .filter(|e| e.status == PluginStatus::Loaded)
            .filter(|e| e.plugin.dependencies.iter().any(|d| d == name))
            .map(|e| e.plugin.name.as_str())
            .collect();
        if !dependents.is_empty() {
            dependents.sort_unstable();
            return Err(PluginError::HasDependents {
                plugin: name.to_string(),
                dependents: dependents.join(", "),
            });
        }

        if let Some(lifecycle) = entry.plugin.lifecycle.clone() {
            let registered = self.list_tools();
            let ctx = LifecycleContext {
                plugin: name,
                shared: &self.context,
                registered_tools: &registered,
            };
            if let Err(message) = lifecycle.on_unload(ctx).await {
                warn!(plugin = %name, error = %message, "Plugin cleanup failed, removing anyway");
            }
        }

        if let Some(entry) = self.plugins.get_mut(name) {
            for tool_name in entry.tools.drain(..) {
                if self.tools.get(&tool_name).is_some_and(|t| t.owner == name) {
                    self.tools.remove(&tool_name);
                }
            }
            entry.status = PluginStatus::Unloaded;
        }
        info!(plugin = %name, "Unloaded plugin");
        Ok(())
    }

    /// Get a tool by its registered (possibly namespaced) name.
    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|t| Arc::clone(&t.tool))
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All registered tool names, sorted.
    pub fn list_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Schemas for every registered tool, under registered names, sorted by name.
    pub fn get_tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .iter()
            .map(|(name, t)| t.tool.definition_with_name(name))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// The plugin that registered a tool.
    pub fn tool_owner(&self, tool_name: &str) -> Option<&str> {
        self.tools.get(tool_name).map(|t| t.owner.as_str())
    }

    pub fn get_plugin_status(&self, name: &str) -> Option<PluginStatus> {
        self.plugins.get(name).map(|e| e.status)
    }

    /// Bookkeeping for every known plugin, sorted by name.
    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        let mut infos: Vec<PluginInfo> = self
            .plugins
            .values()
            .map(|e| PluginInfo {
                name: e.plugin.name.clone(),
                version: e.plugin.version.clone(),
                namespace: e.plugin.namespace.clone(),
                status: e.status,
                tools: e.tools.clone(),
                error: e.error.clone(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Run every plugin's health probe.
    ///
    /// Plugins without a probe are healthy iff loaded; probe failures count
    /// as unhealthy.
    pub async fn health_check(&self) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for (name, entry) in &self.plugins {
            let loaded = entry.status == PluginStatus::Loaded;
            let healthy = match &entry.plugin.lifecycle {
                Some(lifecycle) => match lifecycle.health_check().await {
                    HealthStatus::Healthy => true,
                    HealthStatus::Unhealthy(reason) => {
                        warn!(plugin = %name, reason = %reason, "Plugin unhealthy");
                        false
                    }
                    HealthStatus::Unknown => loaded,
                },
                None => loaded,
            };
            results.insert(name.clone(), healthy);
        }
        results
    }

    fn check_dependencies(&self, plugin: &Plugin) -> Result<(), PluginError> {
        for dep in &plugin.dependencies {
            if dep == &plugin.name {
                return Err(PluginError::CircularDependency {
                    plugin: plugin.name.clone(),
                });
            }
            if self.get_plugin_status(dep) != Some(PluginStatus::Loaded) {
                return Err(PluginError::MissingDependency {
                    plugin: plugin.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
        Ok(())
    }

    fn mark_failed(&mut self, name: &str, message: &str) {
        if let Some(entry) = self.plugins.get_mut(name) {
            entry.status = PluginStatus::Error;
            entry.tools.clear();
            entry.error = Some(message.to_string());
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Order a batch so every plugin follows the batch members it depends on.
///
/// Dependencies outside the batch are left for `load` to check.
fn dependency_order(plugins: Vec<Plugin>) -> Result<Vec<Plugin>, PluginError> {
    let in_batch: HashSet<String> = plugins.iter().map(|p| p.name.clone()).collect();
    let mut placed: HashSet<String> = HashSet::new();
    let mut ordered = Vec::with_capacity(plugins.len());
    let mut remaining = plugins;

    while !remaining.is_empty() {
        let before = remaining.len();
        let mut blocked = Vec::new();
        for plugin in remaining {
            let ready = plugin
                .dependencies
                .iter()
                .all(|d| !in_batch.contains(d) || placed.contains(d));
            if ready {
                placed.insert(plugin.name.clone());
                ordered.push(plugin);
            } else {
                blocked.push(plugin);
            }
        }
        if blocked.len() == before {
            return Err(PluginError::CircularDependency {
                plugin: blocked[0].name.clone(),
            });
        }
        remaining = blocked;
    }

    Ok(ordered)
}
