//! Plugin domain types: bundles of tools with an optional lifecycle.
//!
//! A plugin is pure data plus an optional [`PluginLifecycle`] capability.
//! The registry that activates plugins lives in `agentloop-plugins`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::tool::Tool;

/// Activation status of a plugin inside a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    Loading,
    Loaded,
    Unloaded,
    Error,
}

/// What to do when a tool name is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Reject the whole load.
    #[default]
    Error,
    /// Overwrite the existing tool.
    Replace,
    /// Keep the existing tool and drop the new one.
    Skip,
}

/// Result of a plugin's own health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
    /// The plugin has no probe; the registry falls back to its load status.
    Unknown,
}

/// Shared dependency-injection bag handed to lifecycle hooks.
///
/// Values are keyed by type, so each type can be provided once.
#[derive(Clone, Default)]
pub struct PluginContext {
    values: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl PluginContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide a value; replaces any previous value of the same type.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.values
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|v| v.downcast::<T>().ok())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("values", &self.values.len())
            .finish()
    }
}

/// What a lifecycle hook can see while it runs.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleContext<'a> {
    /// The plugin whose hook is running.
    pub plugin: &'a str,
    /// The registry's shared context.
    pub shared: &'a PluginContext,
    /// Tool names present in the registry when the hook was invoked.
    pub registered_tools: &'a [String],
}

/// Optional lifecycle capability of a plugin.
///
/// `on_load` runs before any of the plugin's tools are registered;
/// `on_unload` runs before they are removed. All methods default to no-ops.
#[async_trait]
pub trait PluginLifecycle: Send + Sync {
    async fn on_load(&self, _ctx: LifecycleContext<'_>) -> Result<(), String> {
        Ok(())
    }

    async fn on_unload(&self, _ctx: LifecycleContext<'_>) -> Result<(), String> {
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus::Unknown
    }
}

/// A named bundle of tools.
#[derive(Clone)]
pub struct Plugin {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Prefix applied to tool names when auto-namespacing is on.
    pub namespace: Option<String>,
    /// Plugins that must already be loaded.
    pub dependencies: Vec<String>,
    pub tools: Vec<Arc<dyn Tool>>,
    pub lifecycle: Option<Arc<dyn PluginLifecycle>>,
}

impl Plugin {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            namespace: None,
            dependencies: Vec::new(),
            tools: Vec::new(),
            lifecycle: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn PluginLifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// The name a tool is registered under.
    pub fn registered_name(&self, tool_name: &str, auto_namespace: bool) -> String {
        match (&self.namespace, auto_namespace) {
            (Some(ns), true) => format!("{ns}_{tool_name}"),
            _ => tool_name.to_string(),
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("namespace", &self.namespace)
            .field("dependencies", &self.dependencies)
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("lifecycle", &self.lifecycle.is_some())
            .finish()
    }
}
