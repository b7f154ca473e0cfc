//! Plugin registry for agentloop.
//!
//! Plugins bundle tools. The registry validates them, applies namespacing
//! and the configured conflict policy, activates them in dependency order,
//! and exposes the resulting tool table to the agentic loop.

pub mod builtin;
pub mod registry;
pub mod validation;

pub use builtin::system_plugin;
pub use registry::{PluginInfo, PluginRegistry, RegistryOptions};
pub use validation::validate_plugin;
