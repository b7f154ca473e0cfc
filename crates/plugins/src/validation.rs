//! Strict-mode validation of plugin manifests and tool declarations.
//!
//! Every rule is checked and all violations are reported together, so a
//! rejected plugin names everything that is wrong with it at once.

use std::collections::HashSet;
use std::sync::LazyLock;

use agentloop_core::error::PluginError;
use agentloop_core::plugin::Plugin;
use agentloop_core::tool::Tool;
use regex_lite::Regex;

static PLUGIN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("valid plugin name pattern"));

static TOOL_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid tool name pattern"));

static PARAM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid parameter pattern"));

static NAMESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid namespace pattern"));

/// Validate a plugin and all of its tools.
pub fn validate_plugin(plugin: &Plugin) -> Result<(), PluginError> {
    let mut violations = Vec::new();

    if !PLUGIN_NAME.is_match(&plugin.name) {
        violations.push(format!("plugin name '{}' is not a valid identifier", plugin.name));
    }
    if plugin.version.trim().is_empty() {
        violations.push("version must not be empty".to_string());
    }
    if plugin.description.trim().is_empty() {
        violations.push("description must not be empty".to_string());
    }
    if let Some(ns) = &plugin.namespace
        && !NAMESPACE.is_match(ns)
    {
        violations.push(format!("namespace '{ns}' is not a valid identifier"));
    }
    for dep in &plugin.dependencies {
        if dep.trim().is_empty() {
            violations.push("dependency names must not be empty".to_string());
        }
    }

    let mut seen = HashSet::new();
    for tool in &plugin.tools {
        if !seen.insert(tool.name().to_string()) {
            violations.push(format!("tool '{}' is declared more than once", tool.name()));
        }
        violations.extend(tool_violations(tool.as_ref()));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(PluginError::Validation {
            plugin: plugin.name.clone(),
            reason: violations.join("; "),
        })
    }
}

/// Rule violations for a single tool declaration.
pub fn tool_violations(tool: &dyn Tool) -> Vec<String> {
    let mut violations = Vec::new();
    let name = tool.name();

    if !TOOL_NAME.is_match(name) {
        violations.push(format!("tool name '{name}' is not a valid identifier"));
    }
    if tool.description().trim().is_empty() {
        violations.push(format!("tool '{name}' has an empty description"));
    }

    let mut params = HashSet::new();
    for param in tool.parameters() {
        if !PARAM_NAME.is_match(&param.name) {
            violations.push(format!(
                "tool '{name}' parameter '{}' is not a valid identifier",
                param.name
            ));
        }
        if !params.insert(param.name.clone()) {
            violations.push(format!(
                "tool '{name}' declares parameter '{}' more than once",
                param.name
            ));
        }
        if param.enum_values.as_ref().is_some_and(Vec::is_empty) {
            violations.push(format!(
                "tool '{name}' parameter '{}' has an empty enum",
                param.name
            ));
        }
    }

    violations
}
