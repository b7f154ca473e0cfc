//! Tool trait: the abstraction over agent capabilities.
//!
//! A tool is a named, schema-described unit of work. Tools carry no state
//! the loop depends on; they are registered through plugins and invoked by
//! the agentic loop when the LLM requests them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::message::ConversationId;

/// Parsed tool arguments: a key → value map.
pub type ToolArguments = Map<String, Value>;

/// Error code for a call naming a tool the registry does not know.
pub const TOOL_NOT_FOUND: &str = "TOOL_NOT_FOUND";
/// Error code for a tool whose execution failed, or whose arguments could not be parsed.
pub const EXECUTION_ERROR: &str = "EXECUTION_ERROR";

/// The JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    /// Allowed values, if the parameter is an enumeration.
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl ToolParameter {
    /// A required parameter.
    pub fn required(
        name: impl Into<String>,
        param_type: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: true,
            enum_values: None,
        }
    }

    /// An optional parameter.
    pub fn optional(
        name: impl Into<String>,
        param_type: ParameterType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    /// Restrict the parameter to a fixed set of values.
    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// How dangerous a tool is to run unattended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The (possibly namespaced) tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: Value,
}

/// Structured error attached to a failed tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolErrorInfo {
    pub code: String,
    pub message: String,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// Human-readable output
    pub content: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Error code and message when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorInfo>,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            data: None,
            error: None,
        }
    }

    pub fn ok_with_data(content: impl Into<String>, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::ok(content)
        }
    }

    /// A failure result; the message doubles as the human-readable content.
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            content: format!("Error: {message}"),
            data: None,
            error: Some(ToolErrorInfo {
                code: code.into(),
                message,
            }),
        }
    }

    /// The error message, if this is a failure.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

/// One completed (or failed) tool invocation. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// The id the LLM issued for this call
    pub id: String,
    pub tool_name: String,
    pub arguments: ToolArguments,
    pub result: ToolResult,
    /// When the call was issued
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Context handed to every tool execution.
///
/// The loop passes it through untouched; tools use `span` as their logger.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub session_id: ConversationId,
    pub span: tracing::Span,
    pub metadata: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(session_id: ConversationId) -> Self {
        let span = tracing::info_span!("tool_session", session_id = %session_id);
        Self {
            session_id,
            span,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(ConversationId::new())
    }
}

/// The core Tool trait.
///
/// Tools are registered through plugins and made available to the agent
/// loop by the plugin registry.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The bare name of this tool, unique within its plugin.
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// Declared parameters.
    fn parameters(&self) -> Vec<ToolParameter>;

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }

    fn requires_confirmation(&self) -> bool {
        false
    }

    /// Execute the tool with parsed arguments.
    async fn execute(
        &self,
        arguments: ToolArguments,
        ctx: &ExecutionContext,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Render this tool's schema under its bare name.
    fn definition(&self) -> ToolDefinition {
        self.definition_with_name(self.name())
    }

    /// Render this tool's schema under a registered (e.g. namespaced) name.
    fn definition_with_name(&self, name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: self.description().to_string(),
            parameters: parameters_schema(&self.parameters()),
        }
    }
}

/// Build a JSON Schema object from declared parameters.
pub fn parameters_schema(params: &[ToolParameter]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in params {
        let mut prop = Map::new();
        prop.insert("type".into(), Value::String(param.param_type.as_str().into()));
        if !param.description.is_empty() {
            prop.insert("description".into(), Value::String(param.description.clone()));
        }
        if let Some(values) = &param.enum_values {
            prop.insert(
                "enum".into(),
                Value::Array(values.iter().cloned().map(Value::String).collect()),
            );
        }
        properties.insert(param.name.clone(), Value::Object(prop));
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
