//! Tool System
//!
//! Tools are registered by name and advertised to the model through their
//! JSON-schema declarations. The orchestrator dispatches every requested call
//! through [`ToolRegistry::dispatch`], which never fails: parse errors, unknown
//! names and tool errors all come back as a result string for the tool turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::message::ToolCallRequest;

/// Result from tool dispatch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Call ID issued by the provider
    pub id: String,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (result or formatted error), always a string
    pub output: String,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: String::new(),
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: String::new(),
            success: false,
            output: error.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Parameter definition for a tool declaration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Extra JSON-schema keywords (nested `properties`, `enum`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl ParameterSchema {
    pub fn new(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required,
            schema: None,
        }
    }

    /// Attach nested schema keywords
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    fn to_property(&self) -> Value {
        let mut property = Map::new();
        property.insert("type".into(), json!(self.param_type));
        property.insert("description".into(), json!(self.description));
        if let Some(Value::Object(extra)) = &self.schema {
            for (key, value) in extra {
                property.insert(key.clone(), value.clone());
            }
        }
        Value::Object(property)
    }
}

/// Tool declaration advertised to the model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolDeclaration {
    /// Object schema for the parameters
    pub fn json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.to_property()))
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// OpenAI function-tool shape
    pub fn to_openai(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.json_schema(),
            }
        })
    }

    /// Anthropic tool shape
    pub fn to_anthropic(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.json_schema(),
        })
    }
}

/// Tool trait - implement to add new capabilities
///
/// Tools take exactly one positional argument: the single value of the
/// arguments object the model sent.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Declaration sent to providers that support tool calling
    fn declaration(&self) -> ToolDeclaration;

    /// Run the tool
    async fn invoke(&self, argument: Value) -> Result<String>;

    /// Tools whose side effect is the result never surface tool-output messages
    fn is_quiet(&self) -> bool {
        false
    }
}

/// Registry for available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_shared(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.declaration().name;
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Declarations in registration order
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.declaration())
            .collect()
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Whether failures of `name` stay off the display
    pub fn is_quiet(&self, name: &str) -> bool {
        self.tools.get(name).is_some_and(|t| t.is_quiet())
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute one requested call; failures become the result text
    pub async fn dispatch(&self, call: &ToolCallRequest) -> ToolResult {
        match self.try_dispatch(call).await {
            Ok(output) => ToolResult::success(&call.name, output).with_id(&call.id),
            Err(e) => {
                tracing::warn!(tool = %call.name, id = %call.id, error = %e, "Tool call failed");
                let output = match e {
                    AgentError::ToolNotFound(_) => e.to_string(),
                    other => format!("Error in tool {}: {}", call.name, other),
                };
                ToolResult::failure(&call.name, output).with_id(&call.id)
            }
        }
    }

    async fn try_dispatch(&self, call: &ToolCallRequest) -> Result<String> {
        let arguments = parse_arguments(&call.arguments_json)?;
        let tool = self
            .get(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        tracing::debug!(tool = %call.name, id = %call.id, "Executing tool");
        tool.invoke(single_argument(arguments)).await
    }
}

/// Parse raw arguments; anything but a JSON object is an argument error
pub fn parse_arguments(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AgentError::ToolArguments(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(AgentError::ToolArguments(e.to_string())),
    }
}

/// The first value of the arguments object, or `null` when it is empty
pub fn single_argument(arguments: Map<String, Value>) -> Value {
    arguments.into_iter().next().map_or(Value::Null, |(_, v)| v)
}
