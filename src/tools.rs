//! # Tools
//!
//! Tools are the local functions the model may ask the agent to run. This
//! module provides two layers:
//!
//! 1. **[`ToolExecutor`]**: the seam the agent loop calls. It receives a
//!    [`ToolUseBlock`] and returns the text that goes back to the model as a
//!    tool result. Anything that can resolve tool calls (an RPC client, a
//!    sandbox, a test double) can implement it.
//!
//! 2. **[`Tool`] / [`ToolSet`]**: a ready-made executor built from async
//!    closures. Each [`Tool`] carries its name, description, input schema and
//!    handler; a [`ToolSet`] dispatches invocations by name.
//!
//! ## Schema notation
//!
//! Input schemas can be written in three ways and are normalised to the
//! `{type: "object", properties, required}` shape the service expects:
//!
//! - **Simple notation**: `{"location": "string", "units": "string"}`
//! - **Typed properties**: `{"limit": {"type": "integer", "optional": true}}`
//! - **Full schema**: already has `type` and `properties`; kept as-is
//!
//! ## Example
//!
//! ```rust,no_run
//! use messages_sdk::{tool, Result};
//! use serde_json::json;
//!
//! let weather = tool("get_weather", "Get current weather for a city")
//!     .param("city", "string")
//!     .build(|args| async move {
//!         let city = args["city"].as_str().unwrap_or("Unknown");
//!         Ok(json!({"city": city, "temperature": 22}))
//!     });
//! ```

use crate::types::{InputSchema, ToolDefinition, ToolUseBlock};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Resolves tool invocations requested by the model.
///
/// Called once per tool-use block. A returned error does not abort the
/// agent's turn; it is sent back to the model as an error tool result.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_use: &ToolUseBlock) -> Result<String>;
}

/// Type-erased async tool handler.
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// A tool definition paired with the handler that runs it.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    input_schema: InputSchema,
    handler: ToolHandler,
}

impl Tool {
    /// Create a tool. `input_schema` accepts any of the notations described
    /// in the module docs.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: normalize_schema(input_schema),
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    /// Run the handler with the given input.
    pub async fn call(&self, input: Value) -> Result<Value> {
        (self.handler)(input).await
    }

    /// The definition advertised to the service.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(&self.name, &self.description, self.input_schema.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &InputSchema {
        &self.input_schema
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

#[async_trait]
impl ToolExecutor for Tool {
    async fn execute(&self, tool_use: &ToolUseBlock) -> Result<String> {
        let output = self.call(tool_use.input.clone()).await?;
        Ok(output_to_text(output))
    }
}

/// Tool output is sent back as text; strings are passed through verbatim.
fn output_to_text(output: Value) -> String {
    match output {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Registry of tools that dispatches invocations by name.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    tools: HashMap<String, Arc<Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any previous tool with the same name.
    pub fn insert(&mut self, tool: Arc<Tool>) {
        if let Some(previous) = self.tools.insert(tool.name.clone(), tool) {
            log::warn!("Tool '{}' registered twice; keeping the later one", previous.name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Tool>> {
        self.tools.get(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl FromIterator<Arc<Tool>> for ToolSet {
    fn from_iter<I: IntoIterator<Item = Arc<Tool>>>(iter: I) -> Self {
        let mut set = ToolSet::new();
        for tool in iter {
            set.insert(tool);
        }
        set
    }
}

#[async_trait]
impl ToolExecutor for ToolSet {
    async fn execute(&self, tool_use: &ToolUseBlock) -> Result<String> {
        let tool = self
            .tools
            .get(&tool_use.name)
            .ok_or_else(|| Error::tool(format!("unknown tool '{}'", tool_use.name)))?;

        log::debug!("Executing tool '{}' ({})", tool_use.name, tool_use.id);
        tool.execute(tool_use).await
    }
}

/// Normalise any accepted schema notation to an object schema.
fn normalize_schema(schema: Value) -> InputSchema {
    let Value::Object(obj) = schema else {
        return InputSchema::default();
    };

    if obj.contains_key("type") && obj.contains_key("properties") {
        return match serde_json::from_value(Value::Object(obj)) {
            Ok(full) => full,
            Err(e) => {
                log::warn!("Ignoring unusable tool schema: {}", e);
                InputSchema::default()
            }
        };
    }

    let mut properties = Map::new();
    let mut required = Vec::new();

    for (param_name, param_type) in obj {
        match param_type {
            Value::String(type_str) => {
                properties.insert(param_name.clone(), type_to_json_schema(&type_str));
                required.push(param_name);
            }
            Value::Object(mut prop) => {
                // `optional` and per-property `required` are notation, not schema.
                let is_optional = prop
                    .remove("optional")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let is_required = prop.remove("required").and_then(|v| v.as_bool());
                let has_default = prop.contains_key("default");

                properties.insert(param_name.clone(), Value::Object(prop));

                match is_required {
                    Some(true) => required.push(param_name),
                    Some(false) => {}
                    None if is_optional || has_default => {}
                    None => required.push(param_name),
                }
            }
            other => {
                log::warn!(
                    "Ignoring parameter '{}' with unsupported schema {}",
                    param_name,
                    other
                );
            }
        }
    }

    InputSchema {
        kind: "object".to_string(),
        properties,
        required,
    }
}

fn type_to_json_schema(type_str: &str) -> Value {
    let json_type = match type_str {
        "string" | "str" => "string",
        "integer" | "int" | "i32" | "i64" | "u32" | "u64" => "integer",
        "number" | "float" | "f32" | "f64" => "number",
        "boolean" | "bool" => "boolean",
        "array" | "list" | "vec" => "array",
        "object" | "dict" | "map" => "object",
        _ => "string",
    };

    serde_json::json!({ "type": json_type })
}

/// Builder for [`Tool`] using simple parameter notation.
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Map<String, Value>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: Map::new(),
        }
    }

    /// Replace the whole schema. Non-object values are ignored.
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = match schema {
            Value::Object(obj) => obj,
            _ => Map::new(),
        };
        self
    }

    /// Add a required parameter of the given simple type.
    pub fn param(mut self, name: &str, type_str: &str) -> Self {
        self.schema
            .insert(name.to_string(), Value::String(type_str.to_string()));
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Tool::new(self.name, self.description, Value::Object(self.schema), handler)
    }
}

/// Start building a tool.
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}
