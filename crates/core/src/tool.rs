//! ToolGateway trait: the abstraction over the remote tool service.
//!
//! The conversation loop never talks to the tool service directly. It asks a
//! gateway for the catalogue once per run and invokes tools by name.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ToolError;

/// Normalized tool output: always a JSON object.
pub type ToolPayload = Map<String, Value>;

/// A tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool name, unique within one listing
    pub name: String,

    /// Description of what the tool does (may be empty)
    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the tool's parameters
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
}

/// The schema used when a tool does not declare one.
pub fn empty_object_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}

impl ToolDescriptor {
    /// The OpenAI function-calling shape sent upstream.
    pub fn to_function_spec(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// The core ToolGateway trait.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// Fetch the full tool catalogue.
    async fn list_tools(&self) -> std::result::Result<Vec<ToolDescriptor>, ToolError>;

    /// Invoke a tool and return its normalized payload.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> std::result::Result<ToolPayload, ToolError>;
}
