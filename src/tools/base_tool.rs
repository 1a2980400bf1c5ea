//! Tool definition: a named function with a description and a typed
//! parameter schema.
//!
//! A tool without a description or without parameter metadata is rejected at
//! construction; the model cannot call what it cannot see described.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// Errors from tool registration, parsing, or execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Description or parameter schema missing at registration.
    #[error("tool {name:?} rejected: {reason}")]
    Rejected { name: String, reason: String },
    /// A second tool with the same name registered on one agent.
    #[error("duplicate tool name: {0:?}")]
    DuplicateName(String),
    /// The model asked for a tool the agent does not have.
    #[error("unknown tool: {0:?}")]
    UnknownTool(String),
    /// The model output did not contain parseable tool-call JSON.
    #[error("tool call parse error: {0}")]
    Parse(String),
    /// The tool function itself failed.
    #[error("tool execution error: {0}")]
    Execution(String),
}

/// The callable a tool wraps. Receives the parameters object from the model.
pub type ToolFn = Arc<dyn Fn(&Value) -> Result<Value, ToolError> + Send + Sync>;

/// A named, described, schema-carrying function an agent may dispatch to.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    parameters: Value,
    func: ToolFn,
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl Tool {
    /// Create a tool, validating that both the description and the typed
    /// parameter metadata are present.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        func: ToolFn,
    ) -> Result<Self, ToolError> {
        let name = name.into();
        let description = description.into();

        if description.trim().is_empty() {
            return Err(ToolError::Rejected {
                name,
                reason: "description is required".to_string(),
            });
        }
        if !parameters.is_object() {
            return Err(ToolError::Rejected {
                name,
                reason: "parameters must be a JSON-schema object".to_string(),
            });
        }

        Ok(Self {
            name,
            description,
            parameters,
            func,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// The schema entry injected into the system message at tool-init time.
    pub fn definition(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters,
        })
    }

    /// Invoke the wrapped function.
    pub fn call(&self, parameters: &Value) -> Result<Value, ToolError> {
        (self.func)(parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_fn() -> ToolFn {
        Arc::new(|params: &Value| Ok(params.clone()))
    }

    fn object_schema() -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
        })
    }

    #[test]
    fn test_valid_tool_constructs() {
        let tool = Tool::new("echo", "Echo the input back", object_schema(), echo_fn()).unwrap();
        assert_eq!(tool.name(), "echo");
        let result = tool.call(&serde_json::json!({"text": "hi"})).unwrap();
        assert_eq!(result["text"], "hi");
    }

    #[test]
    fn test_missing_description_rejected() {
        let err = Tool::new("echo", "   ", object_schema(), echo_fn()).unwrap_err();
        assert!(matches!(err, ToolError::Rejected { .. }));
    }

    #[test]
    fn test_missing_schema_rejected() {
        let err = Tool::new("echo", "Echo", Value::Null, echo_fn()).unwrap_err();
        assert!(matches!(err, ToolError::Rejected { .. }));
    }

    #[test]
    fn test_definition_carries_all_metadata() {
        let tool = Tool::new("echo", "Echo the input back", object_schema(), echo_fn()).unwrap();
        let def = tool.definition();
        assert_eq!(def["name"], "echo");
        assert_eq!(def["description"], "Echo the input back");
        assert_eq!(def["parameters"]["type"], "object");
    }
}
