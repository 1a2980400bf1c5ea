//! Per-agent tool registry: unique names, name-to-function lookup, and the
//! combined schema message injected into the conversation at init time.

use std::collections::HashMap;

use serde_json::Value;

use super::base_tool::{Tool, ToolError};

/// The ordered set of tools one agent may dispatch to.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; names must be unique within the registry.
    pub fn register(&mut self, tool: Tool) -> Result<(), ToolError> {
        if self.index.contains_key(tool.name()) {
            return Err(ToolError::DuplicateName(tool.name().to_string()));
        }
        self.index.insert(tool.name().to_string(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Build a registry from tools, failing on the first invalid entry.
    pub fn from_tools(tools: Vec<Tool>) -> Result<Self, ToolError> {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tool> {
        self.tools.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// All tool definitions as one JSON array.
    pub fn schema(&self) -> Value {
        Value::Array(self.tools.iter().map(|t| t.definition()).collect())
    }

    /// The system message describing every registered tool, prepended to the
    /// agent's conversation when tools are configured.
    pub fn schema_message(&self) -> String {
        format!(
            "You can invoke the following tools by responding with a JSON object \
             of the form {{\"name\": ..., \"parameters\": {{...}}}} or \
             {{\"functions\": [...]}}.\nAvailable tools:\n{}",
            serde_json::to_string_pretty(&self.schema()).unwrap_or_else(|_| "[]".to_string())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tool(name: &str) -> Tool {
        Tool::new(
            name,
            format!("The {} tool", name),
            serde_json::json!({"type": "object", "properties": {}}),
            Arc::new(|_: &Value| Ok(Value::Null)),
        )
        .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ToolRegistry::from_tools(vec![tool("alpha"), tool("beta")]).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("gamma").is_none());
        assert_eq!(registry.names(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = ToolRegistry::from_tools(vec![tool("alpha"), tool("alpha")]).unwrap_err();
        assert!(matches!(err, ToolError::DuplicateName(name) if name == "alpha"));
    }

    #[test]
    fn test_schema_message_lists_all_tools() {
        let registry = ToolRegistry::from_tools(vec![tool("alpha"), tool("beta")]).unwrap();
        let message = registry.schema_message();
        assert!(message.contains("\"alpha\""));
        assert!(message.contains("\"beta\""));
        assert!(message.contains("Available tools"));
    }
}
