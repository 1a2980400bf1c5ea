//! Tool executor: parse the model's tool-call JSON and dispatch it against a
//! registry.
//!
//! The model output may wrap the JSON in a fenced Markdown block. Accepted
//! payload shapes: `{"functions": [...]}`, `{"function": {...}}`, or a bare
//! `{"name": ..., "parameters": {...}}` object. A failing tool never fails
//! the batch; its error is captured as a string result.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

use super::base_tool::ToolError;
use super::registry::ToolRegistry;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("static fence pattern")
});

/// One parsed tool invocation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub parameters: Value,
}

/// Strip a fenced Markdown code block, if present.
pub fn strip_code_fence(raw: &str) -> &str {
    // The capture borrows from `raw`, so the unfenced text comes back as-is.
    match CODE_FENCE.captures(raw) {
        Some(captures) => captures.get(1).map(|m| m.as_str()).unwrap_or(raw).trim(),
        None => raw.trim(),
    }
}

/// Parse tool calls out of raw model output.
///
/// Returns `Ok(None)` when the output carries no JSON object at all (a plain
/// prose answer), `Err` when JSON is present but malformed or of an
/// unrecognized shape.
pub fn parse_tool_calls(raw: &str) -> Result<Option<Vec<ToolCall>>, ToolError> {
    let body = strip_code_fence(raw);
    if !body.contains('{') {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| ToolError::Parse(format!("invalid tool-call json: {}", e)))?;

    let entries: Vec<Value> = if let Some(functions) = value.get("functions") {
        functions
            .as_array()
            .cloned()
            .ok_or_else(|| ToolError::Parse("\"functions\" must be an array".to_string()))?
    } else if let Some(function) = value.get("function") {
        vec![function.clone()]
    } else if value.get("name").is_some() {
        vec![value]
    } else {
        return Err(ToolError::Parse(
            "expected \"functions\", \"function\", or a {name, parameters} object".to_string(),
        ));
    };

    let mut calls = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = entry
            .get("name")
            .and_then(|n| n.as_str())
            .ok_or_else(|| ToolError::Parse("tool entry missing \"name\"".to_string()))?
            .to_string();
        let parameters = entry
            .get("parameters")
            .or_else(|| entry.get("arguments"))
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        calls.push(ToolCall { name, parameters });
    }

    Ok(Some(calls))
}

/// Dispatch parsed calls against the registry.
///
/// A single call returns `{"result": ...}`; several calls return
/// `{"results": {name: stringified-output}, "summary": "..."}`. An unknown
/// tool records `null`; a failing tool records an `"Error: ..."` string.
pub fn execute_tool_calls(registry: &ToolRegistry, calls: &[ToolCall]) -> Value {
    if calls.len() == 1 {
        return json!({ "result": dispatch(registry, &calls[0]) });
    }

    let mut results = Map::new();
    for call in calls {
        let outcome = dispatch(registry, call);
        let stringified = match outcome {
            Value::Null => Value::Null,
            Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        };
        results.insert(call.name.clone(), stringified);
    }

    let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
    json!({
        "results": Value::Object(results),
        "summary": format!("Executed {} tool calls: {}", calls.len(), names.join(", ")),
    })
}

fn dispatch(registry: &ToolRegistry, call: &ToolCall) -> Value {
    match registry.get(&call.name) {
        None => {
            log::warn!("tool call to unregistered tool {:?}", call.name);
            Value::Null
        }
        Some(tool) => match tool.call(&call.parameters) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("tool {:?} failed: {}", call.name, e);
                Value::String(format!("Error: {}", e))
            }
        },
    }
}
