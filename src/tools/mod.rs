//! Tool support: definitions, the per-agent registry, and the executor that
//! turns model output into dispatched calls.

pub mod base_tool;
pub mod executor;
pub mod registry;

pub use base_tool::{Tool, ToolError, ToolFn};
pub use executor::{execute_tool_calls, parse_tool_calls, ToolCall};
pub use registry::ToolRegistry;
