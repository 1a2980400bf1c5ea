//! The agent: a stateful executor wrapping one LLM, with memory, tools, and
//! a bounded run loop.

pub mod config;
pub mod core;
pub mod state;

use thiserror::Error;

use crate::llm::LlmError;
use crate::tools::ToolError;
use crate::utilities::output::OutputError;
use crate::utilities::persistence::PersistenceError;

pub use config::{AgentConfig, MaxLoops};
pub use core::{Agent, AgentBuilder, EvaluatorFn, StoppingCondition, DONE_TOKEN};
pub use state::AgentState;

/// Terminal errors of an agent's lifecycle or run.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Invalid construction: missing LLM collaborator or zeroed limits.
    #[error("agent configuration error: {0}")]
    Config(String),

    /// Every retry of an LLM call failed; the last transport error is kept.
    #[error("agent {agent:?} exhausted {attempts} llm attempts on task {task:?}: {source}")]
    LlmExhausted {
        agent: String,
        task: String,
        attempts: u32,
        #[source]
        source: LlmError,
    },

    /// Tool registration failure at init time.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Output shaping failure (invalid output type).
    #[error(transparent)]
    Output(#[from] OutputError),

    /// State snapshot save/load failure.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
