//! # swarmcore
//!
//! A framework for composing language-model-backed agents into orchestrated
//! swarms. The core is the per-agent run loop (prompt assembly, retried LLM
//! invocation, tool dispatch, conversation accumulation, termination) plus a
//! family of topology executors (sequential chains, parallel fan-out,
//! round-robin, task queues, spreadsheet batches, DAGs, rearrangeable flows
//! with human-in-the-loop stages, hierarchical director/worker pools, and
//! group chats), all fronted by a router that selects a topology and applies
//! shared policy across its agents.
//!
//! The LLM provider, long-term memory store, and embedding backend are
//! capability traits implemented outside this crate; [`llm::mock::MockLLM`]
//! ships for tests and offline development.

pub mod agent;
pub mod context;
pub mod human;
pub mod llm;
pub mod memory;
pub mod router;
pub mod swarm;
pub mod tools;
pub mod utilities;

pub use agent::{Agent, AgentBuilder, AgentConfig, AgentError, AgentState, MaxLoops};
pub use context::RunContext;
pub use human::{CallbackInput, HumanInputProvider, TerminalInput};
pub use llm::{ChatMessage, CompletionOptions, LlmError, LLM};
pub use memory::{Conversation, LongTermMemory, Role};
pub use router::matcher::Embedder;
pub use router::{SwarmLog, SwarmRouter, SwarmType};
pub use swarm::concurrent::ConcurrentWorkflow;
pub use swarm::graph::GraphWorkflow;
pub use swarm::group_chat::GroupChat;
pub use swarm::hierarchical::HierarchicalAgentSwarm;
pub use swarm::mixture::MixtureOfAgents;
pub use swarm::rearrange::AgentRearrange;
pub use swarm::round_robin::RoundRobinSwarm;
pub use swarm::sequential::SequentialWorkflow;
pub use swarm::spreadsheet::SpreadSheetSwarm;
pub use swarm::swarm_rearrange::SwarmRearrange;
pub use swarm::task_queue::TaskQueueSwarm;
pub use swarm::{Swarm, SwarmError};
pub use tools::{Tool, ToolRegistry};
pub use utilities::output::OutputType;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
