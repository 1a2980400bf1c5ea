//! Swarms: orchestrated compositions of agents under one topology.
//!
//! Every executor validates its invariants with [`reliability_check`] before
//! running, consumes agents as [`SharedAgent`] handles, and records per-run
//! metadata (see [`metadata`]). Peers never share conversation state; data
//! moves between agents only as task payloads.

pub mod concurrent;
pub mod flow;
pub mod graph;
pub mod group_chat;
pub mod hierarchical;
pub mod metadata;
pub mod mixture;
pub mod rearrange;
pub mod round_robin;
pub mod sequential;
pub mod spreadsheet;
pub mod swarm_rearrange;
pub mod task_queue;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::agent::{Agent, AgentError};
use crate::human::HumanInputError;
use crate::utilities::persistence::PersistenceError;
use self::flow::FlowError;
use self::graph::GraphError;

/// An agent shared between stages and parallel workers.
///
/// The mutex serializes runs of the same agent; distinct agents in a
/// parallel stage never contend.
pub type SharedAgent = Arc<Mutex<Agent>>;

/// Wrap one agent for use in a swarm.
pub fn share_agent(agent: Agent) -> SharedAgent {
    Arc::new(Mutex::new(agent))
}

/// Wrap a roster of agents.
pub fn share_agents(agents: Vec<Agent>) -> Vec<SharedAgent> {
    agents.into_iter().map(share_agent).collect()
}

/// Errors surfaced by swarm executors.
#[derive(Debug, Error)]
pub enum SwarmError {
    /// A pre-run invariant does not hold.
    #[error("reliability check failed: {0}")]
    Reliability(String),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    HumanInput(#[from] HumanInputError),

    /// A timed agent slot expired; peers keep running.
    #[error("agent {agent:?} timed out after {secs}s")]
    Timeout { agent: String, secs: u64 },

    /// The director's payload could not be understood.
    #[error("director error: {0}")]
    Director(String),

    /// A named participant has no registered agent.
    #[error("unknown agent: {0:?}")]
    UnknownAgent(String),

    /// A sequential stage failed, leaving later stages without input.
    #[error("agent {agent:?} failed mid-flow: {reason}")]
    StageFailed { agent: String, reason: String },

    /// A batch entry point received no tasks.
    #[error("no tasks provided")]
    EmptyTasks,
}

/// An orchestrated composition of agents with one `run` entry point.
///
/// Implementations are stateless across `run` calls apart from their emitted
/// metadata log.
#[async_trait]
pub trait Swarm: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Execute the swarm against one task.
    async fn run(&self, task: &str) -> Result<String, SwarmError>;
}

/// Validate the invariants shared by every swarm: non-empty identity, at
/// least one agent, a positive loop budget.
pub fn reliability_check(
    name: &str,
    description: &str,
    agent_count: usize,
    max_loops: u32,
) -> Result<(), SwarmError> {
    if name.trim().is_empty() {
        return Err(SwarmError::Reliability("swarm name must not be empty".to_string()));
    }
    if description.trim().is_empty() {
        return Err(SwarmError::Reliability(
            "swarm description must not be empty".to_string(),
        ));
    }
    if agent_count == 0 {
        return Err(SwarmError::Reliability(
            "swarm requires at least one agent".to_string(),
        ));
    }
    if max_loops == 0 {
        return Err(SwarmError::Reliability("max_loops must be at least 1".to_string()));
    }
    Ok(())
}

/// Run one agent with a deadline. On expiry the worker is abandoned and a
/// timeout error is returned for that slot; peers continue unaffected.
pub async fn run_agent_with_timeout(
    agent: &SharedAgent,
    task: &str,
    timeout_secs: u64,
) -> Result<String, SwarmError> {
    let deadline = Duration::from_secs(timeout_secs);
    let name = agent.lock().await.name().to_string();

    match tokio::time::timeout(deadline, async {
        agent.lock().await.run_to_string(task).await
    })
    .await
    {
        Ok(result) => Ok(result?),
        Err(_) => {
            log::warn!("agent {:?} timed out after {}s", name, timeout_secs);
            Err(SwarmError::Timeout {
                agent: name,
                secs: timeout_secs,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLLM;
    use crate::llm::LLM;

    #[test]
    fn test_reliability_check_accepts_valid_swarm() {
        assert!(reliability_check("s", "does things", 2, 1).is_ok());
    }

    #[test]
    fn test_reliability_check_rejects_each_violation() {
        assert!(reliability_check("", "d", 1, 1).is_err());
        assert!(reliability_check("n", " ", 1, 1).is_err());
        assert!(reliability_check("n", "d", 0, 1).is_err());
        assert!(reliability_check("n", "d", 1, 0).is_err());
    }

    #[tokio::test]
    async fn test_timeout_returns_timeout_error() {
        let llm: Arc<dyn LLM> = Arc::new(MockLLM::scripted(vec!["slow".to_string()]));
        let agent = Agent::builder(llm)
            .name("Sleeper")
            .loop_interval_secs(5)
            .max_loops(2)
            .retry_interval_secs(0)
            .build()
            .unwrap();
        let shared = share_agent(agent);

        // Two loops with a 5s interval cannot finish inside 1s.
        let result = run_agent_with_timeout(&shared, "task", 1).await;
        assert!(matches!(result, Err(SwarmError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_timeout_passes_through_fast_agents() {
        let llm: Arc<dyn LLM> = Arc::new(MockLLM::scripted(vec!["quick".to_string()]));
        let agent = Agent::builder(llm)
            .name("Quick")
            .retry_interval_secs(0)
            .build()
            .unwrap();
        let shared = share_agent(agent);

        let result = run_agent_with_timeout(&shared, "task", 5).await.unwrap();
        assert_eq!(result, "quick");
    }
}
