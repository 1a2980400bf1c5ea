//! SequentialWorkflow: agents chained in declaration order.
//!
//! Implemented as an [`AgentRearrange`] over the derived flow
//! `A -> B -> C -> ...`; each stage's output becomes the next stage's task.

use async_trait::async_trait;
use futures::future::join_all;

use super::rearrange::AgentRearrange;
use super::{share_agent, SharedAgent, Swarm, SwarmError};
use crate::agent::Agent;
use crate::swarm::flow::Flow;
use crate::utilities::output::OutputType;

/// Builder for [`SequentialWorkflow`].
#[derive(Default)]
pub struct SequentialWorkflowBuilder {
    name: String,
    description: String,
    agents: Vec<SharedAgent>,
    max_loops: u32,
    verbose: bool,
    output_type: Option<OutputType>,
}

impl SequentialWorkflowBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn add_agent(mut self, agent: Agent) -> Self {
        self.agents.push(share_agent(agent));
        self
    }

    pub fn agents(self, agents: Vec<Agent>) -> Self {
        agents.into_iter().fold(self, |b, a| b.add_agent(a))
    }

    pub fn shared_agents(mut self, agents: Vec<SharedAgent>) -> Self {
        self.agents.extend(agents);
        self
    }

    pub fn max_loops(mut self, max_loops: u32) -> Self {
        self.max_loops = max_loops;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn output_type(mut self, output_type: OutputType) -> Self {
        self.output_type = Some(output_type);
        self
    }

    pub async fn build(self) -> Result<SequentialWorkflow, SwarmError> {
        let mut names = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            names.push(agent.lock().await.name().to_string());
        }
        let flow = Flow::sequential(&names)?;

        let mut builder = AgentRearrange::builder()
            .name(if self.name.is_empty() {
                "SequentialWorkflow".to_string()
            } else {
                self.name
            })
            .description(if self.description.is_empty() {
                "Agents executed one after another in declaration order".to_string()
            } else {
                self.description
            });
        for agent in self.agents {
            builder = builder.add_shared_agent(agent);
        }
        let rearrange = builder
            .flow_value(flow)
            .max_loops(self.max_loops.max(1))
            .verbose(self.verbose)
            .output_type(self.output_type.unwrap_or(OutputType::Final))
            .build()
            .await?;

        Ok(SequentialWorkflow { rearrange })
    }
}

/// Agents executed strictly in order; output(i) is the task of agent(i+1).
pub struct SequentialWorkflow {
    rearrange: AgentRearrange,
}

impl SequentialWorkflow {
    pub fn builder() -> SequentialWorkflowBuilder {
        SequentialWorkflowBuilder::default()
    }

    /// Run the chain on one task.
    pub async fn run(&self, task: &str) -> Result<String, SwarmError> {
        self.rearrange.run(task).await
    }

    /// Run a list of tasks one after another.
    pub async fn run_batched(&self, tasks: Vec<String>) -> Result<Vec<String>, SwarmError> {
        if tasks.is_empty() {
            return Err(SwarmError::EmptyTasks);
        }
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push(self.run(&task).await?);
        }
        Ok(results)
    }

    /// Run tasks in parallel; each task still walks the agents in order.
    pub async fn run_concurrent(&self, tasks: Vec<String>) -> Result<Vec<String>, SwarmError> {
        if tasks.is_empty() {
            return Err(SwarmError::EmptyTasks);
        }
        let results = join_all(tasks.iter().map(|task| self.run(task))).await;
        results.into_iter().collect()
    }

    /// The derived flow, e.g. `A -> B -> C`.
    pub fn flow(&self) -> String {
        self.rearrange.flow().to_string()
    }
}

#[async_trait]
impl Swarm for SequentialWorkflow {
    fn name(&self) -> &str {
        Swarm::name(&self.rearrange)
    }

    fn description(&self) -> &str {
        Swarm::description(&self.rearrange)
    }

    async fn run(&self, task: &str) -> Result<String, SwarmError> {
        SequentialWorkflow::run(self, task).await
    }
}
