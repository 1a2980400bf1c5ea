//! RoundRobinSwarm: the running result cycles through every agent, for a
//! configured number of passes.
//!
//! A rotating index persists across runs, so a second `run` continues the
//! rotation where the first left off.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::metadata::{timed_agent_run, MetadataMap, MetadataSchema};
use super::{reliability_check, share_agent, SharedAgent, Swarm, SwarmError};
use crate::agent::Agent;

/// Hook invoked after each pass with `(loop_index, current_result)`.
pub type LoopCallback = Arc<dyn Fn(u32, &str) + Send + Sync>;

/// Builder for [`RoundRobinSwarm`].
pub struct RoundRobinSwarmBuilder {
    name: String,
    description: String,
    agents: Vec<SharedAgent>,
    max_loops: u32,
    verbose: bool,
    return_json_on: bool,
    callback: Option<LoopCallback>,
}

impl Default for RoundRobinSwarmBuilder {
    fn default() -> Self {
        Self {
            name: "RoundRobinSwarm".to_string(),
            description: "Result rotated through every agent per pass".to_string(),
            agents: Vec::new(),
            max_loops: 1,
            verbose: false,
            return_json_on: false,
            callback: None,
        }
    }
}

impl RoundRobinSwarmBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn agents(self, agents: Vec<Agent>) -> Self {
        agents.into_iter().fold(self, |b, a| b.add_agent(a))
    }

    pub fn add_agent(mut self, agent: Agent) -> Self {
        self.agents.push(share_agent(agent));
        self
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

    /// `true` returns the serialized run metadata instead of the final
    /// result string.
    pub fn return_json_on(mut self, return_json_on: bool) -> Self {
        self.return_json_on = return_json_on;
        self
    }

    pub fn callback(mut self, callback: LoopCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn build(self) -> Result<RoundRobinSwarm, SwarmError> {
        reliability_check(&self.name, &self.description, self.agents.len(), self.max_loops)?;
        Ok(RoundRobinSwarm {
            name: self.name,
            description: self.description,
            agents: self.agents,
            max_loops: self.max_loops,
            verbose: self.verbose,
            return_json_on: self.return_json_on,
            callback: self.callback,
            index: AtomicUsize::new(0),
            metadata_map: MetadataMap::new(),
        })
    }
}

/// Sequential rotation of the running result through the roster.
pub struct RoundRobinSwarm {
    name: String,
    description: String,
    agents: Vec<SharedAgent>,
    max_loops: u32,
    verbose: bool,
    return_json_on: bool,
    callback: Option<LoopCallback>,
    index: AtomicUsize,
    metadata_map: MetadataMap,
}

impl RoundRobinSwarm {
    pub fn builder() -> RoundRobinSwarmBuilder {
        RoundRobinSwarmBuilder::default()
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata_map
    }

    /// Feed `task` through `max_loops` full passes of the rotation.
    pub async fn run(&self, task: &str) -> Result<String, SwarmError> {
        let mut metadata =
            MetadataSchema::begin(&self.name, "RoundRobinSwarm", &self.description, task);
        let mut result = task.to_string();
        let n = self.agents.len();

        for loop_index in 0..self.max_loops {
            if self.verbose {
                log::info!("{}: pass {}/{}", self.name, loop_index + 1, self.max_loops);
            }

            for _ in 0..n {
                let position = self.index.fetch_add(1, Ordering::SeqCst) % n;
                let agent = &self.agents[position];

                let (record, succeeded) = timed_agent_run(agent, &result).await;
                let output = record.output.clone();
                let agent_name = record.agent_name.clone();
                metadata.record(record, succeeded);
                if !succeeded {
                    metadata.complete();
                    self.metadata_map.insert(task, metadata);
                    return Err(SwarmError::StageFailed {
                        agent: agent_name,
                        reason: output,
                    });
                }
                result = output;
            }

            if let Some(callback) = &self.callback {
                callback(loop_index, &result);
            }
        }

        metadata.complete();
        let rendered = if self.return_json_on {
            serde_json::to_string_pretty(&metadata)?
        } else {
            result
        };
        self.metadata_map.insert(task, metadata);
        Ok(rendered)
    }
}

#[async_trait]
impl Swarm for RoundRobinSwarm {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, task: &str) -> Result<String, SwarmError> {
        RoundRobinSwarm::run(self, task).await
    }
}
