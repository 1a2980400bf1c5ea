//! ConcurrentWorkflow: the same task fanned out to every agent in parallel.
//!
//! Agents run concurrently with a join barrier at the end; one agent's
//! failure lands in its metadata slot without cancelling its peers. The
//! return shape is either a joined transcript or the serialized metadata,
//! chosen by `return_str_on`.

use std::path::PathBuf;

use async_trait::async_trait;
use futures::future::join_all;

use super::metadata::{timed_agent_run, MetadataMap, MetadataSchema};
use super::{reliability_check, share_agent, SharedAgent, Swarm, SwarmError};
use crate::agent::Agent;
use crate::utilities::persistence;

/// Builder for [`ConcurrentWorkflow`].
pub struct ConcurrentWorkflowBuilder {
    name: String,
    description: String,
    agents: Vec<SharedAgent>,
    autosave: bool,
    metadata_dir: Option<PathBuf>,
    return_str_on: bool,
}

impl Default for ConcurrentWorkflowBuilder {
    fn default() -> Self {
        Self {
            name: "ConcurrentWorkflow".to_string(),
            description: "One task fanned out to all agents in parallel".to_string(),
            agents: Vec::new(),
            autosave: false,
            metadata_dir: None,
            return_str_on: true,
        }
    }
}

impl ConcurrentWorkflowBuilder {
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

    pub fn autosave(mut self, metadata_dir: impl Into<PathBuf>) -> Self {
        self.autosave = true;
        self.metadata_dir = Some(metadata_dir.into());
        self
    }

    /// `true` returns the joined transcript; `false` the serialized
    /// metadata.
    pub fn return_str_on(mut self, return_str_on: bool) -> Self {
        self.return_str_on = return_str_on;
        self
    }

    pub fn build(self) -> Result<ConcurrentWorkflow, SwarmError> {
        reliability_check(&self.name, &self.description, self.agents.len(), 1)?;
        Ok(ConcurrentWorkflow {
            name: self.name,
            description: self.description,
            agents: self.agents,
            autosave: self.autosave,
            metadata_dir: self.metadata_dir,
            return_str_on: self.return_str_on,
            metadata_map: MetadataMap::new(),
        })
    }
}

/// Parallel fan-out of one task to the whole roster.
pub struct ConcurrentWorkflow {
    name: String,
    description: String,
    agents: Vec<SharedAgent>,
    autosave: bool,
    metadata_dir: Option<PathBuf>,
    return_str_on: bool,
    metadata_map: MetadataMap,
}

impl ConcurrentWorkflow {
    pub fn builder() -> ConcurrentWorkflowBuilder {
        ConcurrentWorkflowBuilder::default()
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata_map
    }

    /// Fan `task` out to every agent and join at the barrier.
    pub async fn run(&self, task: &str) -> Result<String, SwarmError> {
        if task.trim().is_empty() {
            return Err(SwarmError::EmptyTasks);
        }

        let mut metadata =
            MetadataSchema::begin(&self.name, "ConcurrentWorkflow", &self.description, task);

        let records =
            join_all(self.agents.iter().map(|agent| timed_agent_run(agent, task))).await;
        for (record, succeeded) in records {
            metadata.record(record, succeeded);
        }
        metadata.complete();

        if self.autosave {
            if let Some(dir) = &self.metadata_dir {
                let path = dir.join(format!("{}.json", metadata.run_id));
                persistence::save_json(&metadata, path).await?;
            }
        }

        let rendered = if self.return_str_on {
            metadata
                .agent_outputs
                .iter()
                .map(|o| format!("{}: {}", o.agent_name, o.output))
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            serde_json::to_string_pretty(&metadata)?
        };

        self.metadata_map.insert(task, metadata);
        Ok(rendered)
    }

    /// Run a batch of tasks; each task fans out to all agents, and the tasks
    /// themselves run concurrently as well.
    pub async fn run_batch(&self, tasks: Vec<String>) -> Result<Vec<String>, SwarmError> {
        if tasks.is_empty() {
            return Err(SwarmError::EmptyTasks);
        }
        let results = join_all(tasks.iter().map(|task| self.run(task))).await;
        results.into_iter().collect()
    }
}

#[async_trait]
impl Swarm for ConcurrentWorkflow {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, task: &str) -> Result<String, SwarmError> {
        ConcurrentWorkflow::run(self, task).await
    }
}
