//! HierarchicalAgentSwarm: a director agent dispatching orders to a worker
//! pool.
//!
//! Two modes: pre-populated workers receive `orders` emitted by the
//! director as JSON; dynamic mode first asks the director to specify the
//! workers (`multipleAgents`), instantiates them from a shared worker LLM
//! template, then solicits concrete orders and dispatches. One worker's
//! failure is logged and never halts the remaining dispatches.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::metadata::{timed_agent_run, MetadataMap, MetadataSchema};
use super::{share_agent, SharedAgent, Swarm, SwarmError};
use crate::agent::Agent;
use crate::llm::LLM;
use crate::tools::executor::strip_code_fence;

// ---------------------------------------------------------------------------
// Director payloads
// ---------------------------------------------------------------------------

/// One dispatch order from the director.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerOrder {
    pub agent_name: String,
    pub task: String,
}

/// Orders payload for pre-populated workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorOrders {
    pub orders: Vec<WorkerOrder>,
}

/// One worker specification in dynamic mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
    pub agent_name: String,
    pub system_prompt: String,
    pub description: String,
    pub task: String,
}

/// Worker-creation payload for dynamic mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorSpawn {
    pub multiple_agents: Vec<WorkerSpec>,
}

// ---------------------------------------------------------------------------
// Swarm
// ---------------------------------------------------------------------------

/// Builder for [`HierarchicalAgentSwarm`].
pub struct HierarchicalAgentSwarmBuilder {
    name: String,
    description: String,
    director: Option<SharedAgent>,
    workers: Vec<SharedAgent>,
    worker_llm: Option<Arc<dyn LLM>>,
    verbose: bool,
}

impl Default for HierarchicalAgentSwarmBuilder {
    fn default() -> Self {
        Self {
            name: "HierarchicalAgentSwarm".to_string(),
            description: "A director dispatching orders to workers".to_string(),
            director: None,
            workers: Vec::new(),
            worker_llm: None,
            verbose: false,
        }
    }
}

impl HierarchicalAgentSwarmBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn director(mut self, director: Agent) -> Self {
        self.director = Some(share_agent(director));
        self
    }

    pub fn shared_director(mut self, director: SharedAgent) -> Self {
        self.director = Some(director);
        self
    }

    pub fn add_worker(mut self, worker: Agent) -> Self {
        self.workers.push(share_agent(worker));
        self
    }

    pub fn workers(self, workers: Vec<Agent>) -> Self {
        workers.into_iter().fold(self, |b, w| b.add_worker(w))
    }

    pub fn shared_workers(mut self, workers: Vec<SharedAgent>) -> Self {
        self.workers.extend(workers);
        self
    }

    /// Template LLM for workers created in dynamic mode.
    pub fn worker_llm(mut self, llm: Arc<dyn LLM>) -> Self {
        self.worker_llm = Some(llm);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub async fn build(self) -> Result<HierarchicalAgentSwarm, SwarmError> {
        let director = self
            .director
            .ok_or_else(|| SwarmError::Reliability("director agent is required".to_string()))?;
        if self.name.trim().is_empty() || self.description.trim().is_empty() {
            return Err(SwarmError::Reliability(
                "swarm name and description must not be empty".to_string(),
            ));
        }

        let mut workers = HashMap::new();
        for worker in self.workers {
            let name = worker.lock().await.name().to_string();
            workers.insert(name, worker);
        }

        Ok(HierarchicalAgentSwarm {
            name: self.name,
            description: self.description,
            director,
            workers: Mutex::new(workers),
            worker_llm: self.worker_llm,
            verbose: self.verbose,
            metadata_map: MetadataMap::new(),
        })
    }
}

/// Director plus worker pool.
pub struct HierarchicalAgentSwarm {
    name: String,
    description: String,
    director: SharedAgent,
    workers: Mutex<HashMap<String, SharedAgent>>,
    worker_llm: Option<Arc<dyn LLM>>,
    verbose: bool,
    metadata_map: MetadataMap,
}

impl HierarchicalAgentSwarm {
    pub fn builder() -> HierarchicalAgentSwarmBuilder {
        HierarchicalAgentSwarmBuilder::default()
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata_map
    }

    pub async fn worker_names(&self) -> Vec<String> {
        self.workers.lock().await.keys().cloned().collect()
    }

    /// Pre-populated mode: ask the director for orders and dispatch them.
    pub async fn run(&self, task: &str) -> Result<String, SwarmError> {
        let worker_names = self.worker_names().await.join(", ");
        let prompt = format!(
            "You direct this worker pool: {}.\n\
             Respond with JSON only, of the shape \
             {{\"orders\": [{{\"agentName\": ..., \"task\": ...}}]}}.\n\nTask: {}",
            worker_names, task
        );

        let raw = self.director.lock().await.run_to_string(&prompt).await?;
        let orders = Self::parse_orders(&raw)?;
        if self.verbose {
            log::info!("{}: director issued {} orders", self.name, orders.orders.len());
        }
        self.dispatch(task, orders.orders).await
    }

    /// Dynamic mode: the director specifies the workers first, then issues
    /// orders to the agents it created.
    pub async fn run_dynamic(&self, task: &str) -> Result<String, SwarmError> {
        let worker_llm = self.worker_llm.as_ref().ok_or_else(|| {
            SwarmError::Reliability("dynamic mode requires a worker llm template".to_string())
        })?;

        let spawn_prompt = format!(
            "Design the specialist agents this task needs. Respond with JSON only, of the \
             shape {{\"multipleAgents\": [{{\"agentName\": ..., \"systemPrompt\": ..., \
             \"description\": ..., \"task\": ...}}]}}.\n\nTask: {}",
            task
        );
        let raw = self.director.lock().await.run_to_string(&spawn_prompt).await?;
        let spawn = Self::parse_spawn(&raw)?;

        let mut created = Vec::with_capacity(spawn.multiple_agents.len());
        {
            let mut workers = self.workers.lock().await;
            for spec in &spawn.multiple_agents {
                let agent = Agent::builder(Arc::clone(worker_llm))
                    .name(spec.agent_name.clone())
                    .description(spec.description.clone())
                    .system_prompt(spec.system_prompt.clone())
                    .build()?;
                workers.insert(spec.agent_name.clone(), share_agent(agent));
                created.push(spec.agent_name.clone());
            }
        }
        if self.verbose {
            log::info!("{}: director created workers: {}", self.name, created.join(", "));
        }

        let orders_prompt = format!(
            "The workers {} now exist. Respond with JSON only, of the shape \
             {{\"orders\": [{{\"agentName\": ..., \"task\": ...}}]}}.\n\nTask: {}",
            created.join(", "),
            task
        );
        let raw = self.director.lock().await.run_to_string(&orders_prompt).await?;
        let orders = Self::parse_orders(&raw)?;
        self.dispatch(task, orders.orders).await
    }

    /// Dispatch orders to named workers in parallel; failures and unknown
    /// names land in the metadata without halting peers.
    async fn dispatch(&self, task: &str, orders: Vec<WorkerOrder>) -> Result<String, SwarmError> {
        let mut metadata =
            MetadataSchema::begin(&self.name, "HierarchicalAgentSwarm", &self.description, task);

        let workers = self.workers.lock().await;
        let dispatches = orders.iter().map(|order| {
            let worker = workers.get(&order.agent_name).cloned();
            let order = order.clone();
            async move {
                match worker {
                    Some(worker) => Some(timed_agent_run(&worker, &order.task).await),
                    None => {
                        log::error!("order names unknown worker {:?}", order.agent_name);
                        None
                    }
                }
            }
        });
        let outcomes = join_all(dispatches).await;
        drop(workers);

        let mut responses = Vec::with_capacity(orders.len());
        for outcome in outcomes.into_iter().flatten() {
            let (record, succeeded) = outcome;
            responses.push(format!("{}: {}", record.agent_name, record.output));
            metadata.record(record, succeeded);
        }
        metadata.complete();
        self.metadata_map.insert(task, metadata);

        Ok(responses.join("\n"))
    }

    fn parse_orders(raw: &str) -> Result<DirectorOrders, SwarmError> {
        serde_json::from_str(strip_code_fence(raw))
            .map_err(|e| SwarmError::Director(format!("unparseable orders payload: {}", e)))
    }

    fn parse_spawn(raw: &str) -> Result<DirectorSpawn, SwarmError> {
        serde_json::from_str(strip_code_fence(raw))
            .map_err(|e| SwarmError::Director(format!("unparseable agent-spec payload: {}", e)))
    }
}

#[async_trait]
impl Swarm for HierarchicalAgentSwarm {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, task: &str) -> Result<String, SwarmError> {
        HierarchicalAgentSwarm::run(self, task).await
    }
}
