//! SwarmRouter: one `run` entry point that selects a topology by type tag,
//! applies cross-cutting policy to the shared agent roster, and keeps an
//! in-memory log of every invocation.

pub mod matcher;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::Agent;
use crate::context::RunContext;
use crate::human::HumanInputProvider;
use crate::memory::long_term::LongTermMemory;
use crate::swarm::concurrent::ConcurrentWorkflow;
use crate::swarm::flow::Flow;
use crate::swarm::graph::GraphWorkflow;
use crate::swarm::group_chat::GroupChat;
use crate::swarm::hierarchical::HierarchicalAgentSwarm;
use crate::swarm::mixture::MixtureOfAgents;
use crate::swarm::rearrange::AgentRearrange;
use crate::swarm::round_robin::RoundRobinSwarm;
use crate::swarm::sequential::SequentialWorkflow;
use crate::swarm::spreadsheet::SpreadSheetSwarm;
use crate::swarm::task_queue::TaskQueueSwarm;
use crate::swarm::{share_agents, SharedAgent, Swarm, SwarmError};
use self::matcher::{Embedder, SwarmMatcher};

/// Marker under which shared rules are appended to agent system prompts.
pub const SWARM_RULES_MARKER: &str = "### Swarm Rules ###";

// ---------------------------------------------------------------------------
// SwarmType
// ---------------------------------------------------------------------------

/// Topology tags the router dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwarmType {
    AgentRearrange,
    MixtureOfAgents,
    SpreadSheetSwarm,
    SequentialWorkflow,
    ConcurrentWorkflow,
    RoundRobin,
    TaskQueueSwarm,
    GraphWorkflow,
    HierarchicalAgentSwarm,
    GroupChat,
    /// Resolve the topology from the task text via the matcher.
    Auto,
}

impl fmt::Display for SwarmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            SwarmType::AgentRearrange => "AgentRearrange",
            SwarmType::MixtureOfAgents => "MixtureOfAgents",
            SwarmType::SpreadSheetSwarm => "SpreadSheetSwarm",
            SwarmType::SequentialWorkflow => "SequentialWorkflow",
            SwarmType::ConcurrentWorkflow => "ConcurrentWorkflow",
            SwarmType::RoundRobin => "RoundRobin",
            SwarmType::TaskQueueSwarm => "TaskQueueSwarm",
            SwarmType::GraphWorkflow => "GraphWorkflow",
            SwarmType::HierarchicalAgentSwarm => "HierarchicalAgentSwarm",
            SwarmType::GroupChat => "GroupChat",
            SwarmType::Auto => "auto",
        };
        write!(f, "{}", tag)
    }
}

impl FromStr for SwarmType {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AgentRearrange" => Ok(SwarmType::AgentRearrange),
            "MixtureOfAgents" => Ok(SwarmType::MixtureOfAgents),
            "SpreadSheetSwarm" => Ok(SwarmType::SpreadSheetSwarm),
            "SequentialWorkflow" => Ok(SwarmType::SequentialWorkflow),
            "ConcurrentWorkflow" => Ok(SwarmType::ConcurrentWorkflow),
            "RoundRobin" => Ok(SwarmType::RoundRobin),
            "TaskQueueSwarm" => Ok(SwarmType::TaskQueueSwarm),
            "GraphWorkflow" => Ok(SwarmType::GraphWorkflow),
            "HierarchicalAgentSwarm" => Ok(SwarmType::HierarchicalAgentSwarm),
            "GroupChat" => Ok(SwarmType::GroupChat),
            "auto" => Ok(SwarmType::Auto),
            other => Err(SwarmError::Reliability(format!(
                "unknown swarm type tag: {:?}",
                other
            ))),
        }
    }
}

impl Serialize for SwarmType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SwarmType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        SwarmType::from_str(&tag).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// SwarmLog
// ---------------------------------------------------------------------------

/// One router invocation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmLog {
    pub id: Uuid,
    pub timestamp: DateTime<Local>,
    pub level: String,
    pub message: String,
    pub swarm_type: SwarmType,
    pub task: Option<String>,
    pub metadata: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`SwarmRouter`].
pub struct SwarmRouterBuilder {
    name: String,
    description: String,
    agents: Vec<Agent>,
    swarm_type: SwarmType,
    max_loops: u32,
    flow: Option<String>,
    rules: Option<String>,
    shared_memory: Option<Arc<dyn LongTermMemory>>,
    auto_generate_prompts: bool,
    embedder: Option<Arc<dyn Embedder>>,
    human_input: Option<Arc<dyn HumanInputProvider>>,
    context: RunContext,
}

impl Default for SwarmRouterBuilder {
    fn default() -> Self {
        Self {
            name: "SwarmRouter".to_string(),
            description: "Topology selector over a shared agent roster".to_string(),
            agents: Vec::new(),
            swarm_type: SwarmType::SequentialWorkflow,
            max_loops: 1,
            flow: None,
            rules: None,
            shared_memory: None,
            auto_generate_prompts: false,
            embedder: None,
            human_input: None,
            context: RunContext::default(),
        }
    }
}

impl SwarmRouterBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn add_agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn agents(mut self, agents: Vec<Agent>) -> Self {
        self.agents.extend(agents);
        self
    }

    pub fn swarm_type(mut self, swarm_type: SwarmType) -> Self {
        self.swarm_type = swarm_type;
        self
    }

    pub fn max_loops(mut self, max_loops: u32) -> Self {
        self.max_loops = max_loops;
        self
    }

    /// Flow for the `AgentRearrange` topology; derived sequentially from the
    /// roster when omitted.
    pub fn flow(mut self, flow: impl Into<String>) -> Self {
        self.flow = Some(flow.into());
        self
    }

    /// Rules appended to every agent's system prompt.
    pub fn rules(mut self, rules: impl Into<String>) -> Self {
        self.rules = Some(rules.into());
        self
    }

    /// Long-term memory assigned to every agent.
    pub fn shared_memory(mut self, memory: Arc<dyn LongTermMemory>) -> Self {
        self.shared_memory = Some(memory);
        self
    }

    pub fn auto_generate_prompts(mut self) -> Self {
        self.auto_generate_prompts = true;
        self
    }

    /// Embedding backend for `auto` type resolution.
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn human_input(mut self, provider: Arc<dyn HumanInputProvider>) -> Self {
        self.human_input = Some(provider);
        self
    }

    pub fn run_context(mut self, context: RunContext) -> Self {
        self.context = context;
        self
    }

    /// Apply the cross-cutting policy to every agent and assemble the
    /// router.
    pub async fn build(self) -> Result<SwarmRouter, SwarmError> {
        if self.name.trim().is_empty() || self.description.trim().is_empty() {
            return Err(SwarmError::Reliability(
                "router name and description must not be empty".to_string(),
            ));
        }
        if self.agents.is_empty() {
            return Err(SwarmError::Reliability(
                "router requires at least one agent".to_string(),
            ));
        }

        let agents = share_agents(self.agents);
        for agent in &agents {
            let mut guard = agent.lock().await;
            if let Some(memory) = &self.shared_memory {
                guard.set_long_term_memory(Arc::clone(memory));
            }
            if let Some(rules) = &self.rules {
                guard.append_rules(rules);
            }
            if self.auto_generate_prompts {
                guard.enable_auto_generate_prompt();
            }
        }

        Ok(SwarmRouter {
            name: self.name,
            description: self.description,
            agents,
            swarm_type: self.swarm_type,
            max_loops: self.max_loops.max(1),
            flow: self.flow,
            matcher: SwarmMatcher::new(self.embedder),
            human_input: self.human_input,
            context: self.context,
            logs: Mutex::new(Vec::new()),
        })
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Topology selector and policy applicator over one agent roster.
pub struct SwarmRouter {
    name: String,
    description: String,
    agents: Vec<SharedAgent>,
    swarm_type: SwarmType,
    max_loops: u32,
    flow: Option<String>,
    matcher: SwarmMatcher,
    human_input: Option<Arc<dyn HumanInputProvider>>,
    context: RunContext,
    logs: Mutex<Vec<SwarmLog>>,
}

impl SwarmRouter {
    pub fn builder() -> SwarmRouterBuilder {
        SwarmRouterBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn swarm_type(&self) -> SwarmType {
        self.swarm_type
    }

    pub fn agents(&self) -> &[SharedAgent] {
        &self.agents
    }

    /// All logs recorded so far.
    pub fn get_logs(&self) -> Vec<SwarmLog> {
        self.logs.lock().clone()
    }

    fn log(
        &self,
        level: &str,
        message: impl Into<String>,
        swarm_type: SwarmType,
        task: Option<&str>,
    ) {
        let entry = SwarmLog {
            id: Uuid::new_v4(),
            timestamp: self.context.now(),
            level: level.to_string(),
            message: message.into(),
            swarm_type,
            task: task.map(|t| t.to_string()),
            metadata: serde_json::json!({ "router": self.name }),
        };
        self.logs.lock().push(entry);
    }

    /// Resolve `auto` against the matcher; other tags pass through.
    async fn resolve_type(&self, task: &str) -> SwarmType {
        match self.swarm_type {
            SwarmType::Auto => {
                let selected = self.matcher.auto_select(task).await;
                log::debug!("router {:?}: auto selected {}", self.name, selected);
                selected
            }
            fixed => fixed,
        }
    }

    /// Select the topology, execute it, and record the outcome.
    pub async fn run(&self, task: &str) -> Result<String, SwarmError> {
        let swarm_type = self.resolve_type(task).await;
        self.log("info", format!("dispatching to {}", swarm_type), swarm_type, Some(task));

        let result = self.run_on(swarm_type, task).await;
        match &result {
            Ok(_) => self.log("info", "run completed", swarm_type, Some(task)),
            Err(e) => self.log("error", format!("run failed: {}", e), swarm_type, Some(task)),
        }
        result
    }

    async fn run_on(&self, swarm_type: SwarmType, task: &str) -> Result<String, SwarmError> {
        let agents = self.agents.clone();
        match swarm_type {
            SwarmType::SequentialWorkflow => {
                let workflow = SequentialWorkflow::builder()
                    .name(format!("{}-sequential", self.name))
                    .description(&*self.description)
                    .shared_agents(agents)
                    .max_loops(self.max_loops)
                    .build()
                    .await?;
                workflow.run(task).await
            }
            SwarmType::ConcurrentWorkflow => {
                let workflow = ConcurrentWorkflow::builder()
                    .name(format!("{}-concurrent", self.name))
                    .description(&*self.description)
                    .shared_agents(agents)
                    .build()?;
                workflow.run(task).await
            }
            SwarmType::AgentRearrange => {
                let mut builder = AgentRearrange::builder()
                    .name(format!("{}-rearrange", self.name))
                    .description(&*self.description)
                    .max_loops(self.max_loops);
                for agent in agents {
                    builder = builder.add_shared_agent(agent);
                }
                builder = match &self.flow {
                    Some(flow) => builder.flow(flow.clone()),
                    None => builder.flow_value(self.derived_flow().await?),
                };
                if let Some(provider) = &self.human_input {
                    builder = builder.human_input(Arc::clone(provider));
                }
                let rearrange = builder.build().await?;
                rearrange.run(task).await
            }
            SwarmType::MixtureOfAgents => {
                if self.agents.len() < 2 {
                    return Err(SwarmError::Reliability(
                        "MixtureOfAgents needs experts plus an aggregator".to_string(),
                    ));
                }
                let mut agents = agents;
                let aggregator = agents.pop().expect("checked above");
                let moa = MixtureOfAgents::builder()
                    .name(format!("{}-mixture", self.name))
                    .description(&*self.description)
                    .shared_experts(agents)
                    .shared_aggregator(aggregator)
                    .build()?;
                moa.run(task).await
            }
            SwarmType::SpreadSheetSwarm => {
                let swarm = SpreadSheetSwarm::builder()
                    .name(format!("{}-spreadsheet", self.name))
                    .description(&*self.description)
                    .shared_agents(agents)
                    .max_loops(self.max_loops)
                    .run_context(self.context.clone())
                    .build()?;
                swarm.run(task).await
            }
            SwarmType::RoundRobin => {
                let swarm = RoundRobinSwarm::builder()
                    .name(format!("{}-round-robin", self.name))
                    .description(&*self.description)
                    .shared_agents(agents)
                    .max_loops(self.max_loops)
                    .build()?;
                swarm.run(task).await
            }
            SwarmType::TaskQueueSwarm => {
                let swarm = TaskQueueSwarm::builder()
                    .name(format!("{}-task-queue", self.name))
                    .description(&*self.description)
                    .shared_agents(agents)
                    .max_loops(self.max_loops)
                    .run_context(self.context.clone())
                    .build()?;
                Swarm::run(&swarm, task).await
            }
            SwarmType::GraphWorkflow => {
                let graph = self.linear_graph(agents).await?;
                Swarm::run(&graph, task).await
            }
            SwarmType::HierarchicalAgentSwarm => {
                if self.agents.len() < 2 {
                    return Err(SwarmError::Reliability(
                        "HierarchicalAgentSwarm needs a director plus workers".to_string(),
                    ));
                }
                let mut agents = agents;
                let director = agents.remove(0);
                let swarm = HierarchicalAgentSwarm::builder()
                    .name(format!("{}-hierarchical", self.name))
                    .description(&*self.description)
                    .shared_director(director)
                    .shared_workers(agents)
                    .build()
                    .await?;
                swarm.run(task).await
            }
            SwarmType::GroupChat => {
                let chat = GroupChat::builder()
                    .name(format!("{}-group-chat", self.name))
                    .description(&*self.description)
                    .shared_agents(agents)
                    .max_loops(self.max_loops)
                    .build()
                    .await?;
                Ok(chat.run(task).await?.transcript())
            }
            SwarmType::Auto => unreachable!("auto resolves before dispatch"),
        }
    }

    /// The roster as a linear `A -> B -> C` flow.
    async fn derived_flow(&self) -> Result<Flow, SwarmError> {
        let mut names = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            names.push(agent.lock().await.name().to_string());
        }
        Ok(Flow::sequential(&names)?)
    }

    /// The roster as a linear DAG, for graph dispatch without an explicit
    /// graph definition.
    async fn linear_graph(&self, agents: Vec<SharedAgent>) -> Result<GraphWorkflow, SwarmError> {
        let mut graph = GraphWorkflow::new(
            format!("{}-graph", self.name),
            self.description.clone(),
        );
        let mut names = Vec::with_capacity(agents.len());
        for agent in &agents {
            names.push(agent.lock().await.name().to_string());
        }
        for (name, agent) in names.iter().zip(agents) {
            graph.add_shared_agent_node(name.clone(), agent)?;
        }
        for pair in names.windows(2) {
            graph.add_edge(pair[0].clone(), pair[1].clone())?;
        }
        graph.set_entry_points(vec![names[0].clone()])?;
        graph.set_end_points(vec![names[names.len() - 1].clone()])?;
        Ok(graph)
    }

    /// Run several tasks one after another.
    pub async fn run_batch(&self, tasks: Vec<String>) -> Result<Vec<String>, SwarmError> {
        if tasks.is_empty() {
            return Err(SwarmError::EmptyTasks);
        }
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            results.push(self.run(&task).await?);
        }
        Ok(results)
    }

    /// Run several tasks concurrently.
    pub async fn run_concurrent(&self, tasks: Vec<String>) -> Result<Vec<String>, SwarmError> {
        if tasks.is_empty() {
            return Err(SwarmError::EmptyTasks);
        }
        let results = futures::future::join_all(tasks.iter().map(|task| self.run(task))).await;
        results.into_iter().collect()
    }
}
