//! GraphWorkflow: a DAG of agent and callable nodes.
//!
//! Nodes execute in topological order; nodes whose dependencies are all
//! satisfied form a layer and run in parallel. Cycles are rejected at
//! construction and again on every edge add.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;

use super::{share_agent, SharedAgent, Swarm, SwarmError};
use crate::agent::Agent;

/// Errors from graph construction and validation.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate node id: {0:?}")]
    DuplicateNode(String),
    #[error("unknown node id: {0:?}")]
    UnknownNode(String),
    #[error("edge {src:?} -> {dst:?} would close a cycle")]
    CycleDetected { src: String, dst: String },
    #[error("entry points must be a non-empty subset of declared nodes")]
    InvalidEntryPoints,
    #[error("end points must be a non-empty subset of declared nodes")]
    InvalidEndPoints,
}

/// Callable backing a `task` node.
pub type TaskFn = Arc<dyn Fn(&str) -> Result<String, SwarmError> + Send + Sync>;

/// What a node executes.
#[derive(Clone)]
pub enum NodeKind {
    /// Runs `Agent::run(task)`.
    Agent(SharedAgent),
    /// Invokes an arbitrary callable.
    Task(TaskFn),
}

/// DAG executor over agent and callable nodes.
pub struct GraphWorkflow {
    name: String,
    description: String,
    nodes: HashMap<String, NodeKind>,
    /// Insertion order, for deterministic layering among peers.
    node_order: Vec<String>,
    edges: Vec<(String, String)>,
    entry_points: Vec<String>,
    end_points: Vec<String>,
}

impl GraphWorkflow {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            nodes: HashMap::new(),
            node_order: Vec::new(),
            edges: Vec::new(),
            entry_points: Vec::new(),
            end_points: Vec::new(),
        }
    }

    /// Add an agent node; the node id is the agent's name.
    pub fn add_agent_node(&mut self, agent: Agent) -> Result<(), GraphError> {
        let id = agent.name().to_string();
        self.add_node(id, NodeKind::Agent(share_agent(agent)))
    }

    /// Add an already-shared agent under an explicit node id.
    pub fn add_shared_agent_node(
        &mut self,
        id: impl Into<String>,
        agent: SharedAgent,
    ) -> Result<(), GraphError> {
        self.add_node(id.into(), NodeKind::Agent(agent))
    }

    /// Add a callable node under an explicit id.
    pub fn add_task_node(
        &mut self,
        id: impl Into<String>,
        callable: TaskFn,
    ) -> Result<(), GraphError> {
        self.add_node(id.into(), NodeKind::Task(callable))
    }

    fn add_node(&mut self, id: String, kind: NodeKind) -> Result<(), GraphError> {
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        self.node_order.push(id.clone());
        self.nodes.insert(id, kind);
        Ok(())
    }

    /// Add a directed edge, rejecting unknown endpoints and cycles.
    pub fn add_edge(
        &mut self,
        src: impl Into<String>,
        dst: impl Into<String>,
    ) -> Result<(), GraphError> {
        let src = src.into();
        let dst = dst.into();
        if !self.nodes.contains_key(&src) {
            return Err(GraphError::UnknownNode(src));
        }
        if !self.nodes.contains_key(&dst) {
            return Err(GraphError::UnknownNode(dst));
        }

        self.edges.push((src.clone(), dst.clone()));
        if self.topological_layers().is_none() {
            self.edges.pop();
            return Err(GraphError::CycleDetected { src, dst });
        }
        Ok(())
    }

    /// Declare the entry nodes; must be a non-empty subset of declared ids.
    pub fn set_entry_points(&mut self, ids: Vec<String>) -> Result<(), GraphError> {
        if ids.is_empty() || !ids.iter().all(|id| self.nodes.contains_key(id)) {
            return Err(GraphError::InvalidEntryPoints);
        }
        self.entry_points = ids;
        Ok(())
    }

    /// Declare the end nodes; must be a non-empty subset of declared ids.
    pub fn set_end_points(&mut self, ids: Vec<String>) -> Result<(), GraphError> {
        if ids.is_empty() || !ids.iter().all(|id| self.nodes.contains_key(id)) {
            return Err(GraphError::InvalidEndPoints);
        }
        self.end_points = ids;
        Ok(())
    }

    pub fn node_ids(&self) -> &[String] {
        &self.node_order
    }

    /// Kahn layering in insertion order. `None` when the edge set has a
    /// cycle.
    fn topological_layers(&self) -> Option<Vec<Vec<String>>> {
        let mut in_degree: HashMap<&str, usize> =
            self.node_order.iter().map(|id| (id.as_str(), 0)).collect();
        let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
        for (src, dst) in &self.edges {
            *in_degree.get_mut(dst.as_str())? += 1;
            successors.entry(src.as_str()).or_default().push(dst.as_str());
        }

        let mut ready: VecDeque<&str> = self
            .node_order
            .iter()
            .map(|id| id.as_str())
            .filter(|id| in_degree[id] == 0)
            .collect();

        let mut layers: Vec<Vec<String>> = Vec::new();
        let mut visited = 0usize;

        while !ready.is_empty() {
            let layer: Vec<&str> = ready.drain(..).collect();
            visited += layer.len();
            let mut next: Vec<&str> = Vec::new();
            for id in &layer {
                for succ in successors.get(id).into_iter().flatten() {
                    let degree = in_degree.get_mut(succ)?;
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(succ);
                    }
                }
            }
            // Keep peers in insertion order for determinism.
            let mut ordered: Vec<String> = self
                .node_order
                .iter()
                .filter(|id| layer.contains(&id.as_str()))
                .cloned()
                .collect();
            layers.push(std::mem::take(&mut ordered));
            ready.extend(next);
        }

        if visited == self.node_order.len() {
            Some(layers)
        } else {
            None
        }
    }

    /// Execute every node in topological order, parallel within a layer.
    /// Returns the map of node id to output.
    pub async fn run(&self, task: &str) -> Result<HashMap<String, String>, SwarmError> {
        if self.entry_points.is_empty() {
            return Err(GraphError::InvalidEntryPoints.into());
        }
        if self.end_points.is_empty() {
            return Err(GraphError::InvalidEndPoints.into());
        }

        let layers = self
            .topological_layers()
            .ok_or(SwarmError::Graph(GraphError::CycleDetected {
                src: "?".to_string(),
                dst: "?".to_string(),
            }))?;

        let mut results: HashMap<String, String> = HashMap::new();
        for layer in layers {
            let outputs = join_all(layer.iter().map(|id| {
                let kind = self.nodes.get(id).cloned();
                async move {
                    match kind {
                        Some(NodeKind::Agent(agent)) => {
                            agent.lock().await.run_to_string(task).await.map_err(SwarmError::from)
                        }
                        Some(NodeKind::Task(callable)) => callable(task),
                        None => Err(SwarmError::UnknownAgent(id.clone())),
                    }
                }
            }))
            .await;

            for (id, output) in layer.into_iter().zip(outputs) {
                results.insert(id, output?);
            }
        }
        Ok(results)
    }
}

#[async_trait]
impl Swarm for GraphWorkflow {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    /// Run the DAG and join the end-point outputs.
    async fn run(&self, task: &str) -> Result<String, SwarmError> {
        let results = GraphWorkflow::run(self, task).await?;
        Ok(self
            .end_points
            .iter()
            .filter_map(|id| results.get(id).map(|out| format!("{}: {}", id, out)))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
