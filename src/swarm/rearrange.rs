//! AgentRearrange: the general flow executor.
//!
//! A flow string orders agents into stages; single-participant stages chain
//! the running task, multi-participant stages fan out in parallel and join
//! their outputs, and `H` stages hand the task to a human. Sequential
//! workflows are a derived flow over this executor.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use uuid::Uuid;

use super::flow::{Flow, HUMAN_PARTICIPANT};
use super::metadata::{timed_agent_run, MetadataMap, MetadataSchema};
use super::{reliability_check, share_agent, SharedAgent, Swarm, SwarmError};
use crate::agent::Agent;
use crate::human::{HumanInputProvider, TerminalInput};
use crate::utilities::output::OutputType;
use crate::utilities::persistence;

/// Separator used to join the outputs of a parallel stage.
const PARALLEL_JOIN: &str = "; ";

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`AgentRearrange`].
pub struct AgentRearrangeBuilder {
    name: String,
    description: String,
    agents: Vec<SharedAgent>,
    flow: Option<String>,
    parsed_flow: Option<Flow>,
    max_loops: u32,
    verbose: bool,
    output_type: OutputType,
    return_json: bool,
    autosave: bool,
    metadata_dir: Option<PathBuf>,
    human_input: Option<Arc<dyn HumanInputProvider>>,
    team_awareness: bool,
}

impl Default for AgentRearrangeBuilder {
    fn default() -> Self {
        Self {
            name: "AgentRearrange".to_string(),
            description: "Agents executing a rearrangeable flow".to_string(),
            agents: Vec::new(),
            flow: None,
            parsed_flow: None,
            max_loops: 1,
            verbose: false,
            output_type: OutputType::Final,
            return_json: false,
            autosave: false,
            metadata_dir: None,
            human_input: None,
            team_awareness: false,
        }
    }
}

impl AgentRearrangeBuilder {
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

    pub fn add_shared_agent(mut self, agent: SharedAgent) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn agents(self, agents: Vec<Agent>) -> Self {
        agents.into_iter().fold(self, |b, a| b.add_agent(a))
    }

    pub fn flow(mut self, flow: impl Into<String>) -> Self {
        self.flow = Some(flow.into());
        self
    }

    /// Use an already-parsed flow (derived flows bypass the DSL re-parse,
    /// which would reject a degenerate single-stage flow).
    pub fn flow_value(mut self, flow: Flow) -> Self {
        self.parsed_flow = Some(flow);
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
        self.output_type = output_type;
        self
    }

    pub fn return_json(mut self, return_json: bool) -> Self {
        self.return_json = return_json;
        self
    }

    pub fn autosave(mut self, metadata_dir: impl Into<PathBuf>) -> Self {
        self.autosave = true;
        self.metadata_dir = Some(metadata_dir.into());
        self
    }

    pub fn human_input(mut self, provider: Arc<dyn HumanInputProvider>) -> Self {
        self.human_input = Some(provider);
        self
    }

    pub fn team_awareness(mut self, team_awareness: bool) -> Self {
        self.team_awareness = team_awareness;
        self
    }

    /// Validate the flow against the roster and assemble the executor.
    pub async fn build(self) -> Result<AgentRearrange, SwarmError> {
        reliability_check(&self.name, &self.description, self.agents.len(), self.max_loops)?;

        let mut agents: HashMap<String, SharedAgent> = HashMap::new();
        for agent in self.agents {
            let name = agent.lock().await.name().to_string();
            agents.insert(name, agent);
        }

        let flow = match (self.parsed_flow, self.flow) {
            (Some(flow), _) => flow,
            (None, Some(source)) => Flow::parse(&source)?,
            (None, None) => {
                return Err(SwarmError::Reliability("flow must be configured".to_string()))
            }
        };
        let registered: HashSet<String> = agents.keys().cloned().collect();
        flow.validate(&registered)?;

        Ok(AgentRearrange {
            id: Uuid::new_v4(),
            name: self.name,
            description: self.description,
            agents,
            flow,
            max_loops: self.max_loops,
            verbose: self.verbose,
            output_type: self.output_type,
            return_json: self.return_json,
            autosave: self.autosave,
            metadata_dir: self.metadata_dir,
            human_input: self
                .human_input
                .unwrap_or_else(|| Arc::new(TerminalInput) as Arc<dyn HumanInputProvider>),
            team_awareness: self.team_awareness,
            metadata_map: MetadataMap::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Flow-driven executor over a named agent roster.
pub struct AgentRearrange {
    id: Uuid,
    name: String,
    description: String,
    agents: HashMap<String, SharedAgent>,
    flow: Flow,
    max_loops: u32,
    verbose: bool,
    output_type: OutputType,
    return_json: bool,
    autosave: bool,
    metadata_dir: Option<PathBuf>,
    human_input: Arc<dyn HumanInputProvider>,
    team_awareness: bool,
    metadata_map: MetadataMap,
}

impl std::fmt::Debug for AgentRearrange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRearrange")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("agents", &self.agents)
            .field("flow", &self.flow)
            .field("max_loops", &self.max_loops)
            .field("verbose", &self.verbose)
            .field("output_type", &self.output_type)
            .field("return_json", &self.return_json)
            .field("autosave", &self.autosave)
            .field("metadata_dir", &self.metadata_dir)
            .field("human_input", &"<dyn HumanInputProvider>")
            .field("team_awareness", &self.team_awareness)
            .field("metadata_map", &self.metadata_map)
            .finish()
    }
}

impl AgentRearrange {
    pub fn builder() -> AgentRearrangeBuilder {
        AgentRearrangeBuilder::default()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.keys().map(|k| k.as_str()).collect()
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata_map
    }

    /// Execute the flow against one task.
    pub async fn run(&self, task: &str) -> Result<String, SwarmError> {
        self.run_with_tasks(task, None).await
    }

    /// Execute the flow with per-agent task overrides: before the named
    /// agent's stage runs, the override replaces the running task.
    pub async fn run_with_tasks(
        &self,
        task: &str,
        custom_tasks: Option<&HashMap<String, String>>,
    ) -> Result<String, SwarmError> {
        let mut metadata =
            MetadataSchema::begin(&self.name, "AgentRearrange", &self.description, task);
        let mut current_task = task.to_string();
        // (participant, response) in execution order.
        let mut responses: Vec<(String, String)> = Vec::new();

        for loop_index in 0..self.max_loops {
            if self.verbose {
                log::info!(
                    "{}: loop {}/{} over flow {}",
                    self.name,
                    loop_index + 1,
                    self.max_loops,
                    self.flow
                );
            }

            for stage in self.flow.stages() {
                if let Some(customs) = custom_tasks {
                    if let Some(next) = stage.iter().find_map(|p| customs.get(p)) {
                        current_task = next.clone();
                    }
                }

                if stage.len() > 1 {
                    let outputs = self
                        .run_parallel_stage(stage, &current_task, &mut metadata, &mut responses)
                        .await;
                    current_task = outputs.join(PARALLEL_JOIN);
                } else if stage[0] == HUMAN_PARTICIPANT {
                    let prompt = format!(
                        "Current result:\n{}\n\nProvide the task for the next stage",
                        current_task
                    );
                    let input = self.human_input.request_input(&prompt)?;
                    responses.push((HUMAN_PARTICIPANT.to_string(), input.clone()));
                    current_task = input;
                } else {
                    let participant = &stage[0];
                    let agent = self
                        .agents
                        .get(participant)
                        .ok_or_else(|| SwarmError::UnknownAgent(participant.clone()))?;

                    // A failure here breaks the chain: later stages have no
                    // input. The metadata still records the failed slot.
                    let staged_task = self.staged_task(participant, &current_task);
                    let (record, succeeded) = timed_agent_run(agent, &staged_task).await;
                    let output = record.output.clone();
                    metadata.record(record, succeeded);
                    if !succeeded {
                        metadata.complete();
                        self.finish(task, metadata).await?;
                        return Err(SwarmError::StageFailed {
                            agent: participant.clone(),
                            reason: output,
                        });
                    }
                    responses.push((participant.clone(), output.clone()));
                    current_task = output;
                }
            }
        }

        metadata.complete();
        self.finish(task, metadata).await?;

        Ok(self.format_output(&responses, &current_task))
    }

    /// Fan a stage out in parallel and join at the stage barrier. `H` inside
    /// a parallel group is skipped; human input only makes sense as its own
    /// stage.
    async fn run_parallel_stage(
        &self,
        stage: &[String],
        current_task: &str,
        metadata: &mut MetadataSchema,
        responses: &mut Vec<(String, String)>,
    ) -> Vec<String> {
        let participants: Vec<&String> = stage
            .iter()
            .filter(|p| p.as_str() != HUMAN_PARTICIPANT)
            .collect();

        let futures = participants.iter().map(|participant| {
            let agent = self.agents.get(participant.as_str()).cloned();
            let task = self.staged_task(participant.as_str(), current_task);
            async move {
                match agent {
                    Some(agent) => Some(timed_agent_run(&agent, &task).await),
                    None => None,
                }
            }
        });

        let mut outputs = Vec::with_capacity(participants.len());
        for (participant, result) in participants.iter().zip(join_all(futures).await) {
            if let Some((record, succeeded)) = result {
                let output = record.output.clone();
                metadata.record(record, succeeded);
                responses.push(((*participant).clone(), output.clone()));
                outputs.push(output);
            }
        }
        outputs
    }

    /// Prepend the roster context when team awareness is on.
    fn staged_task(&self, participant: &str, task: &str) -> String {
        if !self.team_awareness {
            return task.to_string();
        }
        let mut roster: Vec<&str> = self
            .agents
            .keys()
            .map(|k| k.as_str())
            .filter(|name| *name != participant)
            .collect();
        roster.sort_unstable();
        format!(
            "You are {} in a team with: {}. The team flow is: {}.\n\n{}",
            participant,
            roster.join(", "),
            self.flow,
            task
        )
    }

    async fn finish(&self, task: &str, metadata: MetadataSchema) -> Result<(), SwarmError> {
        if self.autosave {
            if let Some(dir) = &self.metadata_dir {
                let path = dir.join(format!("{}.json", metadata.run_id));
                persistence::save_json(&metadata, path).await?;
            }
        }
        self.metadata_map.insert(task, metadata);
        Ok(())
    }

    /// Reshape collected responses per the configured output type.
    fn format_output(&self, responses: &[(String, String)], final_task: &str) -> String {
        match self.output_type {
            OutputType::All | OutputType::Markdown | OutputType::Plain => responses
                .iter()
                .map(|(name, response)| format!("{}: {}", name, response))
                .collect::<Vec<_>>()
                .join("\n"),
            OutputType::List => {
                let items: Vec<&str> = responses.iter().map(|(_, r)| r.as_str()).collect();
                if self.return_json {
                    serde_json::to_string(&items).unwrap_or_else(|_| "[]".to_string())
                } else {
                    items.join("\n")
                }
            }
            OutputType::Dict | OutputType::Json | OutputType::Yaml | OutputType::Toml => {
                let mut map: HashMap<&str, &str> = HashMap::new();
                for (name, response) in responses {
                    map.insert(name.as_str(), response.as_str());
                }
                if self.return_json || self.output_type != OutputType::Dict {
                    serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string())
                } else {
                    let mut lines: Vec<String> = map
                        .iter()
                        .map(|(name, response)| format!("{}: {}", name, response))
                        .collect();
                    lines.sort_unstable();
                    lines.join("\n")
                }
            }
            OutputType::Final | OutputType::Text => final_task.to_string(),
        }
    }

    /// Partition `tasks` into `batch_size` groups and run each group in
    /// parallel, preserving input order in the results.
    pub async fn batch_run(
        &self,
        tasks: Vec<String>,
        batch_size: usize,
    ) -> Result<Vec<String>, SwarmError> {
        if tasks.is_empty() {
            return Err(SwarmError::EmptyTasks);
        }
        let batch_size = batch_size.max(1);

        let mut results = Vec::with_capacity(tasks.len());
        for chunk in tasks.chunks(batch_size) {
            let chunk_results =
                join_all(chunk.iter().map(|task| self.run(task))).await;
            for result in chunk_results {
                results.push(result?);
            }
        }
        Ok(results)
    }

    /// Run all tasks concurrently, bounded by `max_concurrent`.
    pub async fn concurrent_run(
        &self,
        tasks: Vec<String>,
        max_concurrent: Option<usize>,
    ) -> Result<Vec<String>, SwarmError> {
        if tasks.is_empty() {
            return Err(SwarmError::EmptyTasks);
        }
        let limit = max_concurrent.unwrap_or(8).max(1);

        stream::iter(tasks.into_iter().map(|task| async move { self.run(&task).await }))
            .buffered(limit)
            .try_collect()
            .await
    }
}

#[async_trait]
impl Swarm for AgentRearrange {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, task: &str) -> Result<String, SwarmError> {
        AgentRearrange::run(self, task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::human::CallbackInput;
    use crate::llm::mock::{last_turn_content, MockLLM};
    use crate::llm::LLM;
    use crate::memory::conversation::Role;

    fn echo_agent(name: &str) -> Agent {
        let tag = name.to_string();
        let llm: Arc<dyn LLM> = Arc::new(MockLLM::with_transform(move |messages| {
            format!("{} saw: {}", tag, last_turn_content(messages))
        }));
        Agent::builder(llm)
            .name(name)
            .retry_interval_secs(0)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_sequential_passthrough() {
        let rearrange = AgentRearrange::builder()
            .name("chain")
            .description("two echo agents in sequence")
            .agents(vec![echo_agent("A"), echo_agent("B")])
            .flow("A -> B")
            .build()
            .await
            .unwrap();

        let result = rearrange.run("hello").await.unwrap();
        assert_eq!(result, "B saw: A saw: hello");

        // B's user turn carries A's output verbatim.
        let b = rearrange.agents.get("B").unwrap().lock().await;
        assert!(b
            .short_memory()
            .turns()
            .iter()
            .any(|t| matches!(&t.role, Role::User(_)) && t.content == "A saw: hello"));
    }

    #[tokio::test]
    async fn test_parallel_stage_joins_outputs() {
        let rearrange = AgentRearrange::builder()
            .name("fanout")
            .description("parallel stage into a collector")
            .agents(vec![echo_agent("A"), echo_agent("B"), echo_agent("C")])
            .flow("A -> B, C")
            .output_type(OutputType::Final)
            .build()
            .await
            .unwrap();

        let result = rearrange.run("x").await.unwrap();
        // Stage order is preserved when joining parallel outputs.
        assert_eq!(result, "B saw: A saw: x; C saw: A saw: x");
    }

    #[tokio::test]
    async fn test_human_stage_overrides_task() {
        let provider = Arc::new(CallbackInput::new(|_| "override".to_string()));
        let rearrange = AgentRearrange::builder()
            .name("hitl")
            .description("parallel stage, human gate, final agent")
            .agents(vec![echo_agent("A"), echo_agent("B"), echo_agent("C")])
            .flow("A, B -> H -> C")
            .output_type(OutputType::Final)
            .human_input(provider)
            .build()
            .await
            .unwrap();

        let result = rearrange.run("q").await.unwrap();
        assert_eq!(result, "C saw: override");

        let c = rearrange.agents.get("C").unwrap().lock().await;
        assert!(c
            .short_memory()
            .turns()
            .iter()
            .any(|t| matches!(&t.role, Role::User(_)) && t.content == "override"));
        drop(c);

        // A and B both ran and were recorded, but nothing they produced
        // passed the human gate.
        let meta = rearrange.metadata().get("q").unwrap();
        assert_eq!(meta.tasks_completed, 3);
        assert!(!result.contains("A saw"));
    }

    #[tokio::test]
    async fn test_unknown_flow_participant_rejected() {
        let err = AgentRearrange::builder()
            .name("bad")
            .description("flow names a ghost")
            .agents(vec![echo_agent("A")])
            .flow("A -> Ghost")
            .build()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SwarmError::Flow(super::super::flow::FlowError::UnknownParticipant(_))
        ));
    }

    #[tokio::test]
    async fn test_custom_tasks_splice_before_named_agent() {
        let rearrange = AgentRearrange::builder()
            .name("splice")
            .description("custom task override")
            .agents(vec![echo_agent("A"), echo_agent("B")])
            .flow("A -> B")
            .output_type(OutputType::Final)
            .build()
            .await
            .unwrap();

        let mut customs = HashMap::new();
        customs.insert("B".to_string(), "fresh task".to_string());
        let result = rearrange.run_with_tasks("orig", Some(&customs)).await.unwrap();
        assert_eq!(result, "B saw: fresh task");
    }

    #[tokio::test]
    async fn test_all_output_lists_every_response() {
        let rearrange = AgentRearrange::builder()
            .name("transcript")
            .description("all responses")
            .agents(vec![echo_agent("A"), echo_agent("B")])
            .flow("A -> B")
            .output_type(OutputType::All)
            .build()
            .await
            .unwrap();

        let result = rearrange.run("t").await.unwrap();
        assert!(result.contains("A: A saw: t"));
        assert!(result.contains("B: B saw: A saw: t"));
    }

    #[tokio::test]
    async fn test_batch_run_preserves_order() {
        let rearrange = AgentRearrange::builder()
            .name("batch")
            .description("batched runs")
            .agents(vec![echo_agent("A")])
            .flow("A ->")
            .build()
            .await;
        // Trailing separator leaves an empty stage.
        assert!(rearrange.is_err());

        let rearrange = AgentRearrange::builder()
            .name("batch")
            .description("batched runs")
            .agents(vec![echo_agent("A"), echo_agent("B")])
            .flow("A -> B")
            .output_type(OutputType::Final)
            .build()
            .await
            .unwrap();

        let results = rearrange
            .batch_run(vec!["1".to_string(), "2".to_string(), "3".to_string()], 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0], "B saw: A saw: 1");
        assert_eq!(results[2], "B saw: A saw: 3");
    }
}
