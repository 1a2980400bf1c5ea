//! SpreadSheetSwarm: parallel fan-out specialized for batch execution with a
//! CSV results log.
//!
//! Agents can carry their own per-agent task (optionally loaded from a CSV
//! roster); `max_loops x agents` work units run in loop-sized parallel
//! waves. Every unit appends one row to the results CSV under the
//! swarm-scoped write lock; a JSON metadata file accompanies the log.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use uuid::Uuid;

use super::metadata::{timed_agent_run, MetadataMap, MetadataSchema};
use super::{reliability_check, share_agent, SharedAgent, Swarm, SwarmError};
use crate::agent::Agent;
use crate::context::RunContext;
use crate::llm::LLM;
use crate::utilities::persistence::{self, csv_row, parse_csv_line};

/// CSV header of the results log.
const RESULTS_HEADER: &str = "RunId,AgentName,Task,Result,Timestamp";

/// One roster entry: an agent plus its optional configured task.
struct RosterEntry {
    agent: SharedAgent,
    task: Option<String>,
}

/// Builder for [`SpreadSheetSwarm`].
pub struct SpreadSheetSwarmBuilder {
    name: String,
    description: String,
    entries: Vec<RosterEntry>,
    max_loops: u32,
    save_file_path: Option<PathBuf>,
    context: RunContext,
}

impl Default for SpreadSheetSwarmBuilder {
    fn default() -> Self {
        Self {
            name: "SpreadSheetSwarm".to_string(),
            description: "Batch fan-out with a CSV results log".to_string(),
            entries: Vec::new(),
            max_loops: 1,
            save_file_path: None,
            context: RunContext::default(),
        }
    }
}

impl SpreadSheetSwarmBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn add_agent(mut self, agent: Agent) -> Self {
        self.entries.push(RosterEntry {
            agent: share_agent(agent),
            task: None,
        });
        self
    }

    /// Register an agent with its own configured task.
    pub fn add_agent_with_task(mut self, agent: Agent, task: impl Into<String>) -> Self {
        self.entries.push(RosterEntry {
            agent: share_agent(agent),
            task: Some(task.into()),
        });
        self
    }

    pub fn shared_agents(mut self, agents: Vec<SharedAgent>) -> Self {
        for agent in agents {
            self.entries.push(RosterEntry { agent, task: None });
        }
        self
    }

    pub fn agents(mut self, agents: Vec<Agent>) -> Self {
        for agent in agents {
            self = self.add_agent(agent);
        }
        self
    }

    pub fn max_loops(mut self, max_loops: u32) -> Self {
        self.max_loops = max_loops;
        self
    }

    /// Where the results CSV is appended. Defaults to
    /// `<workspace>/spreadsheet_swarm.csv`.
    pub fn save_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_file_path = Some(path.into());
        self
    }

    pub fn run_context(mut self, context: RunContext) -> Self {
        self.context = context;
        self
    }

    /// Load a roster CSV where each row defines an agent:
    /// `agent_name,description,system_prompt,task`. A leading header row is
    /// skipped.
    pub async fn load_roster_csv(
        mut self,
        path: impl AsRef<Path>,
        llm: Arc<dyn LLM>,
    ) -> Result<Self, SwarmError> {
        let bytes = persistence::load_from_file(path).await?;
        let contents = String::from_utf8_lossy(&bytes);

        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fields = parse_csv_line(line);
            if index == 0 && fields.first().map(|f| f.as_str()) == Some("agent_name") {
                continue;
            }
            if fields.len() < 4 {
                return Err(SwarmError::Reliability(format!(
                    "roster row {} has {} fields, expected 4",
                    index + 1,
                    fields.len()
                )));
            }

            let agent = Agent::builder(Arc::clone(&llm))
                .name(fields[0].clone())
                .description(fields[1].clone())
                .system_prompt(fields[2].clone())
                .build()?;
            self = self.add_agent_with_task(agent, fields[3].clone());
        }
        Ok(self)
    }

    pub fn build(self) -> Result<SpreadSheetSwarm, SwarmError> {
        reliability_check(&self.name, &self.description, self.entries.len(), self.max_loops)?;
        let save_file_path = self
            .save_file_path
            .unwrap_or_else(|| self.context.workspace_path("spreadsheet_swarm.csv"));
        Ok(SpreadSheetSwarm {
            name: self.name,
            description: self.description,
            entries: self.entries,
            max_loops: self.max_loops,
            save_file_path,
            context: self.context,
            write_lock: Mutex::new(()),
            metadata_map: MetadataMap::new(),
        })
    }
}

/// Batch executor appending its results to a CSV.
pub struct SpreadSheetSwarm {
    name: String,
    description: String,
    entries: Vec<RosterEntry>,
    max_loops: u32,
    save_file_path: PathBuf,
    context: RunContext,
    /// Serializes CSV appends so rows from parallel units never interleave.
    write_lock: Mutex<()>,
    metadata_map: MetadataMap,
}

impl SpreadSheetSwarm {
    pub fn builder() -> SpreadSheetSwarmBuilder {
        SpreadSheetSwarmBuilder::default()
    }

    pub fn save_file_path(&self) -> &Path {
        &self.save_file_path
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata_map
    }

    /// Run every work unit: `max_loops` waves, one unit per agent per wave.
    /// Each agent runs its configured task, falling back to `default_task`.
    pub async fn run(&self, default_task: &str) -> Result<String, SwarmError> {
        let mut metadata =
            MetadataSchema::begin(&self.name, "SpreadSheetSwarm", &self.description, default_task);

        for _ in 0..self.max_loops {
            let units = self.entries.iter().map(|entry| {
                let task = entry.task.clone().unwrap_or_else(|| default_task.to_string());
                let agent = Arc::clone(&entry.agent);
                async move {
                    let (record, succeeded) = timed_agent_run(&agent, &task).await;
                    (record, succeeded)
                }
            });

            for (record, succeeded) in join_all(units).await {
                self.append_result_row(
                    record.run_id,
                    &record.agent_name,
                    &record.task,
                    &record.output,
                )?;
                metadata.record(record, succeeded);
            }
        }
        metadata.complete();

        let json_path = self.save_file_path.with_extension("json");
        persistence::save_json(&metadata, json_path).await?;

        let rendered = serde_json::to_string_pretty(&metadata)?;
        self.metadata_map.insert(default_task, metadata);
        Ok(rendered)
    }

    fn append_result_row(
        &self,
        run_id: Uuid,
        agent_name: &str,
        task: &str,
        result: &str,
    ) -> Result<(), SwarmError> {
        let timestamp = self.context.now().to_rfc3339();
        let row = csv_row(&[&run_id.to_string(), agent_name, task, result, &timestamp]);

        let _guard = self.write_lock.lock();
        persistence::append_csv_row(&self.save_file_path, RESULTS_HEADER, &row)?;
        Ok(())
    }
}

#[async_trait]
impl Swarm for SpreadSheetSwarm {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, task: &str) -> Result<String, SwarmError> {
        SpreadSheetSwarm::run(self, task).await
    }
}
