//! Per-run metadata records persisted by swarm executors.

use chrono::{DateTime, Local};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SharedAgent;

/// One agent's contribution to a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutputSchema {
    pub run_id: Uuid,
    pub agent_name: String,
    pub task: String,
    /// The agent's output, or its error rendered as `"Error: ..."`.
    pub output: String,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub duration_sec: i64,
}

/// Full record of one swarm run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataSchema {
    pub run_id: Uuid,
    pub swarm_name: String,
    pub swarm_type: String,
    pub description: String,
    pub task: String,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub agent_outputs: Vec<AgentOutputSchema>,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
}

impl MetadataSchema {
    /// Start a record now; finish it with [`MetadataSchema::complete`].
    pub fn begin(
        swarm_name: impl Into<String>,
        swarm_type: impl Into<String>,
        description: impl Into<String>,
        task: impl Into<String>,
    ) -> Self {
        let now = Local::now();
        Self {
            run_id: Uuid::new_v4(),
            swarm_name: swarm_name.into(),
            swarm_type: swarm_type.into(),
            description: description.into(),
            task: task.into(),
            start_time: now,
            end_time: now,
            agent_outputs: Vec::new(),
            tasks_completed: 0,
            tasks_failed: 0,
        }
    }

    /// Record one agent output, updating the aggregate counts.
    pub fn record(&mut self, output: AgentOutputSchema, succeeded: bool) {
        if succeeded {
            self.tasks_completed += 1;
        } else {
            self.tasks_failed += 1;
        }
        self.agent_outputs.push(output);
    }

    /// Stamp the end time.
    pub fn complete(&mut self) {
        self.end_time = Local::now();
    }
}

/// Concurrent map from task to its latest run record.
#[derive(Debug, Default, Clone, Serialize)]
pub struct MetadataMap(pub DashMap<String, MetadataSchema>);

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: impl Into<String>, metadata: MetadataSchema) {
        self.0.insert(task.into(), metadata);
    }

    pub fn get(&self, task: &str) -> Option<MetadataSchema> {
        self.0.get(task).map(|entry| entry.clone())
    }
}

/// Run one agent and capture its timed output record.
///
/// Failures do not propagate: the error text lands in the `output` slot and
/// the returned flag is `false`, so fan-out callers keep their peers running.
pub async fn timed_agent_run(agent: &SharedAgent, task: &str) -> (AgentOutputSchema, bool) {
    let start = Local::now();
    let mut guard = agent.lock().await;
    let agent_name = guard.name().to_string();
    let result = guard.run_to_string(task).await;
    drop(guard);
    let end = Local::now();

    let (output, succeeded) = match result {
        Ok(output) => (output, true),
        Err(e) => {
            log::error!("agent {:?} failed on task {:?}: {}", agent_name, task, e);
            (format!("Error: {}", e), false)
        }
    };

    (
        AgentOutputSchema {
            run_id: Uuid::new_v4(),
            agent_name,
            task: task.to_string(),
            output,
            start_time: start,
            end_time: end,
            duration_sec: end.signed_duration_since(start).num_seconds(),
        },
        succeeded,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::llm::mock::MockLLM;
    use crate::llm::LLM;
    use crate::swarm::share_agent;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_timed_run_records_success() {
        let llm: Arc<dyn LLM> = Arc::new(MockLLM::scripted(vec!["done".to_string()]));
        let agent = share_agent(
            Agent::builder(llm)
                .name("Timer")
                .retry_interval_secs(0)
                .build()
                .unwrap(),
        );

        let (record, ok) = timed_agent_run(&agent, "t").await;
        assert!(ok);
        assert_eq!(record.agent_name, "Timer");
        assert_eq!(record.output, "done");
        assert!(record.duration_sec >= 0);
    }

    #[tokio::test]
    async fn test_timed_run_captures_failure_in_slot() {
        let llm: Arc<dyn LLM> = Arc::new(MockLLM::failing("no provider"));
        let agent = share_agent(
            Agent::builder(llm)
                .name("Broken")
                .retry_attempts(1)
                .retry_interval_secs(0)
                .build()
                .unwrap(),
        );

        let (record, ok) = timed_agent_run(&agent, "t").await;
        assert!(!ok);
        assert!(record.output.starts_with("Error:"));
    }

    #[test]
    fn test_metadata_counts_aggregate() {
        let mut meta = MetadataSchema::begin("s", "ConcurrentWorkflow", "d", "t");
        let record = AgentOutputSchema {
            run_id: Uuid::new_v4(),
            agent_name: "a".to_string(),
            task: "t".to_string(),
            output: "o".to_string(),
            start_time: Local::now(),
            end_time: Local::now(),
            duration_sec: 0,
        };
        meta.record(record.clone(), true);
        meta.record(record, false);
        meta.complete();

        assert_eq!(meta.tasks_completed, 1);
        assert_eq!(meta.tasks_failed, 1);
        assert_eq!(meta.agent_outputs.len(), 2);
    }
}
