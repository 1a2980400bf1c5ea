//! TaskQueueSwarm: agents as long-lived workers draining a shared FIFO
//! queue.
//!
//! Each worker loops: pop a task (atomically), run it, record the output.
//! The run finishes when the queue is drained and every worker has gone
//! idle. Metadata is autosaved under the workspace directory.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Mutex;

use super::metadata::{timed_agent_run, MetadataSchema};
use super::{reliability_check, share_agent, SharedAgent, Swarm, SwarmError};
use crate::agent::Agent;
use crate::context::RunContext;
use crate::utilities::persistence;

/// Builder for [`TaskQueueSwarm`].
pub struct TaskQueueSwarmBuilder {
    name: String,
    description: String,
    agents: Vec<SharedAgent>,
    max_loops: u32,
    autosave: bool,
    context: RunContext,
}

impl Default for TaskQueueSwarmBuilder {
    fn default() -> Self {
        Self {
            name: "TaskQueueSwarm".to_string(),
            description: "Workers draining a shared task queue".to_string(),
            agents: Vec::new(),
            max_loops: 1,
            autosave: false,
            context: RunContext::default(),
        }
    }
}

impl TaskQueueSwarmBuilder {
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

    pub fn autosave(mut self) -> Self {
        self.autosave = true;
        self
    }

    pub fn run_context(mut self, context: RunContext) -> Self {
        self.context = context;
        self
    }

    pub fn build(self) -> Result<TaskQueueSwarm, SwarmError> {
        reliability_check(&self.name, &self.description, self.agents.len(), self.max_loops)?;
        Ok(TaskQueueSwarm {
            name: self.name,
            description: self.description,
            agents: self.agents,
            autosave: self.autosave,
            context: self.context,
            queue: Mutex::new(VecDeque::new()),
        })
    }
}

/// Worker pool over a shared FIFO queue of pending tasks.
pub struct TaskQueueSwarm {
    name: String,
    description: String,
    agents: Vec<SharedAgent>,
    autosave: bool,
    context: RunContext,
    queue: Mutex<VecDeque<String>>,
}

impl TaskQueueSwarm {
    pub fn builder() -> TaskQueueSwarmBuilder {
        TaskQueueSwarmBuilder::default()
    }

    /// Enqueue one pending task.
    pub async fn add_task(&self, task: impl Into<String>) {
        self.queue.lock().await.push_back(task.into());
    }

    /// Enqueue several pending tasks.
    pub async fn add_tasks(&self, tasks: Vec<String>) {
        let mut queue = self.queue.lock().await;
        queue.extend(tasks);
    }

    pub async fn pending_tasks(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Pop atomically; `None` stops the calling worker.
    async fn pop_task(&self) -> Option<String> {
        self.queue.lock().await.pop_front()
    }

    /// Drain the queue with every agent working concurrently, returning the
    /// full run metadata.
    pub async fn run_all(&self) -> Result<MetadataSchema, SwarmError> {
        let mut metadata = MetadataSchema::begin(
            &self.name,
            "TaskQueueSwarm",
            &self.description,
            "queued tasks",
        );

        let workers = self.agents.iter().map(|agent| async {
            let mut records = Vec::new();
            loop {
                let Some(task) = self.pop_task().await else {
                    break;
                };
                records.push(timed_agent_run(agent, &task).await);
            }
            records
        });

        for records in join_all(workers).await {
            for (record, succeeded) in records {
                metadata.record(record, succeeded);
            }
        }
        metadata.complete();

        if self.autosave {
            let path = self
                .context
                .workspace_path(format!("{}_{}.json", self.name, metadata.run_id));
            persistence::save_json(&metadata, path).await?;
        }

        Ok(metadata)
    }
}

#[async_trait]
impl Swarm for TaskQueueSwarm {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    /// Enqueue `task` and drain the queue, returning a joined transcript.
    async fn run(&self, task: &str) -> Result<String, SwarmError> {
        self.add_task(task).await;
        let metadata = self.run_all().await?;
        Ok(metadata
            .agent_outputs
            .iter()
            .map(|o| format!("{}: {}", o.agent_name, o.output))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{last_turn_content, MockLLM};
    use crate::llm::LLM;
    use std::sync::Arc;

    fn echo_agent(name: &str) -> Agent {
        let tag = name.to_string();
        let llm: Arc<dyn LLM> = Arc::new(MockLLM::with_transform(move |messages| {
            format!("{}:{}", tag, last_turn_content(messages))
        }));
        Agent::builder(llm)
            .name(name)
            .retry_interval_secs(0)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_queue_drains_across_workers() {
        let swarm = TaskQueueSwarm::builder()
            .name("queue")
            .description("two workers, five tasks")
            .agents(vec![echo_agent("W1"), echo_agent("W2")])
            .build()
            .unwrap();

        swarm
            .add_tasks((1..=5).map(|i| format!("task-{}", i)).collect())
            .await;
        assert_eq!(swarm.pending_tasks().await, 5);

        let metadata = swarm.run_all().await.unwrap();
        assert_eq!(swarm.pending_tasks().await, 0);
        assert_eq!(metadata.agent_outputs.len(), 5);
        assert_eq!(metadata.tasks_completed, 5);

        // Every queued task ran exactly once.
        let mut tasks: Vec<&str> =
            metadata.agent_outputs.iter().map(|o| o.task.as_str()).collect();
        tasks.sort_unstable();
        assert_eq!(tasks, vec!["task-1", "task-2", "task-3", "task-4", "task-5"]);
    }

    #[tokio::test]
    async fn test_empty_queue_completes_immediately() {
        let swarm = TaskQueueSwarm::builder()
            .name("idle")
            .description("no tasks queued")
            .agents(vec![echo_agent("W1")])
            .build()
            .unwrap();

        let metadata = swarm.run_all().await.unwrap();
        assert!(metadata.agent_outputs.is_empty());
    }

    #[tokio::test]
    async fn test_worker_failure_recorded_without_stalling_queue() {
        let broken = Agent::builder(Arc::new(MockLLM::failing("down")) as Arc<dyn LLM>)
            .name("Broken")
            .retry_attempts(1)
            .retry_interval_secs(0)
            .build()
            .unwrap();

        let swarm = TaskQueueSwarm::builder()
            .name("faulty")
            .description("single broken worker")
            .add_agent(broken)
            .build()
            .unwrap();

        swarm.add_tasks(vec!["a".to_string(), "b".to_string()]).await;
        let metadata = swarm.run_all().await.unwrap();
        assert_eq!(metadata.tasks_failed, 2);
        assert_eq!(swarm.pending_tasks().await, 0);
    }
}
