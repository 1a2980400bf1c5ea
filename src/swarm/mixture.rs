//! MixtureOfAgents: a parallel expert layer whose outputs an aggregator
//! agent synthesizes into one answer.

use async_trait::async_trait;
use futures::future::join_all;

use super::metadata::{timed_agent_run, MetadataMap, MetadataSchema};
use super::{reliability_check, share_agent, SharedAgent, Swarm, SwarmError};
use crate::agent::Agent;

/// Builder for [`MixtureOfAgents`].
pub struct MixtureOfAgentsBuilder {
    name: String,
    description: String,
    experts: Vec<SharedAgent>,
    aggregator: Option<SharedAgent>,
}

impl Default for MixtureOfAgentsBuilder {
    fn default() -> Self {
        Self {
            name: "MixtureOfAgents".to_string(),
            description: "Expert layer synthesized by an aggregator".to_string(),
            experts: Vec::new(),
            aggregator: None,
        }
    }
}

impl MixtureOfAgentsBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn add_expert(mut self, expert: Agent) -> Self {
        self.experts.push(share_agent(expert));
        self
    }

    pub fn experts(self, experts: Vec<Agent>) -> Self {
        experts.into_iter().fold(self, |b, e| b.add_expert(e))
    }

    pub fn shared_experts(mut self, experts: Vec<SharedAgent>) -> Self {
        self.experts.extend(experts);
        self
    }

    pub fn aggregator(mut self, aggregator: Agent) -> Self {
        self.aggregator = Some(share_agent(aggregator));
        self
    }

    pub fn shared_aggregator(mut self, aggregator: SharedAgent) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn build(self) -> Result<MixtureOfAgents, SwarmError> {
        reliability_check(&self.name, &self.description, self.experts.len(), 1)?;
        let aggregator = self
            .aggregator
            .ok_or_else(|| SwarmError::Reliability("aggregator agent is required".to_string()))?;
        Ok(MixtureOfAgents {
            name: self.name,
            description: self.description,
            experts: self.experts,
            aggregator,
            metadata_map: MetadataMap::new(),
        })
    }
}

/// Parallel experts plus a synthesizing aggregator.
#[derive(Debug)]
pub struct MixtureOfAgents {
    name: String,
    description: String,
    experts: Vec<SharedAgent>,
    aggregator: SharedAgent,
    metadata_map: MetadataMap,
}

impl MixtureOfAgents {
    pub fn builder() -> MixtureOfAgentsBuilder {
        MixtureOfAgentsBuilder::default()
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata_map
    }

    /// Fan the task to every expert, then hand the labeled outputs to the
    /// aggregator. An expert failure is recorded and excluded from the
    /// synthesis; the aggregator's failure is fatal.
    pub async fn run(&self, task: &str) -> Result<String, SwarmError> {
        let mut metadata =
            MetadataSchema::begin(&self.name, "MixtureOfAgents", &self.description, task);

        let records =
            join_all(self.experts.iter().map(|expert| timed_agent_run(expert, task))).await;

        let mut expert_sections = Vec::with_capacity(records.len());
        for (record, succeeded) in records {
            if succeeded {
                expert_sections.push(format!("### {}\n{}", record.agent_name, record.output));
            }
            metadata.record(record, succeeded);
        }

        let synthesis_prompt = format!(
            "Task: {}\n\nIndependent expert responses:\n\n{}\n\n\
             Synthesize the expert responses into one final answer.",
            task,
            expert_sections.join("\n\n")
        );
        let answer = self
            .aggregator
            .lock()
            .await
            .run_to_string(&synthesis_prompt)
            .await?;

        metadata.complete();
        self.metadata_map.insert(task, metadata);
        Ok(answer)
    }
}

#[async_trait]
impl Swarm for MixtureOfAgents {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, task: &str) -> Result<String, SwarmError> {
        MixtureOfAgents::run(self, task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{last_turn_content, MockLLM};
    use crate::llm::LLM;
    use std::sync::Arc;

    fn expert(name: &str, opinion: &str) -> Agent {
        let opinion = opinion.to_string();
        let llm: Arc<dyn LLM> = Arc::new(MockLLM::with_transform(move |_| opinion.clone()));
        Agent::builder(llm)
            .name(name)
            .retry_interval_secs(0)
            .build()
            .unwrap()
    }

    fn summarizer() -> Agent {
        let llm: Arc<dyn LLM> = Arc::new(MockLLM::with_transform(|messages| {
            format!("summary of [{}]", last_turn_content(messages))
        }));
        Agent::builder(llm)
            .name("Aggregator")
            .retry_interval_secs(0)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_aggregator_sees_every_expert() {
        let moa = MixtureOfAgents::builder()
            .name("panel")
            .description("two experts and a summarizer")
            .experts(vec![expert("Optimist", "it will work"), expert("Pessimist", "it will fail")])
            .aggregator(summarizer())
            .build()
            .unwrap();

        moa.run("will it work?").await.unwrap();

        let meta = moa.metadata().get("will it work?").unwrap();
        assert_eq!(meta.tasks_completed, 2);

        // The aggregator prompt carried both expert sections.
        let agg = moa.aggregator.lock().await;
        let rendered = agg.short_memory().render();
        assert!(rendered.contains("Optimist"));
        assert!(rendered.contains("it will fail"));
    }

    #[tokio::test]
    async fn test_failed_expert_excluded_from_synthesis() {
        let broken = Agent::builder(Arc::new(MockLLM::failing("down")) as Arc<dyn LLM>)
            .name("Broken")
            .retry_attempts(1)
            .retry_interval_secs(0)
            .build()
            .unwrap();

        let moa = MixtureOfAgents::builder()
            .name("panel")
            .description("one expert down")
            .experts(vec![expert("Optimist", "fine"), broken])
            .aggregator(summarizer())
            .build()
            .unwrap();

        moa.run("status?").await.unwrap();
        let meta = moa.metadata().get("status?").unwrap();
        assert_eq!(meta.tasks_completed, 1);
        assert_eq!(meta.tasks_failed, 1);

        let agg = moa.aggregator.lock().await;
        assert!(!agg.short_memory().render().contains("### Broken"));
    }

    #[test]
    fn test_missing_aggregator_rejected() {
        let err = MixtureOfAgents::builder()
            .name("panel")
            .description("no aggregator")
            .add_expert(expert("Solo", "x"))
            .build()
            .unwrap_err();
        assert!(matches!(err, SwarmError::Reliability(_)));
    }
}
