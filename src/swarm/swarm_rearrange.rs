//! SwarmRearrange: the flow DSL applied to whole swarms.
//!
//! Identical stage semantics to agent-level rearrangement, but each
//! participant is a [`Swarm`] trait object: chained single stages, parallel
//! groups joined with `"; "`, and `H` stages for human input.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;

use super::flow::{Flow, HUMAN_PARTICIPANT};
use super::{Swarm, SwarmError};
use crate::human::{HumanInputProvider, TerminalInput};

/// Builder for [`SwarmRearrange`].
pub struct SwarmRearrangeBuilder {
    name: String,
    description: String,
    swarms: Vec<Arc<dyn Swarm>>,
    flow: Option<String>,
    max_loops: u32,
    human_input: Option<Arc<dyn HumanInputProvider>>,
}

impl Default for SwarmRearrangeBuilder {
    fn default() -> Self {
        Self {
            name: "SwarmRearrange".to_string(),
            description: "Swarms executing a rearrangeable flow".to_string(),
            swarms: Vec::new(),
            flow: None,
            max_loops: 1,
            human_input: None,
        }
    }
}

impl SwarmRearrangeBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn add_swarm(mut self, swarm: Arc<dyn Swarm>) -> Self {
        self.swarms.push(swarm);
        self
    }

    pub fn swarms(mut self, swarms: Vec<Arc<dyn Swarm>>) -> Self {
        self.swarms.extend(swarms);
        self
    }

    pub fn flow(mut self, flow: impl Into<String>) -> Self {
        self.flow = Some(flow.into());
        self
    }

    pub fn max_loops(mut self, max_loops: u32) -> Self {
        self.max_loops = max_loops;
        self
    }

    pub fn human_input(mut self, provider: Arc<dyn HumanInputProvider>) -> Self {
        self.human_input = Some(provider);
        self
    }

    pub fn build(self) -> Result<SwarmRearrange, SwarmError> {
        if self.swarms.is_empty() {
            return Err(SwarmError::Reliability(
                "swarm rearrange requires at least one swarm".to_string(),
            ));
        }
        if self.max_loops == 0 {
            return Err(SwarmError::Reliability("max_loops must be at least 1".to_string()));
        }

        let mut swarms: HashMap<String, Arc<dyn Swarm>> = HashMap::new();
        for swarm in self.swarms {
            swarms.insert(swarm.name().to_string(), swarm);
        }

        let flow_source = self
            .flow
            .ok_or_else(|| SwarmError::Reliability("flow must be configured".to_string()))?;
        let flow = Flow::parse(&flow_source)?;
        let registered: HashSet<String> = swarms.keys().cloned().collect();
        flow.validate(&registered)?;

        Ok(SwarmRearrange {
            name: self.name,
            description: self.description,
            swarms,
            flow,
            max_loops: self.max_loops,
            human_input: self
                .human_input
                .unwrap_or_else(|| Arc::new(TerminalInput) as Arc<dyn HumanInputProvider>),
        })
    }
}

/// Flow executor over named swarms.
pub struct SwarmRearrange {
    name: String,
    description: String,
    swarms: HashMap<String, Arc<dyn Swarm>>,
    flow: Flow,
    max_loops: u32,
    human_input: Arc<dyn HumanInputProvider>,
}

impl std::fmt::Debug for SwarmRearrange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmRearrange")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("swarms", &self.swarms.keys().collect::<Vec<_>>())
            .field("flow", &self.flow)
            .field("max_loops", &self.max_loops)
            .field("human_input", &"<dyn HumanInputProvider>")
            .finish()
    }
}

impl SwarmRearrange {
    pub fn builder() -> SwarmRearrangeBuilder {
        SwarmRearrangeBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    /// Walk the flow, chaining each stage's output into the next stage's
    /// task.
    pub async fn run(&self, task: &str) -> Result<String, SwarmError> {
        let mut current_task = task.to_string();

        for _ in 0..self.max_loops {
            for stage in self.flow.stages() {
                if stage.len() > 1 {
                    let participants: Vec<&String> = stage
                        .iter()
                        .filter(|p| p.as_str() != HUMAN_PARTICIPANT)
                        .collect();
                    let outputs = join_all(participants.iter().map(|name| {
                        let swarm = self.swarms.get(name.as_str()).cloned();
                        let task = current_task.clone();
                        async move {
                            match swarm {
                                Some(swarm) => swarm.run(&task).await,
                                None => Err(SwarmError::UnknownAgent((*name).clone())),
                            }
                        }
                    }))
                    .await;

                    let mut joined = Vec::with_capacity(outputs.len());
                    for output in outputs {
                        joined.push(output?);
                    }
                    current_task = joined.join("; ");
                } else if stage[0] == HUMAN_PARTICIPANT {
                    let prompt = format!(
                        "Current result:\n{}\n\nProvide the task for the next stage",
                        current_task
                    );
                    current_task = self.human_input.request_input(&prompt)?;
                } else {
                    let swarm = self
                        .swarms
                        .get(&stage[0])
                        .ok_or_else(|| SwarmError::UnknownAgent(stage[0].clone()))?;
                    current_task = swarm.run(&current_task).await?;
                }
            }
        }

        Ok(current_task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Minimal swarm double: tags its input.
    struct TagSwarm {
        name: String,
    }

    #[async_trait]
    impl Swarm for TagSwarm {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "tags the task"
        }

        async fn run(&self, task: &str) -> Result<String, SwarmError> {
            Ok(format!("{}[{}]", self.name, task))
        }
    }

    fn tag(name: &str) -> Arc<dyn Swarm> {
        Arc::new(TagSwarm {
            name: name.to_string(),
        })
    }

    #[tokio::test]
    async fn test_swarms_chain_through_flow() {
        let rearrange = SwarmRearrange::builder()
            .swarms(vec![tag("S1"), tag("S2")])
            .flow("S1 -> S2")
            .build()
            .unwrap();

        let result = rearrange.run("t").await.unwrap();
        assert_eq!(result, "S2[S1[t]]");
    }

    #[tokio::test]
    async fn test_parallel_swarm_stage_joins() {
        let rearrange = SwarmRearrange::builder()
            .swarms(vec![tag("S1"), tag("S2"), tag("S3")])
            .flow("S1 -> S2, S3")
            .build()
            .unwrap();

        let result = rearrange.run("t").await.unwrap();
        assert_eq!(result, "S2[S1[t]]; S3[S1[t]]");
    }

    #[tokio::test]
    async fn test_unknown_swarm_in_flow_rejected_at_build() {
        let err = SwarmRearrange::builder()
            .swarms(vec![tag("S1")])
            .flow("S1 -> Missing")
            .build()
            .unwrap_err();
        assert!(matches!(err, SwarmError::Flow(_)));
    }
}
