//! Auto topology matcher: map a free-text task to a topology tag by
//! embedding similarity.
//!
//! The catalog pairs each dispatchable topology with a description;
//! `auto_select` embeds the task, scores it against the catalog by cosine
//! similarity, and returns the argmax. Without an embedding backend the
//! matcher degrades to `SequentialWorkflow`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tokio::sync::OnceCell;

use super::SwarmType;
use crate::swarm::SwarmError;

/// Sentence-embedding capability. Implementations live outside the core.
#[async_trait]
pub trait Embedder: Send + Sync + fmt::Debug {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SwarmError>;
}

/// Topology descriptions scored against the task text.
static CATALOG: Lazy<Vec<(SwarmType, &'static str)>> = Lazy::new(|| {
    vec![
        (
            SwarmType::SequentialWorkflow,
            "step by step pipeline where each agent refines the previous agent's work in order",
        ),
        (
            SwarmType::ConcurrentWorkflow,
            "independent perspectives on the same task gathered in parallel",
        ),
        (
            SwarmType::AgentRearrange,
            "custom flow mixing sequential hand-offs, parallel groups, and human checkpoints",
        ),
        (
            SwarmType::MixtureOfAgents,
            "several experts answer independently and an aggregator synthesizes one answer",
        ),
        (
            SwarmType::SpreadSheetSwarm,
            "batch execution of many configured tasks with results logged to a spreadsheet",
        ),
        (
            SwarmType::RoundRobin,
            "iterative refinement where the result cycles repeatedly through every agent",
        ),
        (
            SwarmType::TaskQueueSwarm,
            "a backlog of many small tasks drained by a pool of workers",
        ),
        (
            SwarmType::GraphWorkflow,
            "dependency graph of steps where some steps wait on others",
        ),
        (
            SwarmType::HierarchicalAgentSwarm,
            "a manager decomposes the task and delegates orders to specialist workers",
        ),
        (
            SwarmType::GroupChat,
            "open discussion where agents debate and build on each other's messages",
        ),
    ]
});

/// Cosine similarity of two vectors; zero when either has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Task-to-topology matcher over the built-in catalog.
pub struct SwarmMatcher {
    embedder: Option<Arc<dyn Embedder>>,
    /// Catalog embeddings, computed once on first use.
    catalog_embeddings: OnceCell<Vec<Vec<f32>>>,
}

impl SwarmMatcher {
    pub fn new(embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            embedder,
            catalog_embeddings: OnceCell::new(),
        }
    }

    /// Pick the topology whose description is closest to the task.
    ///
    /// Degrades to [`SwarmType::SequentialWorkflow`] when no embedding
    /// backend is configured or the backend fails.
    pub async fn auto_select(&self, task: &str) -> SwarmType {
        let Some(embedder) = &self.embedder else {
            return SwarmType::SequentialWorkflow;
        };

        let task_embedding = match embedder.embed(task).await {
            Ok(embedding) => embedding,
            Err(e) => {
                log::warn!("embedding backend failed, falling back to sequential: {}", e);
                return SwarmType::SequentialWorkflow;
            }
        };

        let catalog_embeddings = match self
            .catalog_embeddings
            .get_or_try_init(|| async {
                let mut embeddings = Vec::with_capacity(CATALOG.len());
                for (_, description) in CATALOG.iter() {
                    embeddings.push(embedder.embed(description).await?);
                }
                Ok::<_, SwarmError>(embeddings)
            })
            .await
        {
            Ok(embeddings) => embeddings,
            Err(e) => {
                log::warn!("catalog embedding failed, falling back to sequential: {}", e);
                return SwarmType::SequentialWorkflow;
            }
        };

        CATALOG
            .iter()
            .zip(catalog_embeddings)
            .map(|((swarm_type, _), embedding)| {
                (*swarm_type, cosine_similarity(&task_embedding, embedding))
            })
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(swarm_type, _)| swarm_type)
            .unwrap_or(SwarmType::SequentialWorkflow)
    }
}
