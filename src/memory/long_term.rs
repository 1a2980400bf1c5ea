//! Long-term memory capability boundary.
//!
//! The store itself (vector database, RAG pipeline) lives outside the core;
//! agents only need to query it with the task text and ask it to persist
//! itself.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a long-term memory backend.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory query failed: {0}")]
    Query(String),
    #[error("memory save failed: {0}")]
    Save(String),
}

/// A queryable, persistable long-term memory.
///
/// When shared across a swarm, a single instance backs many agents; the
/// implementation is responsible for serializing its own writes.
#[async_trait]
pub trait LongTermMemory: Send + Sync + fmt::Debug {
    /// Retrieve context relevant to `text`, rendered as one string.
    async fn query(&self, text: &str) -> Result<String, MemoryError>;

    /// Persist the store to `path`.
    async fn save(&self, path: &Path) -> Result<(), MemoryError>;
}
