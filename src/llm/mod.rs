//! The LLM capability boundary.
//!
//! Agents hold an [`LLM`] trait object and nothing else about the provider:
//! one completion call over role-tagged messages. Provider crates implement
//! the trait outside this crate; [`mock`] ships a scripted implementation for
//! tests and offline development.

pub mod mock;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by an LLM binding.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network, authentication, or provider-side failure.
    #[error("llm transport error: {0}")]
    Transport(String),
    /// The provider returned no usable content.
    #[error("empty completion from provider")]
    EmptyCompletion,
}

// ---------------------------------------------------------------------------
// Messages and options
// ---------------------------------------------------------------------------

/// One role-tagged message in a completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling and decoding options passed through to the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub max_tokens: Option<u64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub stream: bool,
}

// ---------------------------------------------------------------------------
// LLM trait
// ---------------------------------------------------------------------------

/// A language-model completion capability.
///
/// Implementations read their credentials from the environment; the core
/// treats the binding as opaque.
#[async_trait]
pub trait LLM: Send + Sync + fmt::Debug {
    /// Model identifier, for logs and metadata.
    fn model(&self) -> &str;

    /// Complete the conversation, returning the raw provider text.
    ///
    /// The returned string may be bare text or the common provider envelope
    /// (`{"choices": [{"message": {"content": …}}]}`); callers normalize it
    /// with [`parse_completion`].
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, LlmError>;
}

/// Unwrap the common provider envelope, falling back to the raw text.
///
/// Accepts either a bare string or a JSON object of the shape
/// `{"choices": [{"message": {"content": "..."}}]}`.
pub fn parse_completion(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if let Some(content) = value
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("message"))
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str())
            {
                return content.to_string();
            }
        }
    }
    raw.to_string()
}
