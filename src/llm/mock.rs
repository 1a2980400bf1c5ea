//! Scripted LLM implementation for tests and offline development.
//!
//! Three behaviors are supported: cycling through canned responses,
//! computing the response from the request with a closure, and failing every
//! call. All variants count invocations.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::{ChatMessage, CompletionOptions, LlmError, LLM};

/// Closure computing a mock response from the request messages.
pub type ResponseFn = Arc<dyn Fn(&[ChatMessage]) -> String + Send + Sync>;

enum Behavior {
    /// Canned responses, cycled in order.
    Scripted(Vec<String>),
    /// Response derived from the request.
    Transform(ResponseFn),
    /// Every call fails with this message.
    Failing(String),
}

/// A mock [`LLM`] with a configurable behavior and a call counter.
pub struct MockLLM {
    model_id: String,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl fmt::Debug for MockLLM {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockLLM")
            .field("model_id", &self.model_id)
            .field("calls", &self.calls.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl MockLLM {
    /// Cycle through `responses` in order, wrapping around at the end.
    pub fn scripted(responses: Vec<String>) -> Self {
        Self {
            model_id: "mock-llm".to_string(),
            behavior: Behavior::Scripted(responses),
            calls: AtomicUsize::new(0),
        }
    }

    /// Compute each response from the request messages.
    pub fn with_transform<F>(transform: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> String + Send + Sync + 'static,
    {
        Self {
            model_id: "mock-llm".to_string(),
            behavior: Behavior::Transform(Arc::new(transform)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail every call with a transport error carrying `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            model_id: "mock-llm".to_string(),
            behavior: Behavior::Failing(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Override the reported model identifier.
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Number of `complete` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LLM for MockLLM {
    fn model(&self) -> &str {
        &self.model_id
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Scripted(responses) => {
                if responses.is_empty() {
                    return Err(LlmError::EmptyCompletion);
                }
                Ok(responses[call % responses.len()].clone())
            }
            Behavior::Transform(f) => Ok(f(messages)),
            Behavior::Failing(message) => Err(LlmError::Transport(message.clone())),
        }
    }
}

/// Extract the content of the final line of the rendered conversation that a
/// caller passed as the user message.
///
/// Rendered conversations are `"role: content"` lines; transforms frequently
/// want just the newest content, so this helper strips the role prefix of the
/// last line.
pub fn last_turn_content(messages: &[ChatMessage]) -> String {
    messages
        .last()
        .map(|m| m.content.as_str())
        .unwrap_or_default()
        .lines()
        .last()
        .and_then(|line| line.split_once(": ").map(|(_, content)| content))
        .or_else(|| {
            messages
                .last()
                .map(|m| m.content.as_str())
                .unwrap_or_default()
                .lines()
                .last()
        })
        .unwrap_or_default()
        .to_string()
}
