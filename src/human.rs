//! Human-in-the-loop input boundary.
//!
//! Interactive agents and `H` flow stages block on a [`HumanInputProvider`].
//! The default implementation reads the terminal; tests and embedders inject
//! a closure-backed provider instead.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use thiserror::Error;

/// Errors from soliciting human input.
#[derive(Debug, Error)]
pub enum HumanInputError {
    /// The input channel is closed (EOF on stdin, dropped callback, ...).
    #[error("human input channel closed")]
    Closed,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Source of human responses. Waits are unbounded by contract.
pub trait HumanInputProvider: Send + Sync {
    /// Show `prompt` and block until the human answers.
    fn request_input(&self, prompt: &str) -> Result<String, HumanInputError>;
}

/// Terminal-backed provider reading one line from stdin.
#[derive(Debug, Default)]
pub struct TerminalInput;

impl HumanInputProvider for TerminalInput {
    fn request_input(&self, prompt: &str) -> Result<String, HumanInputError> {
        println!("\n--- Human input required ---\n{}", prompt);
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(HumanInputError::Closed);
        }
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }
}

/// Closure-backed provider for tests and embedding hosts.
pub struct CallbackInput {
    callback: Arc<dyn Fn(&str) -> String + Send + Sync>,
}

impl CallbackInput {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }
}

impl HumanInputProvider for CallbackInput {
    fn request_input(&self, prompt: &str) -> Result<String, HumanInputError> {
        Ok((self.callback)(prompt))
    }
}
