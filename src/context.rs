//! Execution context injected into agents and swarm executors.
//!
//! Replaces scattered environment reads with one value constructed at the
//! composition root: the workspace directory for persisted artifacts and a
//! clock accessor.

use std::env;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Environment variable naming the persistence root.
pub const WORKSPACE_DIR_ENV: &str = "WORKSPACE_DIR";

/// Default persistence root when `WORKSPACE_DIR` is unset.
pub const DEFAULT_WORKSPACE_DIR: &str = "workspace";

/// Ambient services for a run: where artifacts go and what time it is.
#[derive(Debug, Clone)]
pub struct RunContext {
    workspace_dir: PathBuf,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RunContext {
    /// Build a context rooted at an explicit workspace directory.
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
        }
    }

    /// Build a context from `WORKSPACE_DIR`, reading the environment once.
    pub fn from_env() -> Self {
        let workspace_dir = env::var(WORKSPACE_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_WORKSPACE_DIR));
        Self { workspace_dir }
    }

    /// The persistence root for this run.
    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    /// Resolve a path under the workspace directory.
    pub fn workspace_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.workspace_dir.join(relative)
    }

    /// Current wall-clock time.
    pub fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
