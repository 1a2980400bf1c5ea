//! Agent policy configuration.
//!
//! Everything in [`AgentConfig`] is a plain serializable scalar; the live
//! collaborators (LLM, long-term memory, tools, callbacks) live on the agent
//! itself and are re-attached after a snapshot load.

use std::fmt;
use std::path::PathBuf;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use super::AgentError;
use crate::memory::conversation::DEFAULT_USER_NAME;
use crate::utilities::output::OutputType;

/// Loop budget: a positive count, or `auto` (loop until a stop condition
/// fires).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxLoops {
    Finite(u32),
    Auto,
}

impl Default for MaxLoops {
    fn default() -> Self {
        MaxLoops::Finite(1)
    }
}

impl fmt::Display for MaxLoops {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxLoops::Finite(n) => write!(f, "{}", n),
            MaxLoops::Auto => write!(f, "auto"),
        }
    }
}

impl Serialize for MaxLoops {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MaxLoops::Finite(n) => serializer.serialize_u32(*n),
            MaxLoops::Auto => serializer.serialize_str("auto"),
        }
    }
}

impl<'de> Deserialize<'de> for MaxLoops {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MaxLoopsVisitor;

        impl Visitor<'_> for MaxLoopsVisitor {
            type Value = MaxLoops;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a positive integer or the string \"auto\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<MaxLoops, E> {
                u32::try_from(v)
                    .map(MaxLoops::Finite)
                    .map_err(|_| de::Error::custom("loop count out of range"))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<MaxLoops, E> {
                u32::try_from(v)
                    .map(MaxLoops::Finite)
                    .map_err(|_| de::Error::custom("loop count out of range"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<MaxLoops, E> {
                if v == "auto" {
                    Ok(MaxLoops::Auto)
                } else {
                    Err(de::Error::custom(format!(
                        "expected \"auto\", got {:?}",
                        v
                    )))
                }
            }
        }

        deserializer.deserialize_any(MaxLoopsVisitor)
    }
}

/// Identity and policy of one agent. All fields are snapshot-safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    // ---- Identity ----
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Name under which user turns are logged and prompts attributed.
    pub user_name: String,

    // ---- Prompting ----
    pub system_prompt: Option<String>,
    /// Synthesize a system prompt from the task when none is configured.
    pub auto_generate_prompt: bool,

    // ---- Loop budget ----
    pub max_loops: MaxLoops,
    /// Treat the loop budget as `auto` regardless of `max_loops`.
    pub dynamic_loops: bool,
    /// Seconds to sleep between loops.
    pub loop_interval_secs: u64,

    // ---- Sampling ----
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    /// Randomize temperature in [0, 1) each loop.
    pub dynamic_temperature: bool,
    pub max_tokens: u64,
    pub context_length: u64,

    // ---- Retry ----
    pub retry_attempts: u32,
    pub retry_interval_secs: u64,

    // ---- Termination ----
    pub stopping_token: Option<String>,
    /// Stop when the lowercased response contains "stop".
    pub stop_when_repeats: bool,

    // ---- Interaction ----
    pub interactive: bool,
    pub custom_exit_command: String,

    // ---- Output & persistence ----
    pub output_type: OutputType,
    pub autosave: bool,
    pub save_state_path: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            name: "Agent".to_string(),
            description: String::new(),
            user_name: DEFAULT_USER_NAME.to_string(),
            system_prompt: None,
            auto_generate_prompt: false,
            max_loops: MaxLoops::default(),
            dynamic_loops: false,
            loop_interval_secs: 0,
            temperature: 0.7,
            top_p: None,
            top_k: None,
            frequency_penalty: None,
            presence_penalty: None,
            dynamic_temperature: false,
            max_tokens: 4096,
            context_length: 8192,
            retry_attempts: 3,
            retry_interval_secs: 1,
            stopping_token: None,
            stop_when_repeats: false,
            interactive: false,
            custom_exit_command: "exit".to_string(),
            output_type: OutputType::default(),
            autosave: false,
            save_state_path: None,
        }
    }
}

impl AgentConfig {
    /// Validate the limits the run loop depends on.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.name.trim().is_empty() {
            return Err(AgentError::Config("agent name must not be empty".to_string()));
        }
        if self.max_tokens == 0 {
            return Err(AgentError::Config("max_tokens must be positive".to_string()));
        }
        if self.context_length == 0 {
            return Err(AgentError::Config(
                "context_length must be positive".to_string(),
            ));
        }
        if self.max_loops == MaxLoops::Finite(0) && !self.dynamic_loops {
            return Err(AgentError::Config("max_loops must be positive".to_string()));
        }
        Ok(())
    }

    /// The loop budget after applying the `dynamic_loops` override.
    pub fn effective_max_loops(&self) -> MaxLoops {
        if self.dynamic_loops {
            MaxLoops::Auto
        } else {
            self.max_loops
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_loops_serde_finite() {
        let json = serde_json::to_string(&MaxLoops::Finite(4)).unwrap();
        assert_eq!(json, "4");
        let back: MaxLoops = serde_json::from_str("4").unwrap();
        assert_eq!(back, MaxLoops::Finite(4));
    }

    #[test]
    fn test_max_loops_serde_auto() {
        let json = serde_json::to_string(&MaxLoops::Auto).unwrap();
        assert_eq!(json, "\"auto\"");
        let back: MaxLoops = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(back, MaxLoops::Auto);
    }

    #[test]
    fn test_max_loops_rejects_other_strings() {
        assert!(serde_json::from_str::<MaxLoops>("\"forever\"").is_err());
    }

    #[test]
    fn test_validation_rejects_zeroed_limits() {
        let mut config = AgentConfig::default();
        config.max_tokens = 0;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.context_length = 0;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.max_loops = MaxLoops::Finite(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dynamic_loops_overrides_budget() {
        let mut config = AgentConfig::default();
        config.max_loops = MaxLoops::Finite(5);
        config.dynamic_loops = true;
        assert_eq!(config.effective_max_loops(), MaxLoops::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = AgentConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: AgentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
