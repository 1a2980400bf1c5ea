//! Output shaping for agent and swarm results.
//!
//! An [`OutputType`] declares the shape a run result is delivered in. The
//! accepted tokens are case sensitive; anything outside the set is rejected
//! at shaping time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while parsing an output type or shaping a result.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("invalid output type: {0:?}")]
    InvalidOutputType(String),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("toml serialization error: {0}")]
    Toml(#[from] toml::ser::Error),
}

// ---------------------------------------------------------------------------
// OutputType
// ---------------------------------------------------------------------------

/// Declared shape of a returned result.
///
/// `string` and `str` are aliases of [`OutputType::Text`]; the dotted
/// file-extension tokens keep their serialization format but are otherwise
/// equivalent to the bare token of the same format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputType {
    /// Loop outputs concatenated, joined by newlines (`"string"` / `"str"`).
    Text,
    /// Array of per-loop outputs (`"list"`).
    List,
    /// Structured `agent_output` object (`"dict"`).
    Dict,
    /// JSON-serialized form of the dict (`"json"` / `".json"`).
    Json,
    /// YAML-serialized form of the dict (`"yaml"` / `".yaml"`).
    Yaml,
    /// TOML-serialized form of the dict (`".toml"`).
    Toml,
    /// Markdown text (`".md"`); shaped like [`OutputType::Text`].
    Markdown,
    /// Plain text file content (`".txt"`); shaped like [`OutputType::Text`].
    Plain,
    /// All responses joined into one transcript (`"all"`).
    All,
    /// Only the final response (`"final"`).
    Final,
}

impl Default for OutputType {
    fn default() -> Self {
        OutputType::Text
    }
}

impl FromStr for OutputType {
    type Err = OutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" | "str" => Ok(OutputType::Text),
            "list" => Ok(OutputType::List),
            "dict" => Ok(OutputType::Dict),
            "json" | ".json" => Ok(OutputType::Json),
            "yaml" | ".yaml" => Ok(OutputType::Yaml),
            ".toml" => Ok(OutputType::Toml),
            ".md" => Ok(OutputType::Markdown),
            ".txt" => Ok(OutputType::Plain),
            "all" => Ok(OutputType::All),
            "final" => Ok(OutputType::Final),
            other => Err(OutputError::InvalidOutputType(other.to_string())),
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            OutputType::Text => "string",
            OutputType::List => "list",
            OutputType::Dict => "dict",
            OutputType::Json => "json",
            OutputType::Yaml => "yaml",
            OutputType::Toml => ".toml",
            OutputType::Markdown => ".md",
            OutputType::Plain => ".txt",
            OutputType::All => "all",
            OutputType::Final => "final",
        };
        write!(f, "{}", token)
    }
}

impl Serialize for OutputType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for OutputType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TokenVisitor;

        impl Visitor<'_> for TokenVisitor {
            type Value = OutputType;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an output type token")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<OutputType, E> {
                OutputType::from_str(v).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(TokenVisitor)
    }
}

// ---------------------------------------------------------------------------
// Agent output shaping
// ---------------------------------------------------------------------------

/// Structured record of one agent run, used as the `dict` shape and as the
/// payload behind the serialized shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutputEnvelope {
    pub agent_id: Uuid,
    pub agent_name: String,
    pub task: String,
    pub loop_outputs: Vec<String>,
    pub loops_completed: u32,
    pub timestamp: DateTime<Local>,
}

/// A shaped run result.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutput {
    /// Newline-joined text.
    Text(String),
    /// Per-loop outputs.
    List(Vec<String>),
    /// Structured `agent_output` object.
    Dict(serde_json::Value),
    /// A serialized (JSON/YAML/TOML) rendering.
    Serialized(String),
}

impl fmt::Display for RunOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutput::Text(s) | RunOutput::Serialized(s) => write!(f, "{}", s),
            RunOutput::List(items) => write!(f, "{}", items.join("\n")),
            RunOutput::Dict(value) => write!(f, "{}", value),
        }
    }
}

/// Shape the collected loop outputs of one agent run per `output_type`.
pub fn shape_agent_output(
    output_type: OutputType,
    envelope: &AgentOutputEnvelope,
) -> Result<RunOutput, OutputError> {
    let joined = envelope.loop_outputs.join("\n");
    match output_type {
        OutputType::Text | OutputType::Markdown | OutputType::Plain | OutputType::All => {
            Ok(RunOutput::Text(joined))
        }
        OutputType::Final => Ok(RunOutput::Text(
            envelope.loop_outputs.last().cloned().unwrap_or_default(),
        )),
        OutputType::List => Ok(RunOutput::List(envelope.loop_outputs.clone())),
        OutputType::Dict => Ok(RunOutput::Dict(
            serde_json::json!({ "agent_output": envelope }),
        )),
        OutputType::Json => {
            let dict = serde_json::json!({ "agent_output": envelope });
            Ok(RunOutput::Serialized(serde_json::to_string_pretty(&dict)?))
        }
        OutputType::Yaml => {
            let dict = serde_json::json!({ "agent_output": envelope });
            Ok(RunOutput::Serialized(serde_yaml::to_string(&dict)?))
        }
        OutputType::Toml => Ok(RunOutput::Serialized(toml::to_string(envelope)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope() -> AgentOutputEnvelope {
        AgentOutputEnvelope {
            agent_id: Uuid::new_v4(),
            agent_name: "Sampler".to_string(),
            task: "count".to_string(),
            loop_outputs: vec!["one".to_string(), "two".to_string()],
            loops_completed: 2,
            timestamp: Local::now(),
        }
    }

    #[test]
    fn test_parse_all_tokens() {
        for token in [
            "string", "str", "list", "json", "dict", "yaml", ".json", ".md", ".txt", ".yaml",
            ".toml", "all", "final",
        ] {
            assert!(OutputType::from_str(token).is_ok(), "token {:?}", token);
        }
    }

    #[test]
    fn test_string_and_str_are_equivalent() {
        assert_eq!(
            OutputType::from_str("string").unwrap(),
            OutputType::from_str("str").unwrap()
        );
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert!(OutputType::from_str("String").is_err());
        assert!(OutputType::from_str("JSON").is_err());
        assert!(OutputType::from_str("markdown").is_err());
    }

    #[test]
    fn test_list_joined_equals_text() {
        let envelope = sample_envelope();
        let text = shape_agent_output(OutputType::Text, &envelope).unwrap();
        let list = shape_agent_output(OutputType::List, &envelope).unwrap();
        assert_eq!(text.to_string(), list.to_string());
    }

    #[test]
    fn test_final_takes_last_output() {
        let envelope = sample_envelope();
        let shaped = shape_agent_output(OutputType::Final, &envelope).unwrap();
        assert_eq!(shaped.to_string(), "two");
    }

    #[test]
    fn test_dict_wraps_agent_output() {
        let envelope = sample_envelope();
        let shaped = shape_agent_output(OutputType::Dict, &envelope).unwrap();
        match shaped {
            RunOutput::Dict(value) => {
                assert_eq!(value["agent_output"]["agent_name"], "Sampler");
                assert_eq!(value["agent_output"]["loops_completed"], 2);
            }
            other => panic!("expected dict, got {:?}", other),
        }
    }

    #[test]
    fn test_yaml_round_trips_envelope() {
        let envelope = sample_envelope();
        let shaped = shape_agent_output(OutputType::Yaml, &envelope).unwrap();
        let text = shaped.to_string();
        let back: serde_json::Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back["agent_output"]["agent_name"], "Sampler");
        assert_eq!(
            back["agent_output"]["loop_outputs"],
            serde_json::json!(["one", "two"])
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&OutputType::Yaml).unwrap();
        let back: OutputType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OutputType::Yaml);
    }
}
