//! The flow DSL: `"A -> B, C -> H -> D"`.
//!
//! `->` separates stages, `,` splits a stage into parallel participants, and
//! the reserved participant `H` marks a human-in-the-loop stage. Whitespace
//! around tokens is ignored.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reserved participant name for human-in-the-loop stages.
pub const HUMAN_PARTICIPANT: &str = "H";

/// Errors from parsing or validating a flow.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("flow must not be empty")]
    Empty,
    #[error("flow must contain at least one \"->\" stage separator")]
    MissingSeparator,
    #[error("flow stage has no participants")]
    EmptyStage,
    #[error("duplicate participant {0:?} in flow")]
    DuplicateParticipant(String),
    #[error("unknown participant {0:?} in flow")]
    UnknownParticipant(String),
}

/// A parsed flow: ordered stages of parallel participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    stages: Vec<Vec<String>>,
}

impl Flow {
    /// Parse the DSL. The flow must contain at least one `->`.
    pub fn parse(flow: &str) -> Result<Self, FlowError> {
        if flow.trim().is_empty() {
            return Err(FlowError::Empty);
        }
        if !flow.contains("->") {
            return Err(FlowError::MissingSeparator);
        }

        let mut stages = Vec::new();
        for raw_stage in flow.split("->") {
            let participants: Vec<String> = raw_stage
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            if participants.is_empty() {
                return Err(FlowError::EmptyStage);
            }
            stages.push(participants);
        }

        Ok(Self { stages })
    }

    /// Build the linear flow `A -> B -> C` over `names` in order.
    pub fn sequential(names: &[String]) -> Result<Self, FlowError> {
        if names.len() < 2 {
            // A single stage has no separator; synthesize the degenerate
            // one-stage flow directly.
            if names.is_empty() {
                return Err(FlowError::Empty);
            }
            return Ok(Self {
                stages: vec![vec![names[0].clone()]],
            });
        }
        Self::parse(&names.join(" -> "))
    }

    /// Check that every participant is registered (or is `H`) and that no
    /// name repeats anywhere in the flow.
    pub fn validate(&self, registered: &HashSet<String>) -> Result<(), FlowError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for stage in &self.stages {
            for participant in stage {
                if participant != HUMAN_PARTICIPANT && !registered.contains(participant) {
                    return Err(FlowError::UnknownParticipant(participant.clone()));
                }
                if !seen.insert(participant.as_str()) {
                    return Err(FlowError::DuplicateParticipant(participant.clone()));
                }
            }
        }
        Ok(())
    }

    pub fn stages(&self) -> &[Vec<String>] {
        &self.stages
    }

    /// Total number of non-human participants.
    pub fn participant_count(&self) -> usize {
        self.stages
            .iter()
            .flatten()
            .filter(|p| p.as_str() != HUMAN_PARTICIPANT)
            .count()
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .stages
            .iter()
            .map(|stage| stage.join(", "))
            .collect::<Vec<_>>()
            .join(" -> ");
        write!(f, "{}", rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_mixed_flow() {
        let flow = Flow::parse("A -> B, C -> H -> D").unwrap();
        assert_eq!(
            flow.stages(),
            &[
                vec!["A".to_string()],
                vec!["B".to_string(), "C".to_string()],
                vec!["H".to_string()],
                vec!["D".to_string()],
            ]
        );
    }

    #[test]
    fn test_whitespace_is_ignored() {
        let flow = Flow::parse("  A   ->B ,   C  ").unwrap();
        assert_eq!(
            flow.stages(),
            &[vec!["A".to_string()], vec!["B".to_string(), "C".to_string()]]
        );
    }

    #[test]
    fn test_missing_separator_rejected() {
        assert!(matches!(
            Flow::parse("A, B"),
            Err(FlowError::MissingSeparator)
        ));
        assert!(matches!(Flow::parse("   "), Err(FlowError::Empty)));
    }

    #[test]
    fn test_validate_requires_registered_names() {
        let flow = Flow::parse("A -> Z").unwrap();
        let err = flow.validate(&names(&["A", "B"])).unwrap_err();
        assert!(matches!(err, FlowError::UnknownParticipant(p) if p == "Z"));
    }

    #[test]
    fn test_validate_allows_human_participant() {
        let flow = Flow::parse("A -> H -> B").unwrap();
        assert!(flow.validate(&names(&["A", "B"])).is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicates_across_stages() {
        let flow = Flow::parse("A -> B -> A").unwrap();
        let err = flow.validate(&names(&["A", "B"])).unwrap_err();
        assert!(matches!(err, FlowError::DuplicateParticipant(p) if p == "A"));
    }

    #[test]
    fn test_sequential_derivation() {
        let flow =
            Flow::sequential(&["A".to_string(), "B".to_string(), "C".to_string()]).unwrap();
        assert_eq!(flow.to_string(), "A -> B -> C");
    }

    #[test]
    fn test_display_round_trip() {
        let source = "A -> B, C -> D";
        let flow = Flow::parse(source).unwrap();
        assert_eq!(flow.to_string(), source);
        assert_eq!(Flow::parse(&flow.to_string()).unwrap(), flow);
    }

    #[test]
    fn test_participant_count_excludes_human() {
        let flow = Flow::parse("A -> B, C -> H").unwrap();
        assert_eq!(flow.participant_count(), 3);
    }
}
