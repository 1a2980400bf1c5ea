//! Append-only conversation log rendered into prompts.
//!
//! Every agent owns exactly one [`Conversation`] as its short-term memory.
//! Turns keep insertion order; rendering concatenates `"role: content"`
//! lines in that order, which is also the prompt format handed to the LLM.

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Default name under which user turns are recorded.
pub const DEFAULT_USER_NAME: &str = "Human";

/// Who spoke a turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// System instructions (prompt, tool schemas, rules).
    System,
    /// The named user feeding tasks in.
    User(String),
    /// The named agent answering.
    Assistant(String),
    /// Long-term memory injections.
    Database,
    /// Results of dispatched tool calls.
    ToolExecutor,
    /// Evaluator commentary on a response.
    Evaluator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "System"),
            Role::User(name) | Role::Assistant(name) => write!(f, "{}", name),
            Role::Database => write!(f, "Database"),
            Role::ToolExecutor => write!(f, "Tool Executor"),
            Role::Evaluator => write!(f, "Evaluator"),
        }
    }
}

/// One logged exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Local>,
}

/// Ordered, append-only sequence of turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    /// Owner label, used in logs only.
    pub name: String,
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            turns: Vec::new(),
        }
    }

    /// Append one turn. Insertion order is preserved forever; there is no
    /// removal operation.
    pub fn add(&mut self, role: Role, content: impl Into<String>) {
        let content = content.into();
        log::trace!("[{}] {} turn ({} chars)", self.name, role, content.len());
        self.turns.push(Turn {
            role,
            content,
            timestamp: Local::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Restore turns from a persisted snapshot.
    pub fn restore(name: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            name: name.into(),
            turns,
        }
    }

    /// Replace the content of the first system turn, or prepend one.
    ///
    /// Used when a system prompt is regenerated mid-lifecycle; the log stays
    /// append-only for every other role.
    pub fn set_system(&mut self, content: impl Into<String>) {
        let content = content.into();
        if let Some(turn) = self.turns.iter_mut().find(|t| t.role == Role::System) {
            turn.content = content;
        } else {
            self.turns.insert(
                0,
                Turn {
                    role: Role::System,
                    content,
                    timestamp: Local::now(),
                },
            );
        }
    }

    /// Render the full history as `"role: content"` lines.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Split a rendered history back into `(role, content)` pairs.
    ///
    /// Lines without a role prefix are continuations of the preceding turn's
    /// content.
    pub fn parse_rendered(rendered: &str) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for line in rendered.lines() {
            match line.split_once(": ") {
                Some((role, content)) if !role.contains(' ') || known_multiword_role(role) => {
                    pairs.push((role.to_string(), content.to_string()));
                }
                _ => {
                    if let Some(last) = pairs.last_mut() {
                        last.1.push('\n');
                        last.1.push_str(line);
                    }
                }
            }
        }
        pairs
    }
}

fn known_multiword_role(role: &str) -> bool {
    role == "Tool Executor"
}

impl fmt::Display for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_preserved() {
        let mut convo = Conversation::new("test");
        convo.add(Role::System, "be brief");
        convo.add(Role::User("Human".to_string()), "hi");
        convo.add(Role::Assistant("Echo".to_string()), "hello");

        let roles: Vec<String> = convo.turns().iter().map(|t| t.role.to_string()).collect();
        assert_eq!(roles, vec!["System", "Human", "Echo"]);
    }

    #[test]
    fn test_render_joins_in_order() {
        let mut convo = Conversation::new("test");
        convo.add(Role::User("Human".to_string()), "ping");
        convo.add(Role::Assistant("Echo".to_string()), "pong");
        assert_eq!(convo.render(), "Human: ping\nEcho: pong");
    }

    #[test]
    fn test_render_parse_round_trip() {
        let mut convo = Conversation::new("test");
        convo.add(Role::System, "be brief");
        convo.add(Role::User("Human".to_string()), "what is 2+2");
        convo.add(Role::Assistant("Calc".to_string()), "4");
        convo.add(Role::ToolExecutor, "{\"result\": 4}");

        let parsed = Conversation::parse_rendered(&convo.render());
        let expected: Vec<(String, String)> = convo
            .turns()
            .iter()
            .map(|t| (t.role.to_string(), t.content.clone()))
            .collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_set_system_replaces_existing() {
        let mut convo = Conversation::new("test");
        convo.add(Role::System, "v1");
        convo.add(Role::User("Human".to_string()), "task");
        convo.set_system("v2");

        assert_eq!(convo.len(), 2);
        assert_eq!(convo.turns()[0].content, "v2");
    }

    #[test]
    fn test_set_system_prepends_when_absent() {
        let mut convo = Conversation::new("test");
        convo.add(Role::User("Human".to_string()), "task");
        convo.set_system("inserted");

        assert_eq!(convo.turns()[0].role, Role::System);
        assert_eq!(convo.turns()[1].role, Role::User("Human".to_string()));
    }

    #[test]
    fn test_multiline_content_folds_on_parse() {
        let mut convo = Conversation::new("test");
        convo.add(Role::Assistant("Poet".to_string()), "line one\nline two");
        let parsed = Conversation::parse_rendered(&convo.render());
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].1, "line one\nline two");
    }
}
