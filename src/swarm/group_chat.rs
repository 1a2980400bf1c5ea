//! GroupChat: turn-based dialogue between agents with pluggable speaker
//! selection.
//!
//! Each turn walks the roster; the speaker function decides per agent
//! whether it talks this turn. A speaking agent receives the chat metadata,
//! its own name, the peer list, the rendered history, and the task.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::{reliability_check, share_agent, SharedAgent, Swarm, SwarmError};
use crate::agent::Agent;
use crate::utilities::random::coin_flip;

// ---------------------------------------------------------------------------
// Chat history
// ---------------------------------------------------------------------------

/// One agent's message within a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub agent_name: String,
    pub message: String,
    pub turn_number: u32,
    /// The messages the agent saw before speaking.
    pub preceding_context: Vec<String>,
}

/// One full pass over the roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub turn_number: u32,
    pub responses: Vec<ChatResponse>,
}

/// The complete dialogue of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistory {
    pub chat_name: String,
    pub task: String,
    pub turns: Vec<ChatTurn>,
}

impl ChatHistory {
    /// Flatten to `"name: message"` lines.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .flat_map(|turn| turn.responses.iter())
            .map(|r| format!("{}: {}", r.agent_name, r.message))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn message_count(&self) -> usize {
        self.turns.iter().map(|t| t.responses.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Speaker selection
// ---------------------------------------------------------------------------

/// Everything a speaker function may consult.
pub struct SpeakerContext<'a> {
    /// `"name: message"` lines, oldest first.
    pub recent_messages: &'a [String],
    pub agent_name: &'a str,
    pub system_prompt: &'a str,
    pub last_speaker: Option<&'a str>,
}

/// Decides whether an agent speaks this turn.
pub type SpeakerFn = Arc<dyn Fn(&SpeakerContext<'_>) -> bool + Send + Sync>;

/// Every agent speaks every turn.
pub fn round_robin_speaker() -> SpeakerFn {
    Arc::new(|_| true)
}

/// Speak when a keyword of the agent's system prompt appears in the last
/// message. With no history yet, everyone may open.
pub fn expertise_speaker() -> SpeakerFn {
    Arc::new(|ctx| {
        let Some(last) = ctx.recent_messages.last() else {
            return true;
        };
        let last = last.to_lowercase();
        ctx.system_prompt
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| token.len() >= 4)
            .any(|token| last.contains(token))
    })
}

/// Coin-flip participation.
pub fn random_speaker() -> SpeakerFn {
    Arc::new(|_| coin_flip())
}

/// The agent that just spoke continues; everyone may open.
pub fn most_recent_speaker() -> SpeakerFn {
    Arc::new(|ctx| match ctx.last_speaker {
        Some(last) => last == ctx.agent_name,
        None => true,
    })
}

/// Configuration for [`custom_speaker`].
#[derive(Debug, Clone, Default)]
pub struct CustomSpeakerConfig {
    /// Speak when any of these appears in the last message.
    pub keywords: Vec<String>,
    /// Speak when the agent is mentioned by name.
    pub respond_to_mentions: bool,
    /// Never speak twice in a row.
    pub exclude_recent_speaker: bool,
}

/// Keyword/mention-driven selection with optional recency exclusion.
pub fn custom_speaker(config: CustomSpeakerConfig) -> SpeakerFn {
    Arc::new(move |ctx| {
        if config.exclude_recent_speaker && ctx.last_speaker == Some(ctx.agent_name) {
            return false;
        }
        let Some(last) = ctx.recent_messages.last() else {
            return true;
        };
        let last = last.to_lowercase();
        if config.respond_to_mentions && last.contains(&ctx.agent_name.to_lowercase()) {
            return true;
        }
        config
            .keywords
            .iter()
            .any(|keyword| last.contains(&keyword.to_lowercase()))
    })
}

// ---------------------------------------------------------------------------
// GroupChat
// ---------------------------------------------------------------------------

/// Builder for [`GroupChat`].
pub struct GroupChatBuilder {
    name: String,
    description: String,
    agents: Vec<SharedAgent>,
    max_loops: u32,
    speaker_fn: SpeakerFn,
}

impl Default for GroupChatBuilder {
    fn default() -> Self {
        Self {
            name: "GroupChat".to_string(),
            description: "Turn-based dialogue between agents".to_string(),
            agents: Vec::new(),
            max_loops: 1,
            speaker_fn: round_robin_speaker(),
        }
    }
}

impl GroupChatBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn agents(self, agents: Vec<Agent>) -> Self {
        agents.into_iter().fold(self, |b, a| b.add_agent(a))
    }

    pub fn add_agent(mut self, agent: Agent) -> Self {
        self.agents.push(share_agent(agent));
        self
    }

    pub fn shared_agents(mut self, agents: Vec<SharedAgent>) -> Self {
        self.agents.extend(agents);
        self
    }

    pub fn max_loops(mut self, max_loops: u32) -> Self {
        self.max_loops = max_loops;
        self
    }

    pub fn speaker_fn(mut self, speaker_fn: SpeakerFn) -> Self {
        self.speaker_fn = speaker_fn;
        self
    }

    pub async fn build(self) -> Result<GroupChat, SwarmError> {
        reliability_check(&self.name, &self.description, self.agents.len(), self.max_loops)?;
        let mut roster = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            let guard = agent.lock().await;
            roster.push((
                guard.name().to_string(),
                guard.system_prompt().unwrap_or_default().to_string(),
            ));
        }
        Ok(GroupChat {
            name: self.name,
            description: self.description,
            agents: self.agents,
            roster,
            max_loops: self.max_loops,
            speaker_fn: self.speaker_fn,
        })
    }
}

/// Turn-based dialogue executor.
pub struct GroupChat {
    name: String,
    description: String,
    agents: Vec<SharedAgent>,
    /// `(name, system_prompt)` captured at build for speaker decisions.
    roster: Vec<(String, String)>,
    max_loops: u32,
    speaker_fn: SpeakerFn,
}

impl GroupChat {
    pub fn builder() -> GroupChatBuilder {
        GroupChatBuilder::default()
    }

    /// Run `max_loops` turns of dialogue on `task`.
    pub async fn run(&self, task: &str) -> Result<ChatHistory, SwarmError> {
        let mut history = ChatHistory {
            chat_name: self.name.clone(),
            task: task.to_string(),
            turns: Vec::new(),
        };
        let mut recent_messages: Vec<String> = Vec::new();
        let mut last_speaker: Option<String> = None;

        for turn_number in 0..self.max_loops {
            let mut responses = Vec::new();

            for (index, agent) in self.agents.iter().enumerate() {
                let (agent_name, system_prompt) = &self.roster[index];
                let context = SpeakerContext {
                    recent_messages: &recent_messages,
                    agent_name,
                    system_prompt,
                    last_speaker: last_speaker.as_deref(),
                };
                if !(self.speaker_fn)(&context) {
                    continue;
                }

                let prompt = self.chat_prompt(agent_name, &recent_messages, task);
                let message = match agent.lock().await.run_to_string(&prompt).await {
                    Ok(message) => message,
                    Err(e) => {
                        log::error!("group chat agent {:?} failed: {}", agent_name, e);
                        continue;
                    }
                };

                responses.push(ChatResponse {
                    agent_name: agent_name.clone(),
                    message: message.clone(),
                    turn_number,
                    preceding_context: recent_messages.clone(),
                });
                recent_messages.push(format!("{}: {}", agent_name, message));
                last_speaker = Some(agent_name.clone());
            }

            history.turns.push(ChatTurn {
                turn_number,
                responses,
            });
        }

        Ok(history)
    }

    /// Context string handed to a speaking agent. Peer awareness flows
    /// through this prompt; agents never hold references to the chat.
    fn chat_prompt(&self, agent_name: &str, recent_messages: &[String], task: &str) -> String {
        let peers: Vec<&str> = self
            .roster
            .iter()
            .map(|(name, _)| name.as_str())
            .filter(|name| *name != agent_name)
            .collect();
        format!(
            "Group chat {:?}: {}\nYou are {}. Other participants: {}.\n\
             Conversation so far:\n{}\n\nTask: {}",
            self.name,
            self.description,
            agent_name,
            peers.join(", "),
            if recent_messages.is_empty() {
                "(no messages yet)".to_string()
            } else {
                recent_messages.join("\n")
            },
            task
        )
    }

    /// Run several chats one after another.
    pub async fn run_batch(&self, tasks: Vec<String>) -> Result<Vec<ChatHistory>, SwarmError> {
        if tasks.is_empty() {
            return Err(SwarmError::EmptyTasks);
        }
        let mut histories = Vec::with_capacity(tasks.len());
        for task in tasks {
            histories.push(self.run(&task).await?);
        }
        Ok(histories)
    }

    /// Run several chats concurrently.
    pub async fn concurrent_run(&self, tasks: Vec<String>) -> Result<Vec<ChatHistory>, SwarmError> {
        if tasks.is_empty() {
            return Err(SwarmError::EmptyTasks);
        }
        let results = join_all(tasks.iter().map(|task| self.run(task))).await;
        results.into_iter().collect()
    }
}

#[async_trait]
impl Swarm for GroupChat {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn run(&self, task: &str) -> Result<String, SwarmError> {
        Ok(GroupChat::run(self, task).await?.transcript())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLLM;
    use crate::llm::LLM;

    fn chat_agent(name: &str, line: &str) -> Agent {
        let line = line.to_string();
        let llm: Arc<dyn LLM> = Arc::new(MockLLM::with_transform(move |_| line.clone()));
        Agent::builder(llm)
            .name(name)
            .retry_interval_secs(0)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_round_robin_everyone_speaks_each_turn() {
        let chat = GroupChat::builder()
            .name("panel")
            .description("everyone talks")
            .agents(vec![chat_agent("A", "alpha"), chat_agent("B", "beta")])
            .max_loops(2)
            .speaker_fn(round_robin_speaker())
            .build()
            .await
            .unwrap();

        let history = chat.run("discuss").await.unwrap();
        assert_eq!(history.turns.len(), 2);
        assert_eq!(history.message_count(), 4);
        assert_eq!(history.turns[0].responses[0].agent_name, "A");
        assert_eq!(history.turns[0].responses[1].agent_name, "B");
        // The second speaker saw the first speaker's message.
        assert_eq!(
            history.turns[0].responses[1].preceding_context,
            vec!["A: alpha".to_string()]
        );
    }

    #[tokio::test]
    async fn test_expertise_speaker_matches_system_prompt_keywords() {
        let mut seeded = vec!["B: we need budget figures".to_string()];
        let finance_ctx = SpeakerContext {
            recent_messages: &seeded,
            agent_name: "Finance",
            system_prompt: "You handle budget planning",
            last_speaker: Some("B"),
        };
        assert!(expertise_speaker()(&finance_ctx));

        seeded = vec!["B: let's paint the office".to_string()];
        let finance_ctx = SpeakerContext {
            recent_messages: &seeded,
            agent_name: "Finance",
            system_prompt: "You handle budget planning",
            last_speaker: Some("B"),
        };
        assert!(!expertise_speaker()(&finance_ctx));
    }

    #[tokio::test]
    async fn test_most_recent_speaker_keeps_the_floor() {
        let messages = vec!["A: mine".to_string()];
        let holder = SpeakerContext {
            recent_messages: &messages,
            agent_name: "A",
            system_prompt: "",
            last_speaker: Some("A"),
        };
        let rival = SpeakerContext {
            recent_messages: &messages,
            agent_name: "B",
            system_prompt: "",
            last_speaker: Some("A"),
        };
        let speaker = most_recent_speaker();
        assert!(speaker(&holder));
        assert!(!speaker(&rival));
    }

    #[tokio::test]
    async fn test_custom_speaker_mentions_and_exclusion() {
        let speaker = custom_speaker(CustomSpeakerConfig {
            keywords: vec!["deploy".to_string()],
            respond_to_mentions: true,
            exclude_recent_speaker: true,
        });

        let messages = vec!["A: Ops, please deploy".to_string()];
        let mentioned = SpeakerContext {
            recent_messages: &messages,
            agent_name: "Ops",
            system_prompt: "",
            last_speaker: Some("A"),
        };
        assert!(speaker(&mentioned));

        // Recency exclusion beats a keyword match.
        let just_spoke = SpeakerContext {
            recent_messages: &messages,
            agent_name: "Ops",
            system_prompt: "",
            last_speaker: Some("Ops"),
        };
        assert!(!speaker(&just_spoke));
    }

    #[tokio::test]
    async fn test_chat_prompt_names_peers_not_self() {
        let chat = GroupChat::builder()
            .name("panel")
            .description("peer listing")
            .agents(vec![chat_agent("A", "x"), chat_agent("B", "y"), chat_agent("C", "z")])
            .build()
            .await
            .unwrap();

        let prompt = chat.chat_prompt("B", &[], "t");
        assert!(prompt.contains("You are B"));
        assert!(prompt.contains("A, C"));
        assert!(!prompt.contains("participants: B"));
    }

    #[tokio::test]
    async fn test_failing_agent_skipped_in_dialogue() {
        let broken = Agent::builder(Arc::new(MockLLM::failing("down")) as Arc<dyn LLM>)
            .name("Broken")
            .retry_attempts(1)
            .retry_interval_secs(0)
            .build()
            .unwrap();

        let chat = GroupChat::builder()
            .name("panel")
            .description("robust dialogue")
            .agents(vec![broken, chat_agent("B", "still here")])
            .build()
            .await
            .unwrap();

        let history = chat.run("go").await.unwrap();
        assert_eq!(history.message_count(), 1);
        assert_eq!(history.turns[0].responses[0].agent_name, "B");
    }

    #[tokio::test]
    async fn test_concurrent_chats_return_per_task_histories() {
        let chat = GroupChat::builder()
            .name("panel")
            .description("batch chats")
            .agents(vec![chat_agent("A", "hi")])
            .build()
            .await
            .unwrap();

        let histories = chat
            .concurrent_run(vec!["t1".to_string(), "t2".to_string()])
            .await
            .unwrap();
        assert_eq!(histories.len(), 2);
        assert_eq!(histories[0].task, "t1");
        assert_eq!(histories[1].task, "t2");
    }
}
