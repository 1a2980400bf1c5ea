//! The agent run loop.
//!
//! One agent wraps one LLM binding plus its short-term conversation,
//! optional long-term memory, and tools. `run` drives the loop specified by
//! the agent's policy: prompt assembly from the rendered conversation,
//! retried LLM invocation, tool dispatch, evaluator commentary, stop checks,
//! and optional interactive turns, finally shaping the collected outputs per
//! the configured output type.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use uuid::Uuid;

use super::config::{AgentConfig, MaxLoops};
use super::state::AgentState;
use super::AgentError;
use crate::context::RunContext;
use crate::human::{HumanInputProvider, TerminalInput};
use crate::llm::{parse_completion, ChatMessage, CompletionOptions, LLM};
use crate::memory::conversation::{Conversation, Role};
use crate::memory::long_term::LongTermMemory;
use crate::tools::{execute_tool_calls, parse_tool_calls, Tool, ToolRegistry};
use crate::utilities::backoff::retry_with_backoff;
use crate::utilities::output::{shape_agent_output, AgentOutputEnvelope, OutputType, RunOutput};
use crate::utilities::random::random_unit;

/// Conventional completion marker honored by every agent.
pub const DONE_TOKEN: &str = "<DONE>";

/// Predicate over response text that ends an `auto` loop.
pub type StoppingCondition = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Callback producing evaluator commentary for a response.
pub type EvaluatorFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`Agent`]. Validation happens in [`AgentBuilder::build`].
pub struct AgentBuilder {
    config: AgentConfig,
    llm: Arc<dyn LLM>,
    tools: Vec<Tool>,
    long_term_memory: Option<Arc<dyn LongTermMemory>>,
    stopping_condition: Option<StoppingCondition>,
    evaluator: Option<EvaluatorFn>,
    human_input: Option<Arc<dyn HumanInputProvider>>,
    context: RunContext,
}

impl AgentBuilder {
    pub fn new(llm: Arc<dyn LLM>) -> Self {
        Self {
            config: AgentConfig::default(),
            llm,
            tools: Vec::new(),
            long_term_memory: None,
            stopping_condition: None,
            evaluator: None,
            human_input: None,
            context: RunContext::default(),
        }
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.config.description = description.into();
        self
    }

    pub fn user_name(mut self, user_name: impl Into<String>) -> Self {
        self.config.user_name = user_name.into();
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn max_loops(mut self, max_loops: u32) -> Self {
        self.config.max_loops = MaxLoops::Finite(max_loops);
        self
    }

    /// Loop until a stop condition fires instead of counting iterations.
    pub fn auto_loops(mut self) -> Self {
        self.config.max_loops = MaxLoops::Auto;
        self
    }

    pub fn dynamic_loops(mut self) -> Self {
        self.config.dynamic_loops = true;
        self
    }

    pub fn loop_interval_secs(mut self, secs: u64) -> Self {
        self.config.loop_interval_secs = secs;
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.config.top_p = Some(top_p);
        self
    }

    pub fn top_k(mut self, top_k: u32) -> Self {
        self.config.top_k = Some(top_k);
        self
    }

    pub fn dynamic_temperature(mut self) -> Self {
        self.config.dynamic_temperature = true;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u64) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    pub fn context_length(mut self, context_length: u64) -> Self {
        self.config.context_length = context_length;
        self
    }

    pub fn retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.config.retry_attempts = retry_attempts;
        self
    }

    pub fn retry_interval_secs(mut self, secs: u64) -> Self {
        self.config.retry_interval_secs = secs;
        self
    }

    pub fn stopping_token(mut self, token: impl Into<String>) -> Self {
        self.config.stopping_token = Some(token.into());
        self
    }

    pub fn stopping_condition(mut self, condition: StoppingCondition) -> Self {
        self.stopping_condition = Some(condition);
        self
    }

    pub fn stop_when_repeats(mut self) -> Self {
        self.config.stop_when_repeats = true;
        self
    }

    pub fn interactive(mut self, provider: Arc<dyn HumanInputProvider>) -> Self {
        self.config.interactive = true;
        self.human_input = Some(provider);
        self
    }

    pub fn custom_exit_command(mut self, command: impl Into<String>) -> Self {
        self.config.custom_exit_command = command.into();
        self
    }

    pub fn evaluator(mut self, evaluator: EvaluatorFn) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn auto_generate_prompt(mut self) -> Self {
        self.config.auto_generate_prompt = true;
        self
    }

    pub fn output_type(mut self, output_type: OutputType) -> Self {
        self.config.output_type = output_type;
        self
    }

    pub fn autosave(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config.autosave = true;
        self.config.save_state_path = Some(path.into());
        self
    }

    pub fn add_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn long_term_memory(mut self, memory: Arc<dyn LongTermMemory>) -> Self {
        self.long_term_memory = Some(memory);
        self
    }

    pub fn run_context(mut self, context: RunContext) -> Self {
        self.context = context;
        self
    }

    /// Validate the configuration and assemble the agent.
    pub fn build(self) -> Result<Agent, AgentError> {
        self.config.validate()?;

        let registry = ToolRegistry::from_tools(self.tools)?;

        let mut short_memory = Conversation::new(self.config.name.clone());
        if let Some(prompt) = &self.config.system_prompt {
            short_memory.add(Role::System, prompt.clone());
        }
        if !registry.is_empty() {
            short_memory.add(Role::System, registry.schema_message());
        }

        let human_input = match (self.config.interactive, self.human_input) {
            (_, Some(provider)) => Some(provider),
            (true, None) => Some(Arc::new(TerminalInput) as Arc<dyn HumanInputProvider>),
            (false, None) => None,
        };

        Ok(Agent {
            config: self.config,
            llm: self.llm,
            short_memory,
            long_term_memory: self.long_term_memory,
            tools: registry,
            stopping_condition: self.stopping_condition,
            evaluator: self.evaluator,
            human_input,
            context: self.context,
        })
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// A stateful executor wrapping one LLM.
pub struct Agent {
    config: AgentConfig,
    llm: Arc<dyn LLM>,
    short_memory: Conversation,
    long_term_memory: Option<Arc<dyn LongTermMemory>>,
    tools: ToolRegistry,
    stopping_condition: Option<StoppingCondition>,
    evaluator: Option<EvaluatorFn>,
    human_input: Option<Arc<dyn HumanInputProvider>>,
    context: RunContext,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.config.id)
            .field("name", &self.config.name)
            .field("model", &self.llm.model())
            .field("max_loops", &self.config.max_loops)
            .field("tools", &self.tools.len())
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn builder(llm: Arc<dyn LLM>) -> AgentBuilder {
        AgentBuilder::new(llm)
    }

    pub fn id(&self) -> Uuid {
        self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn description(&self) -> &str {
        &self.config.description
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn short_memory(&self) -> &Conversation {
        &self.short_memory
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.config.system_prompt.as_deref()
    }

    // ---- Cross-cutting policy hooks (applied by the router) ----

    /// Attach (or replace) the long-term memory collaborator.
    pub fn set_long_term_memory(&mut self, memory: Arc<dyn LongTermMemory>) {
        self.long_term_memory = Some(memory);
    }

    /// Append shared swarm rules to the system prompt.
    pub fn append_rules(&mut self, rules: &str) {
        let combined = match &self.config.system_prompt {
            Some(existing) => format!("{}\n\n### Swarm Rules ###\n{}", existing, rules),
            None => format!("### Swarm Rules ###\n{}", rules),
        };
        self.short_memory.set_system(combined.clone());
        self.config.system_prompt = Some(combined);
    }

    /// Enable system-prompt synthesis on the next run.
    pub fn enable_auto_generate_prompt(&mut self) {
        self.config.auto_generate_prompt = true;
    }

    // ---- Run entry points ----

    /// Run the agent on `task` and shape the result per the configured
    /// output type.
    pub async fn run(&mut self, task: impl Into<String>) -> Result<RunOutput, AgentError> {
        let task = task.into();
        log::debug!("agent {:?} starting task: {}", self.config.name, task);

        if self.config.auto_generate_prompt {
            self.generate_system_prompt(&task).await?;
        }

        self.short_memory
            .add(Role::User(self.config.user_name.clone()), task.clone());

        if let Some(memory) = &self.long_term_memory {
            match memory.query(&task).await {
                Ok(docs) if !docs.is_empty() => self.short_memory.add(Role::Database, docs),
                Ok(_) => {}
                Err(e) => log::warn!(
                    "agent {:?}: long-term memory query failed: {}",
                    self.config.name,
                    e
                ),
            }
        }

        let mut loop_outputs: Vec<String> = Vec::new();
        let mut loops_completed: u32 = 0;
        let max_loops = self.config.effective_max_loops();

        loop {
            if let MaxLoops::Finite(n) = max_loops {
                if loops_completed >= n {
                    break;
                }
            }

            let options = self.completion_options();
            let output = match self.invoke_llm_with_retry(&task, &options).await {
                Ok(output) => output,
                Err(e) => {
                    if self.config.autosave {
                        self.try_autosave().await;
                    }
                    return Err(e);
                }
            };

            self.short_memory
                .add(Role::Assistant(self.config.name.clone()), output.clone());
            loop_outputs.push(output.clone());
            loops_completed += 1;

            if !self.tools.is_empty() {
                match parse_tool_calls(&output) {
                    Ok(Some(calls)) => {
                        let result = execute_tool_calls(&self.tools, &calls);
                        self.short_memory.add(Role::ToolExecutor, result.to_string());
                    }
                    Ok(None) => {}
                    Err(e) => {
                        self.short_memory
                            .add(Role::ToolExecutor, format!("Error: {}", e));
                    }
                }
            }

            if let Some(evaluator) = &self.evaluator {
                let commentary = evaluator(&output);
                self.short_memory.add(Role::Evaluator, commentary);
            }

            if self.should_stop(&output) {
                log::debug!(
                    "agent {:?} stop condition met after loop {}",
                    self.config.name,
                    loops_completed
                );
                break;
            }

            if self.config.interactive {
                match self.solicit_interactive_input() {
                    Some(line) => self
                        .short_memory
                        .add(Role::User(self.config.user_name.clone()), line),
                    None => break,
                }
            }

            if self.config.loop_interval_secs > 0 {
                tokio::time::sleep(Duration::from_secs(self.config.loop_interval_secs)).await;
            }
        }

        let envelope = AgentOutputEnvelope {
            agent_id: self.config.id,
            agent_name: self.config.name.clone(),
            task,
            loop_outputs,
            loops_completed,
            timestamp: self.context.now(),
        };
        let shaped = shape_agent_output(self.config.output_type, &envelope)?;

        // An unwritable snapshot path is fatal when autosave was requested;
        // the mid-failure autosave above stays best-effort because the LLM
        // error takes precedence.
        if self.config.autosave {
            self.save_state().await?;
        }

        Ok(shaped)
    }

    /// Run and render the shaped result as a string, the form swarm
    /// executors chain between stages.
    pub async fn run_to_string(&mut self, task: impl Into<String>) -> Result<String, AgentError> {
        Ok(self.run(task).await?.to_string())
    }

    /// Poll until `when`, then run.
    pub async fn run_at(
        &mut self,
        task: impl Into<String>,
        when: DateTime<Local>,
    ) -> Result<RunOutput, AgentError> {
        let task = task.into();
        while self.context.now() < when {
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        self.run(task).await
    }

    /// Final autosave and collaborator release.
    pub async fn cleanup(&mut self) -> Result<(), AgentError> {
        if self.config.autosave {
            self.save_state().await?;
        }
        self.long_term_memory = None;
        Ok(())
    }

    // ---- Persistence ----

    /// Snapshot the safely serializable state to the configured (or
    /// workspace-derived) path.
    pub async fn save_state(&self) -> Result<(), AgentError> {
        let path = self.state_path();
        let state = AgentState::capture(self);
        state.save(&path).await?;
        Ok(())
    }

    /// Rebuild an agent from a snapshot, re-attaching the live LLM binding.
    /// Other collaborators (memory, tools, callbacks) are re-attached by the
    /// caller.
    pub fn from_state(state: AgentState, llm: Arc<dyn LLM>) -> Result<Self, AgentError> {
        state.config.validate()?;
        let short_memory = Conversation::restore(state.config.name.clone(), state.conversation);
        Ok(Self {
            config: state.config,
            llm,
            short_memory,
            long_term_memory: None,
            tools: ToolRegistry::new(),
            stopping_condition: None,
            evaluator: None,
            human_input: None,
            context: RunContext::default(),
        })
    }

    fn state_path(&self) -> std::path::PathBuf {
        self.config.save_state_path.clone().unwrap_or_else(|| {
            self.context
                .workspace_path(format!("{}_state.json", self.config.name))
        })
    }

    async fn try_autosave(&self) {
        if let Err(e) = self.save_state().await {
            log::warn!("agent {:?} autosave failed: {}", self.config.name, e);
        }
    }

    // ---- Loop internals ----

    fn completion_options(&self) -> CompletionOptions {
        let temperature = if self.config.dynamic_temperature {
            random_unit()
        } else {
            self.config.temperature
        };
        CompletionOptions {
            temperature: Some(temperature),
            top_p: self.config.top_p,
            top_k: self.config.top_k,
            max_tokens: Some(self.config.max_tokens),
            frequency_penalty: self.config.frequency_penalty,
            presence_penalty: self.config.presence_penalty,
            stream: false,
        }
    }

    /// One retried LLM invocation over the rendered conversation.
    async fn invoke_llm_with_retry(
        &self,
        task: &str,
        options: &CompletionOptions,
    ) -> Result<String, AgentError> {
        let prompt = self.short_memory.render();
        let messages = vec![ChatMessage::user(prompt)];
        let llm = Arc::clone(&self.llm);
        let attempts = self.config.retry_attempts;
        let base = Duration::from_secs(self.config.retry_interval_secs);

        let raw = retry_with_backoff(attempts, base, |_| {
            let llm = Arc::clone(&llm);
            let messages = messages.clone();
            let options = options.clone();
            async move { llm.complete(&messages, &options).await }
        })
        .await
        .map_err(|source| AgentError::LlmExhausted {
            agent: self.config.name.clone(),
            task: task.to_string(),
            attempts: attempts.max(1),
            source,
        })?;

        Ok(parse_completion(&raw))
    }

    fn should_stop(&self, output: &str) -> bool {
        if let Some(token) = &self.config.stopping_token {
            if output.contains(token.as_str()) {
                return true;
            }
        }
        if let Some(condition) = &self.stopping_condition {
            if condition(output) {
                return true;
            }
        }
        if output.contains(DONE_TOKEN) {
            return true;
        }
        if self.config.stop_when_repeats && output.to_lowercase().contains("stop") {
            return true;
        }
        false
    }

    /// Returns the human's line, or `None` on the exit command or a closed
    /// channel.
    fn solicit_interactive_input(&self) -> Option<String> {
        let provider = self.human_input.as_ref()?;
        match provider.request_input("Reply to the agent, or type the exit command to finish") {
            Ok(line) if line.trim() == self.config.custom_exit_command => None,
            Ok(line) => Some(line),
            Err(e) => {
                log::debug!("interactive input ended: {}", e);
                None
            }
        }
    }

    /// Ask the LLM to synthesize a system prompt for the current task.
    async fn generate_system_prompt(&mut self, task: &str) -> Result<(), AgentError> {
        let seed = if self.config.system_prompt.is_some() || !self.config.description.is_empty() {
            format!(
                "{} ({})\n{}",
                self.config.name,
                self.config.description,
                self.config.system_prompt.as_deref().unwrap_or_default()
            )
        } else {
            task.to_string()
        };

        let request = format!(
            "Write a concise, directive system prompt for an AI agent responsible for:\n{}",
            seed
        );
        let options = self.completion_options();
        let messages = vec![ChatMessage::user(request)];
        let llm = Arc::clone(&self.llm);
        let base = Duration::from_secs(self.config.retry_interval_secs);

        let raw = retry_with_backoff(self.config.retry_attempts, base, |_| {
            let llm = Arc::clone(&llm);
            let messages = messages.clone();
            let options = options.clone();
            async move { llm.complete(&messages, &options).await }
        })
        .await
        .map_err(|source| AgentError::LlmExhausted {
            agent: self.config.name.clone(),
            task: task.to_string(),
            attempts: self.config.retry_attempts.max(1),
            source,
        })?;

        let generated = parse_completion(&raw);
        self.short_memory.set_system(generated.clone());
        self.config.system_prompt = Some(generated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::human::CallbackInput;
    use crate::llm::mock::{last_turn_content, MockLLM};
    use crate::memory::long_term::test_support::StubMemory;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn echo_agent(name: &str, llm: Arc<MockLLM>) -> Agent {
        Agent::builder(llm)
            .name(name)
            .retry_interval_secs(0)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_single_loop_calls_llm_exactly_once() {
        let llm = Arc::new(MockLLM::scripted(vec!["answer".to_string()]));
        let mut agent = echo_agent("Solo", Arc::clone(&llm));

        let output = agent.run("question").await.unwrap();
        assert_eq!(output.to_string(), "answer");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_auto_loops_stop_on_token_first_response() {
        let llm = Arc::new(MockLLM::scripted(vec!["all set STOP_HERE".to_string()]));
        let mut agent = Agent::builder(Arc::clone(&llm) as Arc<dyn LLM>)
            .name("AutoStop")
            .auto_loops()
            .stopping_token("STOP_HERE")
            .retry_interval_secs(0)
            .build()
            .unwrap();

        let output = agent.run("go").await.unwrap();
        assert_eq!(llm.calls(), 1);
        assert!(output.to_string().contains("all set"));
    }

    #[tokio::test]
    async fn test_done_token_is_honored_by_convention() {
        let llm = Arc::new(MockLLM::scripted(vec![
            "keep going".to_string(),
            format!("finished {}", DONE_TOKEN),
            "never reached".to_string(),
        ]));
        let mut agent = Agent::builder(Arc::clone(&llm) as Arc<dyn LLM>)
            .name("Doner")
            .auto_loops()
            .retry_interval_secs(0)
            .build()
            .unwrap();

        agent.run("go").await.unwrap();
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_counts_calls_and_appends_no_agent_turn() {
        let llm = Arc::new(MockLLM::failing("provider down"));
        let mut agent = Agent::builder(Arc::clone(&llm) as Arc<dyn LLM>)
            .name("Fragile")
            .retry_attempts(3)
            .retry_interval_secs(0)
            .build()
            .unwrap();

        let err = agent.run("task").await.unwrap_err();
        assert_eq!(llm.calls(), 3);
        match err {
            AgentError::LlmExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {:?}", other),
        }
        // Only the user turn made it into memory.
        let last = agent.short_memory().last().unwrap();
        assert_eq!(last.role, Role::User(DEFAULT_TEST_USER.to_string()));
    }

    const DEFAULT_TEST_USER: &str = "Human";

    #[tokio::test]
    async fn test_each_loop_appends_one_agent_turn() {
        let llm = Arc::new(MockLLM::scripted(vec!["a".to_string(), "b".to_string()]));
        let mut agent = Agent::builder(llm)
            .name("Grower")
            .max_loops(2)
            .retry_interval_secs(0)
            .build()
            .unwrap();

        agent.run("t").await.unwrap();
        let agent_turns = agent
            .short_memory()
            .turns()
            .iter()
            .filter(|t| t.role == Role::Assistant("Grower".to_string()))
            .count();
        assert_eq!(agent_turns, 2);
        // No tools configured, so no Tool Executor turns at all.
        assert!(!agent
            .short_memory()
            .turns()
            .iter()
            .any(|t| t.role == Role::ToolExecutor));
    }

    #[tokio::test]
    async fn test_tool_call_appends_tool_executor_turn() {
        let llm = Arc::new(MockLLM::scripted(vec![
            r#"{"name": "double", "parameters": {"n": 21}}"#.to_string(),
            format!("done {}", DONE_TOKEN),
        ]));
        let double = Tool::new(
            "double",
            "Double an integer",
            json!({"type": "object", "properties": {"n": {"type": "integer"}}}),
            Arc::new(|params: &serde_json::Value| {
                Ok(json!(params["n"].as_i64().unwrap_or(0) * 2))
            }),
        )
        .unwrap();

        let mut agent = Agent::builder(llm)
            .name("Doubler")
            .max_loops(2)
            .add_tool(double)
            .retry_interval_secs(0)
            .build()
            .unwrap();

        agent.run("double 21").await.unwrap();

        let tool_turns: Vec<_> = agent
            .short_memory()
            .turns()
            .iter()
            .filter(|t| t.role == Role::ToolExecutor)
            .collect();
        assert_eq!(tool_turns.len(), 1);
        assert!(tool_turns[0].content.contains("42"));
    }

    #[tokio::test]
    async fn test_long_term_memory_injected_under_database_role() {
        let llm = Arc::new(MockLLM::scripted(vec!["ok".to_string()]));
        let memory = Arc::new(StubMemory::new("relevant past context"));
        let mut agent = Agent::builder(llm)
            .name("Recall")
            .long_term_memory(Arc::clone(&memory) as Arc<dyn LongTermMemory>)
            .retry_interval_secs(0)
            .build()
            .unwrap();

        agent.run("what happened before?").await.unwrap();
        assert_eq!(memory.queries.load(Ordering::SeqCst), 1);
        assert!(agent
            .short_memory()
            .turns()
            .iter()
            .any(|t| t.role == Role::Database && t.content == "relevant past context"));
    }

    #[tokio::test]
    async fn test_evaluator_turn_appended_once_per_loop() {
        let llm = Arc::new(MockLLM::scripted(vec!["draft".to_string()]));
        let mut agent = Agent::builder(llm)
            .name("Drafter")
            .evaluator(Arc::new(|output: &str| format!("score for {:?}: 7/10", output)))
            .retry_interval_secs(0)
            .build()
            .unwrap();

        agent.run("write").await.unwrap();
        let evaluator_turns = agent
            .short_memory()
            .turns()
            .iter()
            .filter(|t| t.role == Role::Evaluator)
            .count();
        assert_eq!(evaluator_turns, 1);
    }

    #[tokio::test]
    async fn test_interactive_exit_command_returns_accumulated_output() {
        let llm = Arc::new(MockLLM::scripted(vec!["first".to_string(), "second".to_string()]));
        let provider = Arc::new(CallbackInput::new(|_| "exit".to_string()));
        let mut agent = Agent::builder(Arc::clone(&llm) as Arc<dyn LLM>)
            .name("Chatty")
            .auto_loops()
            .interactive(provider)
            .retry_interval_secs(0)
            .build()
            .unwrap();

        let output = agent.run("talk").await.unwrap();
        assert_eq!(output.to_string(), "first");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_interactive_reply_feeds_next_loop() {
        let llm = Arc::new(MockLLM::scripted(vec!["first".to_string(), "second".to_string()]));
        let replies = std::sync::Mutex::new(vec!["keep going".to_string(), "exit".to_string()]);
        let provider = Arc::new(CallbackInput::new(move |_| {
            replies.lock().unwrap().remove(0)
        }));
        let mut agent = Agent::builder(Arc::clone(&llm) as Arc<dyn LLM>)
            .name("Chatty")
            .auto_loops()
            .interactive(provider)
            .retry_interval_secs(0)
            .build()
            .unwrap();

        let output = agent.run("talk").await.unwrap();
        assert_eq!(output.to_string(), "first\nsecond");
        assert_eq!(llm.calls(), 2);
        assert!(agent
            .short_memory()
            .turns()
            .iter()
            .any(|t| t.content == "keep going"));
    }

    #[tokio::test]
    async fn test_list_output_joined_equals_string_output() {
        let responses = vec!["x".to_string(), "y".to_string()];

        let llm = Arc::new(MockLLM::scripted(responses.clone()));
        let mut as_string = Agent::builder(llm)
            .name("S")
            .max_loops(2)
            .output_type(OutputType::Text)
            .retry_interval_secs(0)
            .build()
            .unwrap();

        let llm = Arc::new(MockLLM::scripted(responses));
        let mut as_list = Agent::builder(llm)
            .name("S")
            .max_loops(2)
            .output_type(OutputType::List)
            .retry_interval_secs(0)
            .build()
            .unwrap();

        let string_out = as_string.run("t").await.unwrap().to_string();
        let list_out = as_list.run("t").await.unwrap();
        match &list_out {
            RunOutput::List(items) => assert_eq!(items.join("\n"), string_out),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_prompt_contains_full_rendered_history() {
        let llm = Arc::new(MockLLM::with_transform(|messages| {
            format!("saw: {}", last_turn_content(messages))
        }));
        let mut agent = Agent::builder(llm)
            .name("Mirror")
            .system_prompt("reflect the user")
            .retry_interval_secs(0)
            .build()
            .unwrap();

        let output = agent.run("hello there").await.unwrap();
        assert_eq!(output.to_string(), "saw: hello there");
    }

    #[tokio::test]
    async fn test_auto_generate_prompt_synthesizes_system_turn() {
        let llm = Arc::new(MockLLM::scripted(vec![
            "You are a careful researcher.".to_string(),
            "report".to_string(),
        ]));
        let mut agent = Agent::builder(Arc::clone(&llm) as Arc<dyn LLM>)
            .name("Researcher")
            .auto_generate_prompt()
            .retry_interval_secs(0)
            .build()
            .unwrap();

        agent.run("investigate").await.unwrap();
        assert_eq!(llm.calls(), 2);
        assert_eq!(
            agent.system_prompt(),
            Some("You are a careful researcher.")
        );
        assert_eq!(
            agent.short_memory().turns()[0].content,
            "You are a careful researcher."
        );
    }

    #[tokio::test]
    async fn test_builder_rejects_zero_limits() {
        let llm: Arc<dyn LLM> = Arc::new(MockLLM::scripted(vec!["x".to_string()]));
        let err = Agent::builder(Arc::clone(&llm))
            .name("Bad")
            .max_tokens(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));

        let err = Agent::builder(llm).name("Bad").max_loops(0).build().unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[tokio::test]
    async fn test_append_rules_extends_system_prompt() {
        let llm = Arc::new(MockLLM::scripted(vec!["ok".to_string()]));
        let mut agent = Agent::builder(llm)
            .name("Ruled")
            .system_prompt("base prompt")
            .retry_interval_secs(0)
            .build()
            .unwrap();

        agent.append_rules("never guess");
        let prompt = agent.system_prompt().unwrap();
        assert!(prompt.starts_with("base prompt"));
        assert!(prompt.contains("### Swarm Rules ###"));
        assert!(prompt.contains("never guess"));
    }
}
