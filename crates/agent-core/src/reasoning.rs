//! Tool-Calling Loop
//!
//! Drives one model through bounded rounds of "answer or call tools".
//! Requested tools run one after another so each result is in the
//! history before the next model call. A plain-text reply ends the turn.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message};
use crate::progress::{ProgressSink, StepStatus};
use crate::provider::{ChatResponse, GenerationOptions, LlmProvider};
use crate::scrub::ToolTagScrubber;
use crate::tool::{Tool, ToolCall, ToolRegistry, ToolResult};
use crate::transcript::{TranscriptAdapter, transcript_for};
use crate::turn::ChatAgent;

/// Answer given when the iteration cap is hit
pub const MAX_ITERATIONS_MESSAGE: &str =
    "I apologize, but I was unable to complete the request after multiple attempts.";

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System prompt template
    pub system_prompt: String,

    /// Extra context appended to the system prompt (timezone and the like)
    pub user_context: Option<String>,

    /// Maximum model round-trips per turn
    pub max_iterations: usize,

    /// Generation options
    pub generation: GenerationOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            user_context: None,
            max_iterations: 10,
            generation: GenerationOptions::default(),
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. \
Call tools through the function calling mechanism when you need them and never describe tool calls in your answer. \
Be concise and accurate.";

/// The single-agent tool-calling loop
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
    transcript: &'static dyn TranscriptAdapter,
    scrubber: ToolTagScrubber,
    conversation: Conversation,
}

impl Agent {
    /// Create a new agent
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Result<Self> {
        let transcript = transcript_for(provider.kind());
        let scrubber = ToolTagScrubber::new(tools.names())?;

        Ok(Self {
            provider,
            tools,
            config,
            transcript,
            scrubber,
            conversation: Conversation::new(),
        })
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Result<Self> {
        Self::new(provider, tools, AgentConfig::default())
    }

    fn build_system_prompt(&self) -> String {
        match &self.config.user_context {
            Some(context) => format!("{}\n\n{context}", self.config.system_prompt),
            None => self.config.system_prompt.clone(),
        }
    }

    fn request_messages(&self, system: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.conversation.len() + 1);
        messages.push(Message::system(system));
        messages.extend(self.conversation.messages().iter().cloned());
        messages
    }

    /// Run one user turn to a final answer
    #[tracing::instrument(skip_all, fields(provider = %self.provider.kind()))]
    pub async fn run(&mut self, message: &str, progress: &ProgressSink) -> String {
        self.conversation.push(Message::user(message));

        let system = self.build_system_prompt();
        let schemas = self.tools.schemas();

        for iteration in 1..=self.config.max_iterations {
            progress.thinking(if iteration == 1 {
                "Analyzing your request..."
            } else {
                "Processing results..."
            });

            let completion = match self
                .provider
                .chat(&self.request_messages(&system), &schemas, &self.config.generation)
                .await
            {
                Ok(completion) => completion,
                Err(e) => {
                    tracing::warn!(error = %e, iteration, "Model call failed");
                    let answer = format!("I apologize, but I encountered an error: {}", e.user_message());
                    self.conversation.push(Message::assistant(&answer));
                    return answer;
                }
            };

            match completion.response {
                ChatResponse::ToolCalls { content, tool_calls } if !tool_calls.is_empty() => {
                    tracing::debug!(iteration, count = tool_calls.len(), "Model requested tools");
                    for call in &tool_calls {
                        progress.tool_call(&call.name, call.arguments_json());
                    }
                    self.conversation
                        .push(self.transcript.tool_request(&content, &tool_calls));

                    let total = tool_calls.len();
                    for (idx, call) in tool_calls.iter().enumerate() {
                        progress.progress(
                            "tool_execution",
                            StepStatus::InProgress,
                            format!("Executing {} ({}/{total})", call.name, idx + 1),
                            share(idx, total, 50),
                        );

                        let output = self.execute_tool(call, progress).await;

                        progress.progress(
                            "tool_execution",
                            StepStatus::InProgress,
                            format!("Completed {}", call.name),
                            share(idx + 1, total, 50),
                        );
                        self.conversation.push(self.transcript.tool_reply(call, output));
                    }

                    progress.progress("analyzing", StepStatus::InProgress, "Analyzing search results...", 60);
                }
                response => {
                    progress.progress("writing", StepStatus::InProgress, "Writing response...", 80);
                    let answer = self.scrubber.scrub(response.text());
                    progress.progress("formatting", StepStatus::InProgress, "Formatting with citations...", 95);

                    self.conversation.push(Message::assistant(&answer));
                    return answer;
                }
            }
        }

        tracing::warn!(
            error = %AgentError::MaxIterations(self.config.max_iterations),
            "Giving up on turn"
        );
        self.conversation.push(Message::assistant(MAX_ITERATIONS_MESSAGE));
        MAX_ITERATIONS_MESSAGE.to_owned()
    }

    /// Execute a tool call, rendering the outcome for the model
    async fn execute_tool(&self, call: &ToolCall, progress: &ProgressSink) -> String {
        if self.tools.get(&call.name).is_none() {
            return serde_json::json!({ "error": format!("Unknown tool: {}", call.name) }).to_string();
        }

        progress.tool_start(&call.name);
        let result = self
            .tools
            .execute_with_progress(call, progress)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::failure(e.to_string())
            });
        progress.tool_end(&call.name, result.success);

        result.render()
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Conversation so far
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }
}

/// `part / total` of `scale`, rounded down
fn share(part: usize, total: usize, scale: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    u8::try_from(part * scale / total).unwrap_or(u8::MAX)
}

#[async_trait]
impl ChatAgent for Agent {
    async fn run_turn(&mut self, message: &str, progress: &ProgressSink) -> String {
        self.run(message, progress).await
    }

    fn reset(&mut self) {
        self.conversation.clear();
    }

    fn history(&self) -> &[Message] {
        self.conversation.messages()
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: ToolRegistry::new(),
            config: AgentConfig::default(),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    #[must_use]
    pub fn shared_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.register_shared(tool);
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn user_context(mut self, context: impl Into<String>) -> Self {
        self.config.user_context = Some(context.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: Option<String>) -> Self {
        self.config.generation.model = model;
        self
    }

    #[must_use]
    pub const fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.generation.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub const fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        Agent::new(provider, Arc::new(self.tools), self.config)
    }
}
