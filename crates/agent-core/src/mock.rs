//! Scripted provider
//!
//! Deterministic [`LlmProvider`] that replays queued responses in order.
//! For testing and demo purposes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{ChatResponse, Completion, GenerationOptions, LlmProvider, ModelInfo, ProviderKind};
use crate::tool::{ToolCall, ToolSchema};

const MOCK_MODEL: &str = "scripted";

/// A request the provider received
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    /// Names of the offered tools
    pub tools: Vec<String>,
    pub options: GenerationOptions,
}

/// Provider that answers from a queue
pub struct ScriptedProvider {
    kind: ProviderKind,
    script: Mutex<VecDeque<Result<ChatResponse>>>,
    fallback: Option<ChatResponse>,
    calls: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Report a different provider kind (changes tool framing)
    #[must_use]
    pub const fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    /// Answer with `text` whenever the script runs dry
    #[must_use]
    pub fn with_fallback_text(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(ChatResponse::Text(text.into()));
        self
    }

    pub fn push_text(&self, text: impl Into<String>) {
        lock(&self.script).push_back(Ok(ChatResponse::Text(text.into())));
    }

    pub fn push_tool_calls(&self, tool_calls: Vec<ToolCall>) {
        lock(&self.script).push_back(Ok(ChatResponse::ToolCalls {
            content: String::new(),
            tool_calls,
        }));
    }

    pub fn push_error(&self, error: AgentError) {
        lock(&self.script).push_back(Err(error));
    }

    /// Number of `chat` calls so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn default_model(&self) -> &str {
        MOCK_MODEL
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(RecordedRequest {
            messages: messages.to_vec(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
            options: options.clone(),
        });

        let next = lock(&self.script).pop_front();
        let response = match next {
            Some(scripted) => scripted?,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| AgentError::Provider("Script exhausted".into()))?,
        };

        let model = self.model_for(options).to_owned();
        Ok(match response {
            ChatResponse::Text(text) => Completion::text(model, text),
            ChatResponse::ToolCalls { content, tool_calls } => Completion::tool_calls(model, content, tool_calls),
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: MOCK_MODEL.into(),
            name: "Scripted".into(),
            context_length: None,
        }])
    }
}
