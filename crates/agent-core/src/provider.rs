//! LLM Provider Strategy Pattern
//!
//! Defines a common interface for all LLM providers (OpenAI, Anthropic,
//! OpenRouter, Ollama) allowing the agents to work with any backend
//! without code changes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::{complete_text, GenerationOptions};
//!
//! let options = GenerationOptions::new(0.3, 1000);
//! let text = complete_text(provider.as_ref(), "Plan this...", &options).await?;
//! ```

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::tool::{ToolCall, ToolSchema};

/// Supported provider backends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    OpenRouter,
    Ollama,
}

impl ProviderKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::OpenRouter => "openrouter",
            Self::Ollama => "ollama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openrouter" => Ok(Self::OpenRouter),
            "ollama" => Ok(Self::Ollama),
            other => Err(AgentError::Config(format!("Unknown provider: {other}"))),
        }
    }
}

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model override; providers use their configured model when unset
    #[serde(default)]
    pub model: Option<String>,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    #[serde(default)]
    pub top_p: Option<f32>,

    /// Stop sequences
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_max_tokens() -> u32 {
    4096
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::new(default_temperature(), default_max_tokens())
    }
}

impl GenerationOptions {
    pub const fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            model: None,
            temperature,
            max_tokens,
            top_p: None,
            stop_sequences: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// What the model produced
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatResponse {
    /// Plain text answer
    Text(String),

    /// The model wants tools run before answering
    ToolCalls {
        content: String,
        tool_calls: Vec<ToolCall>,
    },
}

impl ChatResponse {
    /// Text content, whatever the variant
    pub fn text(&self) -> &str {
        match self {
            Self::Text(text) | Self::ToolCalls { content: text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) | Self::ToolCalls { content: text, .. } => text,
        }
    }
}

/// Response from an LLM completion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
    /// Text or tool calls
    pub response: ChatResponse,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

impl Completion {
    pub fn text(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            response: ChatResponse::Text(text.into()),
            model: model.into(),
            usage: None,
            finish_reason: Some(FinishReason::Stop),
        }
    }

    pub fn tool_calls(model: impl Into<String>, content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            response: ChatResponse::ToolCalls {
                content: content.into(),
                tool_calls,
            },
            model: model.into(),
            usage: None,
            finish_reason: Some(FinishReason::ToolUse),
        }
    }
}

/// Token usage statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    ContentFilter,
    Error,
}

/// Information about a model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub context_length: Option<u32>,
}

/// Strategy trait for LLM providers
///
/// Implement this trait to add support for new LLM backends.
/// The agents work exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Which backend this is
    fn kind(&self) -> ProviderKind;

    /// Model used when the options carry no override
    fn default_model(&self) -> &str;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Generate a completion, optionally offering tools
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<Completion>;

    /// List available models
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Resolve the model for one request
    fn model_for<'a>(&'a self, options: &'a GenerationOptions) -> &'a str {
        options.model.as_deref().unwrap_or_else(|| self.default_model())
    }
}

/// Single user prompt in, text out. Tool-call responses collapse to their text.
pub async fn complete_text(
    provider: &dyn LlmProvider,
    prompt: &str,
    options: &GenerationOptions,
) -> Result<String> {
    let completion = provider.chat(&[Message::user(prompt)], &[], options).await?;
    Ok(completion.response.into_text())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert!((opts.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens, 4096);
        assert!(opts.model.is_none());
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("claude".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert!(matches!("bard".parse::<ProviderKind>(), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_tool_call_response_text() {
        let response = ChatResponse::ToolCalls {
            content: "let me check".into(),
            tool_calls: vec![ToolCall::new("get_current_datetime")],
        };
        assert_eq!(response.text(), "let me check");
    }
}
