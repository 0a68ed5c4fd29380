//! Tool exchange framing
//!
//! Backends disagree on how "assistant asked for a tool" and "tool replied"
//! are recorded in a conversation. The loop records exchanges through a
//! [`TranscriptAdapter`] picked once from the provider kind.

use crate::message::Message;
use crate::provider::ProviderKind;
use crate::tool::ToolCall;

/// Builds the history entries for one tool exchange
pub trait TranscriptAdapter: Send + Sync {
    /// Message recording the assistant's tool request
    fn tool_request(&self, content: &str, calls: &[ToolCall]) -> Message {
        Message::assistant(content).with_tool_calls(calls.to_vec())
    }

    /// Message carrying one tool's output back to the model
    fn tool_reply(&self, call: &ToolCall, output: String) -> Message;
}

/// Chat-completions framing: replies use the `tool` role
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenAiTranscript;

impl TranscriptAdapter for OpenAiTranscript {
    fn tool_reply(&self, call: &ToolCall, output: String) -> Message {
        Message::tool(output, call.id.clone())
    }
}

/// Messages API framing: replies are user turns carrying a tool result
#[derive(Clone, Copy, Debug, Default)]
pub struct AnthropicTranscript;

impl TranscriptAdapter for AnthropicTranscript {
    fn tool_reply(&self, call: &ToolCall, output: String) -> Message {
        Message::user(output).with_tool_call_id(call.id.clone())
    }
}

/// Framing for a provider kind
pub fn transcript_for(kind: ProviderKind) -> &'static dyn TranscriptAdapter {
    match kind {
        ProviderKind::Anthropic => &AnthropicTranscript,
        ProviderKind::OpenAi | ProviderKind::OpenRouter | ProviderKind::Ollama => &OpenAiTranscript,
    }
}
