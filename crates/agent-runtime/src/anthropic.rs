//! Anthropic LLM Provider
//!
//! Messages API client. System prompts travel separately, tool requests are
//! `tool_use` blocks and tool replies are user `tool_result` blocks.

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{
        ChatResponse, Completion, FinishReason, GenerationOptions, LlmProvider, ModelInfo,
        ProviderKind, TokenUsage,
    },
    tool::{ToolCall, ToolSchema},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::{build_client, send_json};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic provider configuration
#[derive(Clone, Debug)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: ANTHROPIC_BASE_URL.into(),
            model: model.into(),
            timeout_secs: 120,
        }
    }
}

// ----------------------------------------------------------------------------
// Wire types
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDefinition>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<InputBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Debug, Serialize)]
struct ToolDefinition {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
}

/// Anthropic LLM provider
pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AgentError::Config("anthropic API key not set".into()));
        }

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            config,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }

    /// Split out the system prompt and fold the rest into alternating turns
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<WireMessage>) {
        let mut system_parts = Vec::new();
        let mut wire: Vec<WireMessage> = Vec::new();

        for m in messages {
            let (role, blocks) = match (m.role, &m.tool_call_id) {
                (Role::System, _) => {
                    system_parts.push(m.content.clone());
                    continue;
                }
                (_, Some(tool_use_id)) => (
                    "user",
                    vec![InputBlock::ToolResult {
                        tool_use_id: tool_use_id.clone(),
                        content: m.content.clone(),
                    }],
                ),
                (Role::Assistant, None) => {
                    let mut blocks = Vec::new();
                    if !m.content.is_empty() {
                        blocks.push(InputBlock::Text { text: m.content.clone() });
                    }
                    blocks.extend(m.tool_calls.iter().map(|call| InputBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments_json(),
                    }));
                    ("assistant", blocks)
                }
                (Role::User | Role::Tool, None) => ("user", vec![InputBlock::Text { text: m.content.clone() }]),
            };

            if blocks.is_empty() {
                continue;
            }

            match wire.last_mut() {
                Some(last) if last.role == role => last.content.extend(blocks),
                _ => wire.push(WireMessage { role, content: blocks }),
            }
        }

        let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
        (system, wire)
    }

    fn convert_tools(tools: &[ToolSchema]) -> Vec<ToolDefinition> {
        tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.to_json_schema(),
            })
            .collect()
    }

    fn convert_completion(body: MessagesResponse, model: &str) -> Completion {
        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();

        for block in body.content {
            match block {
                ResponseBlock::Text { text } => text_parts.push(text),
                ResponseBlock::ToolUse { id, name, input } => {
                    let arguments = match input {
                        Value::Object(map) => map.into_iter().collect(),
                        _ => std::collections::HashMap::new(),
                    };
                    tool_calls.push(ToolCall { id, name, arguments });
                }
                ResponseBlock::Unsupported => {}
            }
        }

        let content = text_parts.join("\n");
        let response = if tool_calls.is_empty() {
            ChatResponse::Text(content)
        } else {
            ChatResponse::ToolCalls { content, tool_calls }
        };

        Completion {
            response,
            model: body.model.unwrap_or_else(|| model.to_owned()),
            usage: body.usage.map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens.saturating_add(u.output_tokens),
            }),
            finish_reason: body.stop_reason.as_deref().map(|reason| match reason {
                "end_turn" | "stop_sequence" => FinishReason::Stop,
                "max_tokens" => FinishReason::Length,
                "tool_use" => FinishReason::ToolUse,
                _ => FinishReason::Error,
            }),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    async fn health_check(&self) -> Result<bool> {
        match self.list_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Anthropic health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<Completion> {
        let model = self.model_for(options);
        let (system, messages) = Self::convert_messages(messages);
        let request = MessagesRequest {
            model,
            max_tokens: options.max_tokens,
            system,
            messages,
            temperature: options.temperature,
            top_p: options.top_p,
            stop_sequences: options.stop_sequences.clone(),
            tools: Self::convert_tools(tools),
        };
        tracing::debug!(model, tools = request.tools.len(), "Sending Anthropic request");

        let body: MessagesResponse = send_json(
            "anthropic",
            self.authorized(self.client.post(self.endpoint("messages")))
                .json(&request),
        )
        .await?;

        Ok(Self::convert_completion(body, model))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let list: ModelList = send_json("anthropic", self.authorized(self.client.get(self.endpoint("models")))).await?;

        Ok(list
            .data
            .into_iter()
            .map(|m| ModelInfo {
                name: m.display_name.unwrap_or_else(|| m.id.clone()),
                id: m.id,
                context_length: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_prompt_is_lifted() {
        let (system, wire) = AnthropicProvider::convert_messages(&[
            Message::system("Be brief."),
            Message::user("Hello"),
        ]);

        assert_eq!(system.as_deref(), Some("Be brief."));
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, "user");
    }

    #[test]
    fn test_tool_exchange_blocks() {
        let call = ToolCall::new("tavily_search").with_id("toolu_1").arg("query", "rust");
        let (_, wire) = AnthropicProvider::convert_messages(&[
            Message::user("search rust"),
            Message::assistant("").with_tool_calls(vec![call]),
            Message::user("{\"results\":[]}").with_tool_call_id("toolu_1"),
        ]);

        let wire = serde_json::to_value(&wire).unwrap();
        assert_eq!(wire[1]["content"][0]["type"], "tool_use");
        assert_eq!(wire[1]["content"][0]["input"]["query"], "rust");
        assert_eq!(wire[2]["role"], "user");
        assert_eq!(wire[2]["content"][0]["type"], "tool_result");
        assert_eq!(wire[2]["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn test_consecutive_tool_results_share_a_turn() {
        let (_, wire) = AnthropicProvider::convert_messages(&[
            Message::user("a").with_tool_call_id("t1"),
            Message::user("b").with_tool_call_id("t2"),
        ]);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].content.len(), 2);
    }

    #[test]
    fn test_response_blocks() {
        let body: MessagesResponse = serde_json::from_value(json!({
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_2", "name": "get_current_datetime", "input": {"timezone": "UTC"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }))
        .unwrap();

        let completion = AnthropicProvider::convert_completion(body, "fallback");
        assert_eq!(completion.response.text(), "Let me check.");
        let ChatResponse::ToolCalls { tool_calls, .. } = completion.response else {
            panic!("expected tool calls");
        };
        assert_eq!(tool_calls[0].str_arg("timezone"), Some("UTC"));
        assert_eq!(completion.usage.map(|u| u.total_tokens), Some(15));
    }
}
