//! OpenAI-compatible LLM Provider
//!
//! Chat-completions client used for OpenAI itself and for OpenRouter,
//! which speaks the same wire format behind a different base URL.

use std::collections::HashMap;

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

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// Which service this points at (OpenAI or OpenRouter)
    pub kind: ProviderKind,

    /// Bearer token
    pub api_key: String,

    /// API root, without the trailing `/chat/completions`
    pub base_url: String,

    /// Default model
    pub model: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.into(),
            model: model.into(),
            timeout_secs: 120,
        }
    }

    pub fn openrouter(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            kind: ProviderKind::OpenRouter,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            timeout_secs: 120,
        }
    }
}

// ----------------------------------------------------------------------------
// Wire types
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolDefinition,
}

#[derive(Debug, Serialize)]
struct WireToolDefinition {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

// ----------------------------------------------------------------------------
// Model quirks
// ----------------------------------------------------------------------------

const NEW_PARAMETER_MODELS: &[&str] = &[
    "o1", "o3", "o4", "gpt-4.1", "gpt-4-1", "gpt-4.5", "gpt-4-5", "gpt-5", "gpt5", "nano", "mini-preview",
];

const FIXED_TEMPERATURE_MODELS: &[&str] = &["o1", "o3", "gpt-5", "gpt5", "nano"];

/// Newer OpenAI models take `max_completion_tokens` instead of `max_tokens`
fn uses_completion_tokens(model: &str) -> bool {
    let model = model.to_lowercase();
    NEW_PARAMETER_MODELS.iter().any(|p| model.contains(p))
}

/// Some of those only accept the default temperature
fn has_fixed_temperature(model: &str) -> bool {
    let model = model.to_lowercase();
    FIXED_TEMPERATURE_MODELS.iter().any(|p| model.contains(p))
}

/// OpenAI-compatible LLM provider
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
    auth_header: String,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AgentError::Config(format!("{} API key not set", config.kind)));
        }

        Ok(Self {
            client: build_client(config.timeout_secs)?,
            auth_header: format!("Bearer {}", config.api_key),
            config,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| {
                let tool_calls: Vec<WireToolCall> = m
                    .tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        kind: function_type(),
                        function: WireFunction {
                            name: call.name.clone(),
                            arguments: call.arguments_json().to_string(),
                        },
                    })
                    .collect();

                let role = match m.role {
                    _ if m.tool_call_id.is_some() => "tool",
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::Tool => "tool",
                };

                let content = if tool_calls.is_empty() || !m.content.is_empty() {
                    Some(m.content.clone())
                } else {
                    None
                };

                WireMessage {
                    role,
                    content,
                    tool_call_id: m.tool_call_id.clone(),
                    tool_calls,
                }
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolSchema]) -> Vec<WireTool> {
        tools
            .iter()
            .map(|tool| WireTool {
                kind: "function",
                function: WireToolDefinition {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.to_json_schema(),
                },
            })
            .collect()
    }

    fn build_request<'a>(
        &self,
        model: &'a str,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> ChatRequest<'a> {
        let new_parameters = self.config.kind == ProviderKind::OpenAi && uses_completion_tokens(model);
        let tools = Self::convert_tools(tools);

        ChatRequest {
            model,
            messages: Self::convert_messages(messages),
            temperature: (!new_parameters || !has_fixed_temperature(model)).then_some(options.temperature),
            max_tokens: (!new_parameters).then_some(options.max_tokens),
            max_completion_tokens: new_parameters.then_some(options.max_tokens),
            top_p: options.top_p,
            stop: options.stop_sequences.clone(),
            tool_choice: (!tools.is_empty()).then_some("auto"),
            tools,
        }
    }

    fn parse_tool_calls(calls: Vec<WireToolCall>) -> Result<Vec<ToolCall>> {
        calls
            .into_iter()
            .map(|call| {
                let arguments: HashMap<String, Value> = if call.function.arguments.trim().is_empty() {
                    HashMap::new()
                } else {
                    serde_json::from_str(&call.function.arguments).map_err(|e| {
                        AgentError::Parse(format!(
                            "Tool call arguments were not valid JSON for {}: {e}",
                            call.function.name
                        ))
                    })?
                };

                Ok(ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments,
                })
            })
            .collect()
    }

    fn convert_completion(body: ChatResponseBody, model: &str) -> Result<Completion> {
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("No choices in response".into()))?;

        let content = choice.message.content.unwrap_or_default();
        let tool_calls = Self::parse_tool_calls(choice.message.tool_calls.unwrap_or_default())?;

        let response = if tool_calls.is_empty() {
            ChatResponse::Text(content)
        } else {
            ChatResponse::ToolCalls { content, tool_calls }
        };

        Ok(Completion {
            response,
            model: body.model.unwrap_or_else(|| model.to_owned()),
            usage: body.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason: choice.finish_reason.as_deref().map(|reason| match reason {
                "stop" => FinishReason::Stop,
                "length" => FinishReason::Length,
                "tool_calls" | "function_call" => FinishReason::ToolUse,
                "content_filter" => FinishReason::ContentFilter,
                _ => FinishReason::Error,
            }),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        self.config.kind
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    async fn health_check(&self) -> Result<bool> {
        match self.list_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(provider = %self.config.kind, "Health check failed: {}", e);
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
        let request = self.build_request(model, messages, tools, options);
        tracing::debug!(provider = %self.config.kind, model, tools = request.tools.len(), "Sending chat request");

        let body: ChatResponseBody = send_json(
            self.config.kind.as_str(),
            self.client
                .post(self.endpoint("chat/completions"))
                .header("Authorization", &self.auth_header)
                .json(&request),
        )
        .await?;

        Self::convert_completion(body, model)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let list: ModelList = send_json(
            self.config.kind.as_str(),
            self.client
                .get(self.endpoint("models"))
                .header("Authorization", &self.auth_header),
        )
        .await?;

        Ok(list
            .data
            .into_iter()
            .map(|m| ModelInfo {
                name: m.id.clone(),
                id: m.id,
                context_length: None,
            })
            .collect())
    }
}
