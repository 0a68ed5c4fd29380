//! Provider settings and construction.

use std::sync::Arc;

use agent_core::error::{AgentError, Result};
use agent_core::provider::{LlmProvider, ProviderKind};

use crate::anthropic::{AnthropicConfig, AnthropicProvider};
#[cfg(feature = "ollama")]
use crate::ollama::{OllamaConfig, OllamaProvider};
use crate::openai::{OpenAiConfig, OpenAiProvider};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Model used when neither the request nor the environment names one
pub const fn default_model_for(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => "gpt-4o",
        ProviderKind::Anthropic => "claude-sonnet-4-20250514",
        ProviderKind::OpenRouter => "anthropic/claude-sonnet-4-20250514",
        ProviderKind::Ollama => "llama3.2",
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Credentials and defaults for every supported backend
#[derive(Clone, Debug)]
pub struct ProviderSettings {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub openrouter_base_url: String,
    pub ollama_host: String,
    pub ollama_port: u16,
    pub default_provider: ProviderKind,
    pub default_model: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            anthropic_api_key: None,
            openrouter_api_key: None,
            openrouter_base_url: OPENROUTER_BASE_URL.into(),
            ollama_host: "http://localhost".into(),
            ollama_port: 11434,
            default_provider: ProviderKind::OpenAi,
            default_model: None,
        }
    }
}

impl ProviderSettings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let default_provider = env_opt("DEFAULT_PROVIDER")
            .map(|p| p.parse())
            .transpose()?
            .unwrap_or(defaults.default_provider);

        Ok(Self {
            openai_api_key: env_opt("OPENAI_API_KEY"),
            anthropic_api_key: env_opt("ANTHROPIC_API_KEY"),
            openrouter_api_key: env_opt("OPENROUTER_API_KEY"),
            openrouter_base_url: env_opt("OPENROUTER_BASE_URL").unwrap_or(defaults.openrouter_base_url),
            ollama_host: env_opt("OLLAMA_HOST").unwrap_or(defaults.ollama_host),
            ollama_port: env_opt("OLLAMA_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.ollama_port),
            default_provider,
            default_model: env_opt("DEFAULT_MODEL"),
        })
    }

    /// Whether credentials exist for `kind`
    pub const fn is_configured(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::OpenAi => self.openai_api_key.is_some(),
            ProviderKind::Anthropic => self.anthropic_api_key.is_some(),
            ProviderKind::OpenRouter => self.openrouter_api_key.is_some(),
            ProviderKind::Ollama => cfg!(feature = "ollama"),
        }
    }

    /// Explicit model, else the configured default for the default provider,
    /// else the built-in default for `kind`
    pub fn resolve_model(&self, kind: ProviderKind, model: Option<String>) -> String {
        model
            .or_else(|| {
                (kind == self.default_provider)
                    .then(|| self.default_model.clone())
                    .flatten()
            })
            .unwrap_or_else(|| default_model_for(kind).to_owned())
    }
}

fn require_key(key: Option<&String>, kind: ProviderKind) -> Result<String> {
    key.cloned().ok_or_else(|| {
        AgentError::Config(format!("No API key configured for {kind}"))
    })
}

/// Build a provider for `kind` (or the default provider)
pub fn build_provider(
    settings: &ProviderSettings,
    kind: Option<ProviderKind>,
    model: Option<String>,
) -> Result<Arc<dyn LlmProvider>> {
    let kind = kind.unwrap_or(settings.default_provider);
    let model = settings.resolve_model(kind, model);
    tracing::debug!(provider = %kind, model, "Building provider");

    let provider: Arc<dyn LlmProvider> = match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(OpenAiConfig::openai(
            require_key(settings.openai_api_key.as_ref(), kind)?,
            model,
        ))?),
        ProviderKind::OpenRouter => Arc::new(OpenAiProvider::new(OpenAiConfig::openrouter(
            require_key(settings.openrouter_api_key.as_ref(), kind)?,
            settings.openrouter_base_url.clone(),
            model,
        ))?),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(AnthropicConfig::new(
            require_key(settings.anthropic_api_key.as_ref(), kind)?,
            model,
        ))?),
        #[cfg(feature = "ollama")]
        ProviderKind::Ollama => Arc::new(OllamaProvider::from_config(
            OllamaConfig {
                host: settings.ollama_host.clone(),
                port: settings.ollama_port,
                ..OllamaConfig::default()
            }
            .with_model(model),
        )),
        #[cfg(not(feature = "ollama"))]
        ProviderKind::Ollama => {
            return Err(AgentError::Config("Built without Ollama support".into()));
        }
    };

    Ok(provider)
}
