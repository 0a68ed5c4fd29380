//! # agent-runtime
//!
//! Runtime providers for the research agents.
//!
//! ## Providers
//!
//! - **OpenAI** (default): chat completions with native tool calling
//! - **OpenRouter**: same wire format through the OpenRouter gateway
//! - **Anthropic**: Messages API with `tool_use`/`tool_result` blocks
//! - **Ollama**: local inference via `ollama-rs` (text only)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{ProviderSettings, build_provider};
//!
//! let settings = ProviderSettings::from_env()?;
//! let provider = build_provider(&settings, None, None)?;
//! let agent = AgentBuilder::new().provider(provider).build()?;
//! ```

pub mod anthropic;
pub mod config;
mod http;
#[cfg(feature = "ollama")]
pub mod ollama;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use config::{ProviderSettings, build_provider, default_model_for};
#[cfg(feature = "ollama")]
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
