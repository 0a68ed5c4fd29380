//! # agent-core
//!
//! Core agent logic with provider-agnostic LLM abstraction, an extensible
//! tool system and the turn/session plumbing shared by every agent.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ChatSession                           │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────────┐  │
//! │  │  ChatAgent  │  │    Tools    │  │   LlmProvider        │  │
//! │  │ (tool loop) │──│   Registry  │──│   (Strategy)         │  │
//! │  └─────────────┘  └─────────────┘  └──────────────────────┘  │
//! │         │ ProgressSink ──► stream_turn ──► ProgressEvent*    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait enables swapping between OpenAI, Anthropic,
//! OpenRouter or Ollama without changing agent logic.

pub mod error;
pub mod history;
pub mod message;
pub mod mock;
pub mod progress;
pub mod provider;
pub mod reasoning;
pub mod scrub;
pub mod session;
pub mod tool;
pub mod transcript;
pub mod turn;

pub use error::{AgentError, Result};
pub use history::{ChatStorage, MemoryChatStorage};
pub use message::{Conversation, Message, Role};
pub use progress::{ProgressEvent, ProgressSink, StepStatus};
pub use provider::{ChatResponse, Completion, GenerationOptions, LlmProvider, ProviderKind, complete_text};
pub use reasoning::{Agent, AgentBuilder, AgentConfig};
pub use scrub::ToolTagScrubber;
pub use session::{ChatSession, MemorySessionRegistry, SessionId, SessionRegistry, SharedSession};
pub use tool::{DateTimeTool, Tool, ToolCall, ToolRegistry, ToolResult, ToolSchema};
pub use turn::{ChatAgent, chat, spawn_turn, stream_turn};
