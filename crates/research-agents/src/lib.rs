//! # research-agents
//!
//! Multi-agent research orchestration over any `LlmProvider`.
//!
//! ## Flow
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  MasterAgent                                                   │
//! │                                                                │
//! │  QueryAnalyzer ──► strategy ──► subagents ──► ResultSynthesizer│
//! │   keywords,         sequential   tool_executor  (one LLM call, │
//! │   then LLM          parallel     planner         only when     │
//! │                     conditional  search_scraper  needed)       │
//! │                     direct                                     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A single-agent mode ([`agents::build_search_agent`]) runs the plain
//! tool-calling loop over the same tools. [`AgentFactory`] builds either.
//!
//! Subagent failures never escape a turn: they are reported as progress
//! events and folded into the final answer as a short note.

pub mod agents;
pub mod config;
pub mod error;
pub mod factory;
pub mod model;
pub mod search;
pub mod svckit;
pub mod text;

pub use agents::{MasterAgent, build_search_agent};
pub use config::{AgentMode, ResearchConfig};
pub use error::{ResearchError, Result};
pub use factory::AgentFactory;
pub use model::{
    ExecutionStrategy, QueryAnalysis, QueryType, ResearchOutput, ResearchPlan, SubagentKind, SubagentResult,
};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{DeepSearchTool, WebScraperTool, WebSearchTool};
}
