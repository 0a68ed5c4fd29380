//! Agents
//!
//! The multi-agent orchestrator ([`MasterAgent`]) with its subagents, and the
//! single-agent research assistant ([`build_search_agent`]).

pub mod analyzer;
pub mod master;
pub mod planner;
pub mod prompts;
pub mod search_agent;
pub mod search_scraper;
pub mod synthesizer;
pub mod tool_executor;

pub use analyzer::QueryAnalyzer;
pub use master::{MASTER_AGENT, MasterAgent, run_subagent};
pub use planner::PlannerAgent;
pub use search_agent::build_search_agent;
pub use search_scraper::SearchScraperAgent;
pub use synthesizer::ResultSynthesizer;
pub use tool_executor::ToolExecutorAgent;
