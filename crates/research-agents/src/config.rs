//! Orchestrator settings read from the environment.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ResearchError, Result};

/// Which agent assembly answers a session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    /// Master agent routing to planner / search-scraper / tool-executor
    #[default]
    Multi,
    /// One model driving the tools directly
    Single,
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Multi => "multi",
            Self::Single => "single",
        })
    }
}

impl FromStr for AgentMode {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "multi" | "multi_agent" | "master" => Ok(Self::Multi),
            "single" | "single_agent" => Ok(Self::Single),
            other => Err(ResearchError::Config(format!("Unknown agent mode: {other}"))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResearchConfig {
    /// Tavily key; search tools are unavailable without it
    pub tavily_api_key: Option<String>,

    /// IANA timezone handed to the datetime tool
    pub timezone: String,

    /// Cap on answer length for the single-agent loop
    pub max_tokens: Option<u32>,

    pub planner_model: Option<String>,
    pub search_scraper_model: Option<String>,

    /// Pages read in detail per plan-guided research run
    pub max_pages_to_scrape: usize,

    pub mode: AgentMode,

    /// Single-agent prompt favours `deep_search` over quick searches
    pub deep_research: bool,

    /// Register search/scrape tools at all
    pub enable_search: bool,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            tavily_api_key: None,
            timezone: "UTC".into(),
            max_tokens: None,
            planner_model: None,
            search_scraper_model: None,
            max_pages_to_scrape: 5,
            mode: AgentMode::Multi,
            deep_research: false,
            enable_search: true,
        }
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    env_opt(name)
        .map(|raw| {
            raw.parse()
                .map_err(|_| ResearchError::Config(format!("Invalid value for {name}: {raw}")))
        })
        .transpose()
}

fn env_flag(name: &str) -> Result<Option<bool>> {
    env_opt(name)
        .map(|raw| match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ResearchError::Config(format!("Invalid value for {name}: {raw}"))),
        })
        .transpose()
}

impl ResearchConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            tavily_api_key: env_opt("TAVILY_API_KEY"),
            timezone: env_opt("AGENT_TIMEZONE").unwrap_or(defaults.timezone),
            max_tokens: env_parse("AGENT_MAX_TOKENS")?,
            planner_model: env_opt("PLANNER_MODEL"),
            search_scraper_model: env_opt("SEARCH_SCRAPER_MODEL"),
            max_pages_to_scrape: env_parse("MAX_PAGES_TO_SCRAPE")?
                .unwrap_or(defaults.max_pages_to_scrape),
            mode: env_opt("AGENT_MODE")
                .map(|m| m.parse())
                .transpose()?
                .unwrap_or(defaults.mode),
            deep_research: env_flag("DEEP_RESEARCH")?.unwrap_or(defaults.deep_research),
            enable_search: env_flag("ENABLE_SEARCH")?.unwrap_or(defaults.enable_search),
        };

        if config.tavily_api_key.is_none() {
            tracing::warn!("TAVILY_API_KEY not set - web search disabled");
        }

        Ok(config)
    }

    pub const fn search_configured(&self) -> bool {
        self.enable_search && self.tavily_api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Multi".parse::<AgentMode>().unwrap(), AgentMode::Multi);
        assert_eq!("single".parse::<AgentMode>().unwrap(), AgentMode::Single);
        assert!(matches!("swarm".parse::<AgentMode>(), Err(ResearchError::Config(_))));
    }

    #[test]
    fn test_defaults() {
        let config = ResearchConfig::default();
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.max_pages_to_scrape, 5);
        assert_eq!(config.mode, AgentMode::Multi);
        assert!(!config.search_configured());
    }
}
