//! Error Types for Research Agents

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResearchError>;

#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("Search error: {0}")]
    Search(String),

    #[error("HTTP {0}: Failed to fetch URL")]
    HttpStatus(u16),

    #[error("Unsupported content type: {0}")]
    UnsupportedContent(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Generated plan has invalid structure: {0}")]
    InvalidPlan(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ResearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err)
        }
    }
}

impl From<ResearchError> for AgentError {
    fn from(err: ResearchError) -> Self {
        match err {
            ResearchError::Config(msg) => Self::Config(msg),
            ResearchError::InvalidPlan(msg) => Self::Parse(msg),
            ResearchError::Serialization(e) => Self::Json(e),
            other => Self::ToolExecution(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_match_tool_errors() {
        assert_eq!(ResearchError::HttpStatus(404).to_string(), "HTTP 404: Failed to fetch URL");
        assert_eq!(ResearchError::Timeout.to_string(), "Request timed out");
    }

    #[test]
    fn test_conversion_to_agent_error() {
        let err: AgentError = ResearchError::Config("missing key".into()).into();
        assert!(matches!(err, AgentError::Config(msg) if msg == "missing key"));

        let err: AgentError = ResearchError::Search("HTTP 500".into()).into();
        assert!(matches!(err, AgentError::ToolExecution(_)));
    }
}
