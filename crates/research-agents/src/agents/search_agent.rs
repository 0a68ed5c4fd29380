//! Single-agent research assistant: one tool-calling loop over the research tools.

use std::sync::Arc;

use agent_core::{Agent, AgentBuilder, DateTimeTool, LlmProvider, Result};

use super::prompts::{research_prompt, timezone_context};
use crate::config::ResearchConfig;
use crate::search::{PageFetcher, SearchBackend};
use crate::svckit::{DeepSearchTool, WebScraperTool, WebSearchTool};

/// Build the research [`Agent`].
///
/// `get_current_datetime` is always available. With search enabled the agent
/// also gets `web_scraper`, plus `tavily_search` and `deep_search` when a
/// search backend is configured.
pub fn build_search_agent(
    provider: Arc<dyn LlmProvider>,
    config: &ResearchConfig,
    search: Option<Arc<dyn SearchBackend>>,
    fetcher: Arc<dyn PageFetcher>,
) -> Result<Agent> {
    let mut builder = AgentBuilder::new()
        .provider(provider.clone())
        .system_prompt(research_prompt(config.deep_research))
        .user_context(timezone_context(&config.timezone))
        .tool(DateTimeTool);

    if let Some(max_tokens) = config.max_tokens {
        builder = builder.max_tokens(max_tokens);
    }

    if config.enable_search {
        let scraper = Arc::new(WebScraperTool::new(fetcher));
        builder = builder.shared_tool(scraper.clone());

        match search {
            Some(backend) => {
                let deep_search = DeepSearchTool::new(provider, WebSearchTool::new(backend.clone()), scraper);
                builder = builder
                    .tool(WebSearchTool::new(backend))
                    .tool(deep_search);
            }
            None => tracing::warn!("No search backend configured, web search tools disabled"),
        }
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::mock::ScriptedProvider;
    use agent_core::{ToolCall, chat};

    use crate::search::{MockPageFetcher, MockSearchBackend};

    fn fetcher() -> Arc<dyn PageFetcher> {
        Arc::new(MockPageFetcher::new())
    }

    #[test]
    fn test_tool_set_follows_config() {
        let provider = Arc::new(ScriptedProvider::new());
        let search: Arc<dyn SearchBackend> = Arc::new(MockSearchBackend::new());
        let config = ResearchConfig::default();

        let full = build_search_agent(provider.clone(), &config, Some(search), fetcher()).unwrap();
        assert_eq!(
            full.tools().names(),
            vec!["deep_search", "get_current_datetime", "tavily_search", "web_scraper"]
        );

        let no_backend = build_search_agent(provider.clone(), &config, None, fetcher()).unwrap();
        assert_eq!(no_backend.tools().names(), vec!["get_current_datetime", "web_scraper"]);

        let offline = ResearchConfig {
            enable_search: false,
            ..ResearchConfig::default()
        };
        let offline = build_search_agent(provider, &offline, None, fetcher()).unwrap();
        assert_eq!(offline.tools().names(), vec!["get_current_datetime"]);
    }

    #[test]
    fn test_prompt_carries_timezone_and_deep_variant() {
        let provider = Arc::new(ScriptedProvider::new());
        let config = ResearchConfig {
            timezone: "Europe/Paris".into(),
            deep_research: true,
            max_tokens: Some(1234),
            ..ResearchConfig::default()
        };

        let agent = build_search_agent(provider, &config, None, fetcher()).unwrap();
        let agent_config = agent.config();
        assert!(agent_config.system_prompt.contains("use sparingly"));
        assert!(agent_config.user_context.as_deref().unwrap().contains("Europe/Paris"));
        assert_eq!(agent_config.generation.max_tokens, 1234);
    }

    #[tokio::test]
    async fn test_search_then_answer() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_tool_calls(vec![ToolCall::new("tavily_search").arg("query", "tokio 1.42")]);
        provider.push_text("Tokio 1.42 was released.<sup>[[1]](https://example.com/tokio-1-42-1)</sup>");

        let backend = Arc::new(MockSearchBackend::new());
        let search: Arc<dyn SearchBackend> = backend.clone();
        let mut agent = build_search_agent(provider.clone(), &ResearchConfig::default(), Some(search), fetcher()).unwrap();

        let answer = chat(&mut agent, "What's new in tokio 1.42?").await;

        assert!(answer.starts_with("Tokio 1.42 was released."));
        assert_eq!(backend.requests().len(), 1);
        assert_eq!(backend.requests()[0].query, "tokio 1.42");
        assert_eq!(provider.call_count(), 2);
    }
}
