//! Agent Factory
//!
//! Builds a fresh chat agent per session in either mode, sharing the provider
//! and the search/fetch backends.

use std::sync::Arc;

use agent_core::{ChatAgent, LlmProvider, ProgressSink, Result, ToolResult};

use crate::agents::{MasterAgent, build_search_agent};
use crate::config::{AgentMode, ResearchConfig};
use crate::search::{HttpFetcher, PageFetcher, SearchBackend, SearchRequest, SearchResponse, TavilyClient};
use crate::svckit::{DeepResearch, DeepSearchOptions, DeepSearchTool, WebScraperTool, WebSearchTool};

const SEARCH_DISABLED: &str = "Web search is not configured";

pub struct AgentFactory {
    provider: Arc<dyn LlmProvider>,
    config: ResearchConfig,
    search: Option<Arc<dyn SearchBackend>>,
    fetcher: Arc<dyn PageFetcher>,
}

impl AgentFactory {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: ResearchConfig,
        search: Option<Arc<dyn SearchBackend>>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            provider,
            config,
            search,
            fetcher,
        }
    }

    /// Real backends: Tavily when a key is configured, plain HTTP for pages
    pub fn from_config(provider: Arc<dyn LlmProvider>, config: ResearchConfig) -> Result<Self> {
        let search: Option<Arc<dyn SearchBackend>> = match (&config.tavily_api_key, config.enable_search) {
            (Some(key), true) => Some(Arc::new(TavilyClient::new(key.clone())?) as Arc<dyn SearchBackend>),
            _ => None,
        };
        let fetcher = Arc::new(HttpFetcher::new()?);

        Ok(Self::new(provider, config, search, fetcher))
    }

    pub const fn config(&self) -> &ResearchConfig {
        &self.config
    }

    pub fn provider(&self) -> Arc<dyn LlmProvider> {
        self.provider.clone()
    }

    pub const fn search_configured(&self) -> bool {
        self.search.is_some()
    }

    /// New agent in `mode`, or the configured mode.
    ///
    /// Multi-agent mode needs a search backend; without one the single agent is built.
    pub fn build(&self, mode: Option<AgentMode>) -> Result<Box<dyn ChatAgent>> {
        let mode = mode.unwrap_or(self.config.mode);

        match (mode, &self.search) {
            (AgentMode::Multi, Some(search)) => Ok(Box::new(MasterAgent::new(
                self.provider.clone(),
                search.clone(),
                self.fetcher.clone(),
                &self.config,
            )?)),
            (AgentMode::Multi, None) => {
                tracing::warn!("Multi-agent mode requires a search backend, using single-agent mode");
                self.build_single()
            }
            (AgentMode::Single, _) => self.build_single(),
        }
    }

    fn build_single(&self) -> Result<Box<dyn ChatAgent>> {
        let agent = build_search_agent(
            self.provider.clone(),
            &self.config,
            self.search.clone(),
            self.fetcher.clone(),
        )?;
        Ok(Box::new(agent))
    }

    /// One-off web search outside any conversation
    pub async fn search(&self, request: &SearchRequest) -> ToolResult<SearchResponse> {
        match &self.search {
            Some(backend) => WebSearchTool::new(backend.clone()).search(request).await,
            None => ToolResult::failure(SEARCH_DISABLED),
        }
    }

    /// One-off deep research run outside any conversation
    pub async fn deep_search(&self, query: &str, options: &DeepSearchOptions) -> ToolResult<DeepResearch> {
        let Some(backend) = &self.search else {
            return ToolResult::failure(SEARCH_DISABLED);
        };

        let scraper = Arc::new(WebScraperTool::new(self.fetcher.clone()));
        DeepSearchTool::new(self.provider.clone(), WebSearchTool::new(backend.clone()), scraper)
            .research(query, options, &ProgressSink::noop())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::chat;
    use agent_core::mock::ScriptedProvider;

    use crate::search::{MockPageFetcher, MockSearchBackend};

    fn factory(provider: Arc<ScriptedProvider>, search: bool) -> AgentFactory {
        let backend: Option<Arc<dyn SearchBackend>> = search.then(|| Arc::new(MockSearchBackend::new()) as _);
        AgentFactory::new(
            provider,
            ResearchConfig::default(),
            backend,
            Arc::new(MockPageFetcher::new()),
        )
    }

    #[test]
    fn test_from_config_without_key_has_no_search() {
        let provider = Arc::new(ScriptedProvider::new());
        let factory = AgentFactory::from_config(provider, ResearchConfig::default()).unwrap();
        assert!(!factory.search_configured());
    }

    #[tokio::test]
    async fn test_multi_without_search_builds_single_agent() {
        let provider = Arc::new(ScriptedProvider::new().with_fallback_text("Hello!"));
        let mut agent = factory(provider.clone(), false).build(Some(AgentMode::Multi)).unwrap();

        assert_eq!(chat(agent.as_mut(), "what is tokio").await, "Hello!");
        // Single agent: one model call, no analyzer or deep search
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_multi_with_search_builds_master() {
        let provider = Arc::new(ScriptedProvider::new().with_fallback_text("Tokio is a runtime."));
        let mut agent = factory(provider.clone(), true).build(None).unwrap();

        assert_eq!(chat(agent.as_mut(), "what is tokio").await, "Tokio is a runtime.");
        // Deep search: sub-queries and synthesis
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_search_helper() {
        let provider = Arc::new(ScriptedProvider::new());

        let hits = factory(provider.clone(), true).search(&SearchRequest::new("tokio")).await;
        assert_eq!(hits.data.unwrap().results.len(), 3);

        let disabled = factory(provider, false).search(&SearchRequest::new("tokio")).await;
        assert_eq!(disabled.error.as_deref(), Some(SEARCH_DISABLED));
    }

    #[tokio::test]
    async fn test_deep_search_helper() {
        let provider = Arc::new(ScriptedProvider::new().with_fallback_text("Summary."));

        let research = factory(provider.clone(), true)
            .deep_search("tokio", &DeepSearchOptions::default())
            .await;
        assert_eq!(research.data.unwrap().synthesis, "Summary.");

        let disabled = factory(provider, false)
            .deep_search("tokio", &DeepSearchOptions::default())
            .await;
        assert!(!disabled.success);
    }
}
