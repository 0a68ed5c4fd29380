//! Deep Search Tool
//!
//! Multi-step research with progress updates:
//!
//! 1. Break the query into sub-queries (LLM)
//! 2. Search all of them concurrently
//! 3. Read the top pages in full
//! 4. Synthesize everything into one answer (LLM)

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use agent_core::{
    GenerationOptions, LlmProvider, ProgressSink, Result as CoreResult, StepStatus, Tool, ToolCall, ToolResult,
    ToolSchema, complete_text, tool::ParameterSchema,
};

use super::web_scraper::WebScraperTool;
use super::web_search::WebSearchTool;
use crate::search::{SearchDepth, SearchRequest, SearchResponse};
use crate::text::{head, outer_span};

pub const DEEP_SEARCH_TOOL: &str = "deep_search";

pub const DEFAULT_ANALYST_PROMPT: &str = "You are an expert research analyst.";

const SUB_QUERY_OPTIONS: GenerationOptions = GenerationOptions::new(0.3, 500);
const SYNTHESIS_OPTIONS: GenerationOptions = GenerationOptions::new(0.5, 4000);

const SCRAPE_MAX_LENGTH: usize = 6000;
const PAGE_EXCERPT_CHARS: usize = 3000;
const SNIPPET_CHARS: usize = 300;
const HITS_PER_SEARCH: usize = 3;

/// Knobs for one deep-search run
#[derive(Clone, Debug)]
pub struct DeepSearchOptions {
    /// 1-5
    pub num_sub_queries: usize,
    pub depth: SearchDepth,
    pub max_results_per_query: u32,
    pub scrape_pages: bool,
    pub max_pages: usize,
}

impl Default for DeepSearchOptions {
    fn default() -> Self {
        Self {
            num_sub_queries: 3,
            depth: SearchDepth::Advanced,
            max_results_per_query: 5,
            scrape_pages: true,
            max_pages: 5,
        }
    }
}

/// A page read during research
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageExcerpt {
    pub url: String,
    pub title: String,
    pub content: String,
}

/// A cited source and the query that surfaced it
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
    pub query: String,
}

/// Output of a deep-search run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeepResearch {
    pub query: String,
    pub sub_queries: Vec<String>,
    pub synthesis: String,
    pub sources: Vec<SourceRef>,
    pub pages_scraped: usize,
    pub raw_results: Vec<SearchResponse>,
}

pub struct DeepSearchTool {
    provider: Arc<dyn LlmProvider>,
    search: WebSearchTool,
    scraper: Arc<WebScraperTool>,
    model: Option<String>,
    system_prompt: String,
}

impl DeepSearchTool {
    pub fn new(provider: Arc<dyn LlmProvider>, search: WebSearchTool, scraper: Arc<WebScraperTool>) -> Self {
        Self {
            provider,
            search,
            scraper,
            model: None,
            system_prompt: DEFAULT_ANALYST_PROMPT.into(),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Run the full pipeline, reporting on `progress` as-is
    pub async fn research(
        &self,
        query: &str,
        options: &DeepSearchOptions,
        progress: &ProgressSink,
    ) -> ToolResult<DeepResearch> {
        progress.progress(
            "start",
            StepStatus::InProgress,
            format!("Starting deep research on: {}...", head(query, 50)),
            0,
        );

        let sub_queries = self.generate_sub_queries(query, options.num_sub_queries, progress).await;

        let mut all_queries = vec![query.to_owned()];
        all_queries.extend(sub_queries.iter().filter(|q| q.as_str() != query).cloned());

        progress.progress(
            "search",
            StepStatus::InProgress,
            format!("Searching {} queries...", all_queries.len()),
            15,
        );

        let requests: Vec<SearchRequest> = all_queries
            .iter()
            .map(|q| {
                SearchRequest::new(q.as_str())
                    .depth(options.depth)
                    .max_results(options.max_results_per_query)
            })
            .collect();
        let outcomes = join_all(requests.iter().map(|r| self.search.search(r))).await;

        let successful: Vec<SearchResponse> = outcomes
            .into_iter()
            .filter_map(|result| result.success.then_some(result.data).flatten())
            .collect();

        progress.progress(
            "search",
            StepStatus::Completed,
            format!("Found results from {} searches", successful.len()),
            40,
        );

        if successful.is_empty() {
            return ToolResult::failure("All searches failed");
        }

        let pages = if options.scrape_pages {
            self.scrape_top_results(&successful, options.max_pages, progress).await
        } else {
            Vec::new()
        };

        progress.progress(
            "synthesize",
            StepStatus::InProgress,
            "Analyzing and synthesizing all information...",
            75,
        );

        let prompt = self.synthesis_prompt(query, &successful, &pages);
        let synthesis = match complete_text(
            self.provider.as_ref(),
            &prompt,
            &SYNTHESIS_OPTIONS.with_model(self.model.clone()),
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Deep search synthesis failed");
                progress.progress("error", StepStatus::Failed, e.to_string(), 0);
                return ToolResult::failure(e.to_string());
            }
        };

        progress.progress("synthesize", StepStatus::Completed, "Research complete!", 100);

        ToolResult::success(DeepResearch {
            query: query.to_owned(),
            sub_queries,
            synthesis,
            sources: collect_sources(&successful),
            pages_scraped: pages.len(),
            raw_results: successful,
        })
    }

    async fn generate_sub_queries(&self, query: &str, count: usize, progress: &ProgressSink) -> Vec<String> {
        progress.progress(
            "generate_queries",
            StepStatus::InProgress,
            "Analyzing query and generating research questions...",
            5,
        );

        let prompt = format!(
            "You are a research assistant. Given a complex query, generate {count} specific sub-queries that \
will help comprehensively answer the main question.\n\n\
Main Query: {query}\n\n\
Generate {count} different search queries that explore different aspects of this topic. Each query should be \
specific and searchable.\n\n\
Respond with a JSON array of strings, nothing else. Example:\n\
[\"query 1\", \"query 2\", \"query 3\"]"
        );

        let response = match complete_text(
            self.provider.as_ref(),
            &prompt,
            &SUB_QUERY_OPTIONS.with_model(self.model.clone()),
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Sub-query generation failed, searching the original query only");
                return vec![query.to_owned()];
            }
        };

        match parse_query_list(&response) {
            Some(mut queries) => {
                progress.progress(
                    "generate_queries",
                    StepStatus::Completed,
                    format!("Generated {} research questions", queries.len()),
                    10,
                );
                queries.truncate(count);
                queries
            }
            None => {
                tracing::debug!("Sub-query response was not a JSON list");
                vec![query.to_owned()]
            }
        }
    }

    async fn scrape_top_results(
        &self,
        results: &[SearchResponse],
        max_pages: usize,
        progress: &ProgressSink,
    ) -> Vec<PageExcerpt> {
        progress.progress(
            "scrape_pages",
            StepStatus::InProgress,
            format!("Reading full content from top {max_pages} pages..."),
            50,
        );

        let mut seen = HashSet::new();
        let targets: Vec<(&str, &str)> = results
            .iter()
            .flat_map(|r| r.results.iter())
            .filter(|hit| !hit.url.is_empty() && seen.insert(hit.url.as_str()))
            .map(|hit| (hit.url.as_str(), hit.title.as_str()))
            .take(max_pages)
            .collect();

        let scraped = join_all(targets.iter().map(|(url, title)| async move {
            let result = self.scraper.scrape(url, SCRAPE_MAX_LENGTH).await;
            result.data.map(|page| PageExcerpt {
                url: (*url).to_owned(),
                title: (*title).to_owned(),
                content: page.content,
            })
        }))
        .await;

        let pages: Vec<PageExcerpt> = scraped.into_iter().flatten().collect();

        progress.progress(
            "scrape_pages",
            StepStatus::Completed,
            format!("Successfully read {} pages", pages.len()),
            65,
        );

        pages
    }

    fn synthesis_prompt(&self, query: &str, results: &[SearchResponse], pages: &[PageExcerpt]) -> String {
        let mut formatted_results = String::new();
        for (i, result) in results.iter().enumerate() {
            let _ = write!(formatted_results, "\n\n### Search {}: {}\n", i + 1, result.query);
            if let Some(answer) = result.answer.as_deref().filter(|a| !a.is_empty()) {
                let _ = writeln!(formatted_results, "**Quick Answer:** {answer}");
            }
            for hit in result.results.iter().take(HITS_PER_SEARCH) {
                let _ = write!(
                    formatted_results,
                    "\n- **{}**\n  {}...\n",
                    hit.title,
                    head(&hit.content, SNIPPET_CHARS)
                );
            }
        }

        let mut formatted_pages = String::new();
        for page in pages.iter().take(5) {
            let _ = write!(
                formatted_pages,
                "\n\n### Page: {}\nURL: {}\nContent:\n{}\n",
                page.title,
                page.url,
                head(&page.content, PAGE_EXCERPT_CHARS)
            );
        }

        format!(
            "{system}\n\n\
Based on the search results and full page content below, provide a comprehensive, well-structured answer to the query.\n\n\
## Original Query\n{query}\n\n\
## Search Results Summary\n{formatted_results}\n\n\
## Full Page Content\n{formatted_pages}\n\n\
## Instructions\n\
Provide a comprehensive answer that:\n\
1. Directly addresses the original query with specific details\n\
2. Synthesizes information from multiple sources\n\
3. Includes relevant facts, statistics, and examples found in the content\n\
4. Uses proper markdown formatting (headers, lists, tables where appropriate)\n\
5. Cites sources with URLs where possible\n\
6. Highlights any conflicting information or uncertainties\n\
7. Provides actionable insights or conclusions\n\n\
Write your response:",
            system = self.system_prompt,
        )
    }
}

fn parse_query_list(response: &str) -> Option<Vec<String>> {
    let candidate = outer_span(response, '[', ']').unwrap_or(response);
    let values: Vec<Value> = serde_json::from_str(candidate).ok()?;
    let queries: Vec<String> = values
        .into_iter()
        .filter_map(|v| v.as_str().map(|s| s.trim().to_owned()))
        .filter(|s| !s.is_empty())
        .collect();
    (!queries.is_empty()).then_some(queries)
}

fn collect_sources(results: &[SearchResponse]) -> Vec<SourceRef> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for result in results {
        for hit in &result.results {
            let source = SourceRef {
                title: hit.title.clone(),
                url: hit.url.clone(),
                query: result.query.clone(),
            };
            if seen.insert(source.clone()) {
                sources.push(source);
            }
        }
    }
    sources
}

#[async_trait]
impl Tool for DeepSearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: DEEP_SEARCH_TOOL.into(),
            description: "Perform a deep, comprehensive search on a complex topic. Use this for research \
questions that require multiple searches and synthesis of information from various sources."
                .into(),
            parameters: vec![
                ParameterSchema::new(
                    "query",
                    "string",
                    "The main research query or question to investigate",
                )
                .required(),
                ParameterSchema::new(
                    "num_sub_queries",
                    "integer",
                    "Number of sub-queries to generate for comprehensive research (1-5)",
                )
                .default_value(3),
                ParameterSchema::new("search_depth", "string", "Search depth for each query")
                    .default_value("advanced")
                    .one_of(&["basic", "advanced"]),
                ParameterSchema::new("scrape_pages", "boolean", "Whether to read full page content")
                    .default_value(true),
            ],
            category: Some("research".into()),
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        self.execute_with_progress(call, &ProgressSink::noop()).await
    }

    async fn execute_with_progress(&self, call: &ToolCall, progress: &ProgressSink) -> CoreResult<ToolResult> {
        let Some(query) = call.str_arg("query") else {
            return Ok(ToolResult::failure("query is required"));
        };

        let defaults = DeepSearchOptions::default();
        let options = DeepSearchOptions {
            num_sub_queries: call
                .arguments
                .get("num_sub_queries")
                .and_then(Value::as_u64)
                .and_then(|n| usize::try_from(n).ok())
                .map_or(defaults.num_sub_queries, |n| n.clamp(1, 5)),
            depth: call
                .str_arg("search_depth")
                .map_or(defaults.depth, SearchDepth::from_label),
            scrape_pages: call
                .arguments
                .get("scrape_pages")
                .and_then(Value::as_bool)
                .unwrap_or(defaults.scrape_pages),
            ..defaults
        };

        let result = self.research(query, &options, &progress.with_source(DEEP_SEARCH_TOOL)).await;
        Ok(result.map(|research| serde_json::to_value(research).unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::mock::ScriptedProvider;
    use agent_core::{AgentError, ProgressEvent};
    use crate::search::{MockPageFetcher, MockSearchBackend};

    fn tool(provider: Arc<ScriptedProvider>, backend: MockSearchBackend, fetcher: MockPageFetcher) -> DeepSearchTool {
        DeepSearchTool::new(
            provider,
            WebSearchTool::new(Arc::new(backend)),
            Arc::new(WebScraperTool::new(Arc::new(fetcher))),
        )
    }

    fn steps(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<(String, u8)> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ProgressEvent::Progress { step, progress, .. } = event {
                out.push((step, progress));
            }
        }
        out
    }

    #[tokio::test]
    async fn test_full_pipeline() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text(r#"Here you go: ["tokio runtime", "rust futures", "What is tokio?"]"#);
        provider.push_text("## Answer\nTokio is a runtime.");

        let deep = tool(provider.clone(), MockSearchBackend::new(), MockPageFetcher::new());
        let (sink, mut rx) = ProgressSink::channel();
        let result = deep.research("What is tokio?", &DeepSearchOptions::default(), &sink).await;

        assert!(result.success);
        let research = result.data.unwrap();
        assert_eq!(research.sub_queries.len(), 3);
        assert_eq!(research.raw_results.len(), 3);
        assert_eq!(research.raw_results[0].query, "What is tokio?");
        assert_eq!(research.synthesis, "## Answer\nTokio is a runtime.");
        assert_eq!(research.pages_scraped, 5);
        assert_eq!(research.sources.len(), 9);

        let synthesis_request = &provider.requests()[1];
        assert_eq!(synthesis_request.options.max_tokens, 4000);
        assert!(synthesis_request.messages[0].content.contains("### Search 1: What is tokio?"));
        assert!(synthesis_request.messages[0].content.contains("### Page: "));

        let steps = steps(&mut rx);
        assert_eq!(steps.first(), Some(&("start".to_owned(), 0)));
        assert_eq!(steps.last(), Some(&("synthesize".to_owned(), 100)));
    }

    #[tokio::test]
    async fn test_unparseable_sub_queries_fall_back_to_query() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text("I think you should search for tokio.");
        provider.push_text("done");

        let backend = MockSearchBackend::new();
        let deep = tool(provider, backend, MockPageFetcher::new());
        let options = DeepSearchOptions {
            scrape_pages: false,
            ..DeepSearchOptions::default()
        };
        let research = deep.research("tokio", &options, &ProgressSink::noop()).await.data.unwrap();

        assert_eq!(research.sub_queries, vec!["tokio".to_owned()]);
        assert_eq!(research.raw_results.len(), 1);
        assert_eq!(research.pages_scraped, 0);
    }

    #[tokio::test]
    async fn test_all_searches_failed() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_error(AgentError::ProviderUnavailable("down".into()));

        let deep = tool(provider.clone(), MockSearchBackend::new().fail_on("q"), MockPageFetcher::new());
        let result = deep.research("q", &DeepSearchOptions::default(), &ProgressSink::noop()).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("All searches failed"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_synthesis_failure_is_reported() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text("[]");
        provider.push_error(AgentError::RateLimited("slow down".into()));

        let deep = tool(provider, MockSearchBackend::new(), MockPageFetcher::new());
        let (sink, mut rx) = ProgressSink::channel();
        let result = deep.research("q", &DeepSearchOptions::default(), &sink).await;

        assert!(!result.success);
        assert!(steps(&mut rx).iter().any(|(step, _)| step == "error"));
    }

    #[tokio::test]
    async fn test_tool_execution_scopes_progress() {
        let provider = Arc::new(ScriptedProvider::new().with_fallback_text("[\"a\"]"));
        let deep = tool(provider, MockSearchBackend::new(), MockPageFetcher::new());

        let (sink, mut rx) = ProgressSink::channel();
        let call = ToolCall::new(DEEP_SEARCH_TOOL).arg("query", "q").arg("scrape_pages", false);
        let result = deep.execute_with_progress(&call, &sink).await.unwrap();

        assert!(result.success);
        assert_eq!(result.data.unwrap()["query"], "q");
        let first = rx.try_recv().unwrap();
        assert_eq!(first.source(), Some(DEEP_SEARCH_TOOL));
    }
}
