//! SearchScraper Subagent
//!
//! Executes web research in one of two modes:
//!
//! - **Guided**: follows a [`ResearchPlan`], fanning out each step's
//!   queries concurrently, then reads the top pages in full.
//! - **Autonomous**: hands the query to [`DeepSearchTool`] unchanged.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;

use agent_core::{ProgressSink, Result, StepStatus, ToolResult};

use crate::model::{GuidedResearch, ResearchOutput, ResearchPlan};
use crate::search::{SearchBackend, SearchDepth, SearchHit, SearchRequest, SearchResponse};
use crate::svckit::{DeepSearchOptions, DeepSearchTool, ScrapedPage, WebScraperTool, WebSearchTool};
use crate::text::{ellipsize, head};

pub const DEFAULT_MAX_PAGES: usize = 5;

const SCRAPE_MAX_LENGTH: usize = 6000;

pub struct SearchScraperAgent {
    search: WebSearchTool,
    scraper: Arc<WebScraperTool>,
    deep_search: Arc<DeepSearchTool>,
    max_pages: usize,
}

impl SearchScraperAgent {
    pub fn new(backend: Arc<dyn SearchBackend>, scraper: Arc<WebScraperTool>, deep_search: Arc<DeepSearchTool>) -> Self {
        Self {
            search: WebSearchTool::new(backend),
            scraper,
            deep_search,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    #[must_use]
    pub const fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Research `query`, guided by `plan` when one is given
    pub async fn execute(
        &self,
        query: &str,
        plan: Option<&ResearchPlan>,
        progress: &ProgressSink,
    ) -> Result<ToolResult<ResearchOutput>> {
        let result = match plan {
            Some(plan) => ToolResult::success(ResearchOutput::Guided(self.execute_plan(query, plan, progress).await)),
            None => self.execute_autonomous(query, progress).await,
        };
        Ok(result)
    }

    async fn execute_plan(&self, query: &str, plan: &ResearchPlan, progress: &ProgressSink) -> GuidedResearch {
        let goal = if plan.goal.is_empty() { "research" } else { head(&plan.goal, 50) };
        progress.progress(
            "search_scraper_start",
            StepStatus::InProgress,
            format!("Starting research: {goal}"),
            5,
        );

        let total = plan.steps.len();
        let mut results = Vec::new();
        let mut all_sources: Vec<SearchHit> = Vec::new();

        for (i, step) in plan.steps.iter().enumerate() {
            let sample = step
                .search_queries
                .first()
                .map_or_else(|| step.description.clone(), |q| ellipsize(q, 40));
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let pct = (10.0 + (i as f64 / total as f64) * 70.0) as u8;
            progress.progress(
                "search_scraper_step",
                StepStatus::InProgress,
                format!("Searching '{sample}' ({}/{total})", step.step_number),
                pct,
            );

            if step.is_search() && !step.search_queries.is_empty() {
                let step_results = self.execute_searches(&step.search_queries, pct, progress).await;
                all_sources.extend(
                    step_results
                        .iter()
                        .filter(|r| r.success)
                        .filter_map(|r| r.data.as_ref())
                        .flat_map(|response| response.results.iter().cloned()),
                );
                results.extend(step_results);
            }
        }

        let scraped_content = if all_sources.is_empty() {
            Vec::new()
        } else {
            progress.progress(
                "search_scraper_scraping",
                StepStatus::InProgress,
                format!("Reading {} pages in detail...", self.max_pages.min(all_sources.len())),
                85,
            );
            self.scrape_top_results(&all_sources).await
        };

        progress.progress(
            "search_scraper_complete",
            StepStatus::Completed,
            format!(
                "Found {} sources, read {} pages",
                all_sources.len(),
                scraped_content.len()
            ),
            100,
        );

        GuidedResearch {
            query: query.to_owned(),
            plan: plan.clone(),
            searches_performed: results.len(),
            pages_scraped: scraped_content.len(),
            results,
            all_sources,
            scraped_content,
        }
    }

    async fn execute_autonomous(&self, query: &str, progress: &ProgressSink) -> ToolResult<ResearchOutput> {
        progress.progress(
            "search_scraper_start",
            StepStatus::InProgress,
            format!("Researching '{}'", ellipsize(query, 50)),
            5,
        );

        let options = DeepSearchOptions {
            max_pages: self.max_pages,
            ..DeepSearchOptions::default()
        };
        let result = self.deep_search.research(query, &options, progress).await;

        let (status, detail) = if result.success {
            (StepStatus::Completed, "Research complete")
        } else {
            (StepStatus::Failed, "Research encountered errors")
        };
        progress.progress("search_scraper_complete", status, detail, 100);

        result.map(ResearchOutput::Autonomous)
    }

    /// One result per query, at the query's index, failed or not
    async fn execute_searches(
        &self,
        queries: &[String],
        pct: u8,
        progress: &ProgressSink,
    ) -> Vec<ToolResult<SearchResponse>> {
        progress.progress(
            "search_scraper_searching",
            StepStatus::InProgress,
            format!("Running {} search queries in parallel...", queries.len()),
            pct,
        );

        let requests: Vec<SearchRequest> = queries
            .iter()
            .map(|q| SearchRequest::new(q.as_str()).depth(SearchDepth::Advanced))
            .collect();
        let outcomes = join_all(requests.iter().map(|r| self.search.search(r))).await;

        outcomes
            .into_iter()
            .zip(queries)
            .map(|(result, query)| {
                if result.success {
                    result
                } else {
                    let error = result.error.unwrap_or_default();
                    ToolResult::failure(format!("Search failed for '{query}': {error}"))
                }
            })
            .collect()
    }

    async fn scrape_top_results(&self, sources: &[SearchHit]) -> Vec<ScrapedPage> {
        let mut seen = HashSet::new();
        let urls: Vec<&str> = sources
            .iter()
            .take(self.max_pages * 2)
            .map(|hit| hit.url.as_str())
            .filter(|url| !url.is_empty() && seen.insert(*url))
            .take(self.max_pages)
            .collect();

        join_all(urls.iter().map(|url| self.scraper.scrape(url, SCRAPE_MAX_LENGTH)))
            .await
            .into_iter()
            .filter_map(|result| result.data)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::ProgressEvent;
    use agent_core::mock::ScriptedProvider;
    use crate::model::PlanStep;
    use crate::search::{MockPageFetcher, MockSearchBackend};

    fn agent(provider: Arc<ScriptedProvider>, backend: MockSearchBackend, fetcher: MockPageFetcher) -> SearchScraperAgent {
        let backend: Arc<dyn SearchBackend> = Arc::new(backend);
        let scraper = Arc::new(WebScraperTool::new(Arc::new(fetcher)));
        let deep = DeepSearchTool::new(provider, WebSearchTool::new(backend.clone()), scraper.clone());
        SearchScraperAgent::new(backend, scraper, Arc::new(deep))
    }

    fn step(number: u32, queries: &[&str]) -> PlanStep {
        PlanStep {
            step_number: number,
            action: "search".into(),
            description: format!("step {number}"),
            search_queries: queries.iter().map(|q| (*q).to_owned()).collect(),
        }
    }

    fn plan() -> ResearchPlan {
        ResearchPlan {
            goal: "Learn about async Rust".into(),
            steps: vec![
                step(1, &["tokio", "broken query", "async-std"]),
                step(2, &["tokio"]),
                PlanStep {
                    step_number: 3,
                    action: "analyze".into(),
                    description: "Weigh it up".into(),
                    search_queries: Vec::new(),
                },
            ],
            expected_sources: 6,
        }
    }

    #[tokio::test]
    async fn test_guided_keeps_failed_query_in_place() {
        let provider = Arc::new(ScriptedProvider::new());
        let backend = MockSearchBackend::new().fail_on("broken query");
        let research = agent(provider.clone(), backend, MockPageFetcher::new());

        let plan = plan();
        let result = research.execute("async rust", Some(&plan), &ProgressSink::noop()).await.unwrap();

        let Some(ResearchOutput::Guided(guided)) = result.data else {
            panic!("expected guided output");
        };
        assert_eq!(guided.searches_performed, 4);
        assert!(guided.results[0].success);
        assert!(!guided.results[1].success);
        assert!(
            guided.results[1]
                .error
                .as_deref()
                .unwrap()
                .starts_with("Search failed for 'broken query': ")
        );
        assert!(guided.results[2].success);
        assert_eq!(guided.results[2].data.as_ref().unwrap().query, "async-std");

        // 3 + 3 + 3 hits, tokio's repeated
        assert_eq!(guided.all_sources.len(), 9);
        assert_eq!(guided.pages_scraped, 5);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_scrape_dedupes_urls() {
        let provider = Arc::new(ScriptedProvider::new());
        let plan = ResearchPlan {
            goal: String::new(),
            steps: vec![step(1, &["tokio"]), step(2, &["tokio"])],
            expected_sources: 3,
        };
        let research = agent(provider, MockSearchBackend::new(), MockPageFetcher::new()).with_max_pages(10);

        let (sink, mut rx) = ProgressSink::channel();
        let result = research.execute("tokio", Some(&plan), &sink).await.unwrap();
        let Some(ResearchOutput::Guided(guided)) = result.data else {
            panic!("expected guided output");
        };

        assert_eq!(guided.all_sources.len(), 6);
        assert_eq!(guided.pages_scraped, 3);

        match rx.try_recv().unwrap() {
            ProgressEvent::Progress { detail, .. } => assert_eq!(detail, "Starting research: research"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_autonomous_delegates_to_deep_search() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text(r#"["tokio scheduler"]"#);
        provider.push_text("Tokio schedules tasks cooperatively.");
        let research = agent(provider.clone(), MockSearchBackend::new(), MockPageFetcher::new());

        let (sink, mut rx) = ProgressSink::channel();
        let result = research.execute("How does tokio schedule?", None, &sink).await.unwrap();

        assert!(result.success);
        let output = result.data.unwrap();
        assert_eq!(output.synthesis(), Some("Tokio schedules tasks cooperatively."));
        assert_eq!(provider.call_count(), 2);

        let mut steps = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Some(step) = event.step() {
                steps.push(step.to_owned());
            }
        }
        assert_eq!(steps.first().map(String::as_str), Some("search_scraper_start"));
        assert_eq!(steps.last().map(String::as_str), Some("search_scraper_complete"));
        assert!(steps.iter().any(|s| s == "synthesize"));
    }

    #[tokio::test]
    async fn test_autonomous_failure_reported() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text("[]");
        let backend = MockSearchBackend::new().fail_on("anything");
        let research = agent(provider, backend, MockPageFetcher::new());

        let result = research.execute("anything", None, &ProgressSink::noop()).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("All searches failed"));
    }
}
