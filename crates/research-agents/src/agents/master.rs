//! Master Agent
//!
//! Coordinates the subagents for one conversation:
//!
//! ```text
//! analyze ──► route (sequential | parallel | conditional | direct) ──► synthesize
//!                 │
//!                 ├── tool_executor   (datetime)
//!                 ├── planner         (research plan)
//!                 └── search_scraper  (guided by the plan, or autonomous)
//! ```
//!
//! Every subagent call goes through [`run_subagent`], so a failing or
//! panicking subagent shows up as a failed [`SubagentResult`] and never
//! aborts the turn.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;

use agent_core::tool::DATETIME_TOOL;
use agent_core::{ChatAgent, Conversation, LlmProvider, Message, ProgressSink, Result, StepStatus, ToolResult};

use super::analyzer::QueryAnalyzer;
use super::planner::PlannerAgent;
use super::search_scraper::SearchScraperAgent;
use super::synthesizer::ResultSynthesizer;
use super::tool_executor::ToolExecutorAgent;
use super::prompts::SEARCH_SCRAPER_PROMPT;
use crate::config::ResearchConfig;
use crate::model::{ExecutionStrategy, QueryAnalysis, ResearchPlan, SubagentKind, SubagentOutput, SubagentResult};
use crate::search::{PageFetcher, SearchBackend};
use crate::svckit::{DeepSearchTool, WebScraperTool, WebSearchTool};

/// `source` of the master's own progress events
pub const MASTER_AGENT: &str = "master_agent";

pub struct MasterAgent {
    analyzer: QueryAnalyzer,
    planner: PlannerAgent,
    search_scraper: SearchScraperAgent,
    tool_executor: ToolExecutorAgent,
    synthesizer: ResultSynthesizer,
    history: Conversation,
}

impl MasterAgent {
    /// Wire up all subagents over one provider and one search backend
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        search: Arc<dyn SearchBackend>,
        fetcher: Arc<dyn PageFetcher>,
        config: &ResearchConfig,
    ) -> Result<Self> {
        let scraper = Arc::new(WebScraperTool::new(fetcher));
        let deep_search = DeepSearchTool::new(provider.clone(), WebSearchTool::new(search.clone()), scraper.clone())
            .with_model(config.search_scraper_model.clone())
            .with_system_prompt(SEARCH_SCRAPER_PROMPT);

        Ok(Self {
            analyzer: QueryAnalyzer::new(provider.clone()),
            planner: PlannerAgent::new(provider.clone()).with_model(config.planner_model.clone()),
            search_scraper: SearchScraperAgent::new(search, scraper, Arc::new(deep_search))
                .with_max_pages(config.max_pages_to_scrape),
            tool_executor: ToolExecutorAgent::new(config.timezone.clone()),
            synthesizer: ResultSynthesizer::new(provider)?,
            history: Conversation::new(),
        })
    }

    async fn route(&self, analysis: &QueryAnalysis, query: &str, progress: &ProgressSink) -> Vec<SubagentResult> {
        match analysis.execution_strategy {
            ExecutionStrategy::Sequential | ExecutionStrategy::Conditional => {
                self.route_sequential(analysis, query, progress).await
            }
            ExecutionStrategy::Parallel => self.route_parallel(analysis, query, progress).await,
            ExecutionStrategy::Direct => vec![self.run_search_scraper(query, None, progress).await],
        }
    }

    async fn route_sequential(&self, analysis: &QueryAnalysis, query: &str, progress: &ProgressSink) -> Vec<SubagentResult> {
        let mut results = Vec::new();

        // Collected for synthesis only, later stages don't see it
        if analysis.requires(SubagentKind::ToolExecutor) {
            results.push(self.run_tool_executor(progress).await);
        }

        let mut plan = None;
        if analysis.requires(SubagentKind::Planner) {
            let result = self.run_planner(query, progress).await;
            plan = result.plan().cloned();
            results.push(result);
        }

        if analysis.requires(SubagentKind::SearchScraper) {
            results.push(self.run_search_scraper(query, plan.as_ref(), progress).await);
        }

        results
    }

    /// Planner never runs here, search is always autonomous
    async fn route_parallel(&self, analysis: &QueryAnalysis, query: &str, progress: &ProgressSink) -> Vec<SubagentResult> {
        let tool = async {
            if analysis.requires(SubagentKind::ToolExecutor) {
                Some(self.run_tool_executor(progress).await)
            } else {
                None
            }
        };
        let search = async {
            if analysis.requires(SubagentKind::SearchScraper) {
                Some(self.run_search_scraper(query, None, progress).await)
            } else {
                None
            }
        };

        let (tool, search) = futures::join!(tool, search);
        tool.into_iter().chain(search).collect()
    }

    async fn run_tool_executor(&self, progress: &ProgressSink) -> SubagentResult {
        let arguments = HashMap::from([(
            "timezone".to_owned(),
            Value::String(self.tool_executor.timezone().to_owned()),
        )]);
        run_subagent(SubagentKind::ToolExecutor, progress, |sink| async move {
            self.tool_executor.execute(DATETIME_TOOL, arguments, &sink).await
        })
        .await
    }

    async fn run_planner(&self, query: &str, progress: &ProgressSink) -> SubagentResult {
        let context = self.history.messages();
        run_subagent(SubagentKind::Planner, progress, |sink| async move {
            self.planner.plan(query, context, &sink).await
        })
        .await
    }

    async fn run_search_scraper(&self, query: &str, plan: Option<&ResearchPlan>, progress: &ProgressSink) -> SubagentResult {
        run_subagent(SubagentKind::SearchScraper, progress, |sink| async move {
            self.search_scraper.execute(query, plan, &sink).await
        })
        .await
    }
}

#[async_trait]
impl ChatAgent for MasterAgent {
    async fn run_turn(&mut self, message: &str, progress: &ProgressSink) -> String {
        self.history.push(Message::user(message));
        let master = progress.with_source(MASTER_AGENT);

        master.progress("analyzing", StepStatus::InProgress, "Analyzing your request...", 5);
        let analysis = self.analyzer.analyze(message, self.history.messages()).await;
        tracing::info!(
            query_type = %analysis.query_type,
            strategy = ?analysis.execution_strategy,
            subagents = ?analysis.required_subagents,
            "Routing query"
        );

        master.progress(
            "routing",
            StepStatus::InProgress,
            format!("Planning {} response...", analysis.query_type),
            10,
        );
        let results = self.route(&analysis, message, progress).await;

        master.progress(
            "synthesizing",
            StepStatus::InProgress,
            "Analyzing and synthesizing results...",
            90,
        );
        let answer = match self.synthesizer.synthesize(message, &results, &analysis).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(error = %e, "Synthesis failed");
                format!("I encountered an unexpected error: {e}. Please try again.")
            }
        };

        self.history.push(Message::assistant(answer.clone()));
        answer
    }

    fn reset(&mut self) {
        self.history.clear();
    }

    fn history(&self) -> &[Message] {
        self.history.messages()
    }
}

/// Run one subagent with its events attributed to it.
///
/// Failed results are reported on the master's stream and returned as-is;
/// errors and panics become a failed [`SubagentResult`].
pub async fn run_subagent<T, F, Fut>(kind: SubagentKind, progress: &ProgressSink, run: F) -> SubagentResult
where
    T: Into<SubagentOutput>,
    F: FnOnce(ProgressSink) -> Fut,
    Fut: Future<Output = Result<ToolResult<T>>>,
{
    let name = kind.agent_name();
    let master = progress.with_source(MASTER_AGENT);

    let error = match AssertUnwindSafe(run(progress.with_source(name))).catch_unwind().await {
        Ok(Ok(result)) => {
            let result = SubagentResult::from_tool_result(kind, result);
            if !result.success {
                let reason = result.error.as_deref().unwrap_or("unknown error");
                tracing::warn!(subagent = name, error = reason, "Subagent failed");
                master.progress(
                    "subagent_error",
                    StepStatus::Failed,
                    format!("{name} encountered an issue: {reason}"),
                    100,
                );
            }
            return result;
        }
        Ok(Err(e)) => e.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };

    let error = format!("Unexpected error in {name}: {error}");
    tracing::error!(subagent = name, %error, "Subagent aborted");
    master.progress("subagent_exception", StepStatus::Failed, error.clone(), 100);
    SubagentResult::failed(kind, error)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::mock::ScriptedProvider;
    use agent_core::{AgentError, ProgressEvent, stream_turn};
    use futures::StreamExt;
    use serde_json::json;

    use crate::model::{Complexity, QueryType, ResearchOutput};
    use crate::search::{MockPageFetcher, MockSearchBackend};
    use crate::agents::synthesizer::PARTIAL_FAILURE_NOTE;

    fn master(provider: Arc<ScriptedProvider>) -> MasterAgent {
        MasterAgent::new(
            provider,
            Arc::new(MockSearchBackend::new()),
            Arc::new(MockPageFetcher::new()),
            &ResearchConfig::default(),
        )
        .unwrap()
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn exploding(_: ProgressSink) -> Result<ToolResult<Value>> {
        panic!("kaboom")
    }

    #[tokio::test]
    async fn test_planner_failure_falls_back_to_autonomous_search() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text("No plan today.");
        provider.push_text(r#"["axum performance"]"#);
        provider.push_text("Deep synthesis");
        provider.push_text("Final answer");
        let mut agent = master(provider.clone());

        let (sink, mut rx) = ProgressSink::channel();
        let answer = agent.run_turn("compare axum vs actix", &sink).await;

        assert_eq!(answer, format!("Final answer{PARTIAL_FAILURE_NOTE}"));
        assert_eq!(provider.call_count(), 4);

        let events = drain(&mut rx);
        let start = events
            .iter()
            .find_map(|e| match e {
                ProgressEvent::Progress { step, detail, source, .. } if step == "search_scraper_start" => {
                    Some((detail.clone(), source.clone()))
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(start.0, "Researching 'compare axum vs actix'");
        assert_eq!(start.1.as_deref(), Some("search_scraper_agent"));

        assert!(events.iter().any(|e| e.step() == Some("subagent_error") && e.source() == Some(MASTER_AGENT)));
        assert_eq!(agent.history().len(), 2);
    }

    #[tokio::test]
    async fn test_direct_single_result_skips_synthesis() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text(r#"["tokio overview"]"#);
        provider.push_text("Tokio is an async runtime.");
        let mut agent = master(provider.clone());

        let answer = agent.run_turn("what is tokio", &ProgressSink::noop()).await;

        assert_eq!(answer, "Tokio is an async runtime.");
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_parallel_runs_tool_and_search() {
        let provider = Arc::new(ScriptedProvider::new().with_fallback_text("Rust 2024 shipped."));
        let agent = master(provider);
        let analysis = QueryAnalysis::new(
            QueryType::TimeBased,
            true,
            &[SubagentKind::Planner, SubagentKind::ToolExecutor, SubagentKind::SearchScraper],
            ExecutionStrategy::Parallel,
            Complexity::Medium,
            0.8,
        );

        let results = agent.route(&analysis, "rust news today", &ProgressSink::noop()).await;

        let kinds: Vec<SubagentKind> = results.iter().map(|r| r.subagent).collect();
        assert_eq!(kinds, vec![SubagentKind::ToolExecutor, SubagentKind::SearchScraper]);
        assert!(results.iter().all(|r| r.success));
        assert!(matches!(
            results[1].data,
            Some(SubagentOutput::Research(ResearchOutput::Autonomous(_)))
        ));
    }

    #[tokio::test]
    async fn test_run_subagent_contains_errors_and_panics() {
        let (sink, mut rx) = ProgressSink::channel();

        let failed = run_subagent(SubagentKind::Planner, &sink, |_| async {
            Err::<ToolResult<Value>, _>(AgentError::Other("db down".into()))
        })
        .await;
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("Unexpected error in planner_agent: db down"));

        let panicked = run_subagent(SubagentKind::ToolExecutor, &sink, exploding).await;
        assert!(!panicked.success);
        assert_eq!(
            panicked.error.as_deref(),
            Some("Unexpected error in tool_executor_agent: kaboom")
        );

        let steps: Vec<_> = drain(&mut rx).iter().filter_map(|e| e.step().map(str::to_owned)).collect();
        assert_eq!(steps, vec!["subagent_exception", "subagent_exception"]);
    }

    #[tokio::test]
    async fn test_run_subagent_scopes_progress() {
        let (sink, mut rx) = ProgressSink::channel();

        let result = run_subagent(SubagentKind::ToolExecutor, &sink, |scoped| async move {
            scoped.progress("working", StepStatus::InProgress, "...", 50);
            Ok(ToolResult::success(json!({"ok": true})))
        })
        .await;

        assert!(result.success);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source(), Some("tool_executor_agent"));
    }

    #[tokio::test]
    async fn test_stream_ends_with_response_then_done() {
        let provider = Arc::new(ScriptedProvider::new().with_fallback_text("Answer"));
        let mut agent = master(provider);

        let events: Vec<ProgressEvent> = stream_turn(&mut agent, "what is tokio").collect().await;

        assert_eq!(events.first().and_then(ProgressEvent::step), Some("analyzing"));
        assert_eq!(events.first().and_then(ProgressEvent::source), Some(MASTER_AGENT));
        let tail = &events[events.len() - 2..];
        assert!(matches!(tail[0], ProgressEvent::Response { .. }));
        assert!(matches!(tail[1], ProgressEvent::Done));
        assert_eq!(events.iter().filter(|e| matches!(e, ProgressEvent::Done)).count(), 1);
    }

    #[tokio::test]
    async fn test_reset_clears_history() {
        let provider = Arc::new(ScriptedProvider::new().with_fallback_text("Answer"));
        let mut agent = master(provider);

        agent.run_turn("what is tokio", &ProgressSink::noop()).await;
        assert_eq!(agent.history().len(), 2);
        agent.reset();
        assert!(agent.history().is_empty());
    }
}
