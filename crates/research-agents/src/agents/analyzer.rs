//! Query Analyzer
//!
//! Classifies an incoming message and decides which subagents run and how.
//! A keyword pass answers most queries without a network call; the model is
//! consulted only when no keyword class applies.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;

use agent_core::{AgentError, GenerationOptions, LlmProvider, Message, Result, complete_text};

use crate::model::{Complexity, ExecutionStrategy, QueryAnalysis, QueryType, SubagentKind};

const TIME_KEYWORDS: [&str; 15] = [
    "yesterday",
    "today",
    "tomorrow",
    "last week",
    "this week",
    "next week",
    "last month",
    "this month",
    "recently",
    "latest",
    "current",
    "now",
    "when",
    "what time",
    "date",
];

const COMPARISON_KEYWORDS: [&str; 9] = [
    "vs",
    "versus",
    "compare",
    "comparison",
    "difference",
    "better",
    "which is",
    "or",
    "between",
];

const RESEARCH_KEYWORDS: [&str; 10] = [
    "research",
    "analyze",
    "study",
    "investigate",
    "explore",
    "explain",
    "comprehensive",
    "detailed",
    "in-depth",
    "overview",
];

const SIMPLE_QUESTION_PREFIXES: [&str; 5] = ["what is", "who is", "where is", "define", "meaning of"];

const NEWS_KEYWORDS: [&str; 5] = ["news", "update", "updates", "information", "info"];

/// Longest query still treated as a simple question
const SIMPLE_QUESTION_MAX_WORDS: usize = 6;

const CLASSIFY_OPTIONS: GenerationOptions = GenerationOptions::new(0.1, 150);

static JSON_OBJECT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)\{[^{}]*\}").ok());

/// Query lower-cased and reduced to space-separated words, padded with spaces
/// so that `" kw "` matches whole words and phrases only.
struct Normalized(String);

impl Normalized {
    fn new(query: &str) -> Self {
        let words: Vec<String> = query
            .to_lowercase()
            .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '\''))
            .filter(|w| !w.is_empty())
            .map(str::to_owned)
            .collect();
        Self(format!(" {} ", words.join(" ")))
    }

    fn contains_any(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|kw| self.0.contains(&format!(" {kw} ")))
    }

    fn starts_with_any(&self, prefixes: &[&str]) -> bool {
        prefixes.iter().any(|p| self.0.starts_with(&format!(" {p} ")))
    }
}

pub struct QueryAnalyzer {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
}

impl QueryAnalyzer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider, model: None }
    }

    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Classify `query`. Never fails; falls back to [`QueryAnalysis::fallback`].
    pub async fn analyze(&self, query: &str, history: &[Message]) -> QueryAnalysis {
        if let Some(analysis) = Self::keyword_classify(query) {
            tracing::debug!(query_type = %analysis.query_type, "Keyword classification");
            return analysis;
        }

        tracing::debug!(history_len = history.len(), "No keyword match, asking the model");
        match self.llm_classify(query).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(error = %e, "LLM classification failed, using fallback");
                QueryAnalysis::fallback()
            }
        }
    }

    /// Keyword pass. `None` means no keyword class applied.
    pub fn keyword_classify(query: &str) -> Option<QueryAnalysis> {
        use SubagentKind::{Planner, SearchScraper, ToolExecutor};

        let text = Normalized::new(query);

        if text.contains_any(&TIME_KEYWORDS) {
            return Some(if text.contains_any(&RESEARCH_KEYWORDS) {
                QueryAnalysis::new(
                    QueryType::TimeBased,
                    true,
                    &[ToolExecutor, Planner, SearchScraper],
                    ExecutionStrategy::Sequential,
                    Complexity::High,
                    0.85,
                )
            } else {
                QueryAnalysis::new(
                    QueryType::TimeBased,
                    false,
                    &[ToolExecutor, SearchScraper],
                    ExecutionStrategy::Sequential,
                    Complexity::Medium,
                    0.9,
                )
            });
        }

        if text.contains_any(&COMPARISON_KEYWORDS) {
            return Some(QueryAnalysis::new(
                QueryType::Comparison,
                true,
                &[Planner, SearchScraper],
                ExecutionStrategy::Sequential,
                Complexity::High,
                0.9,
            ));
        }

        if text.starts_with_any(&SIMPLE_QUESTION_PREFIXES)
            && query.split_whitespace().count() <= SIMPLE_QUESTION_MAX_WORDS
        {
            return Some(QueryAnalysis::new(
                QueryType::SimpleFact,
                false,
                &[SearchScraper],
                ExecutionStrategy::Direct,
                Complexity::Low,
                0.8,
            ));
        }

        if text.contains_any(&RESEARCH_KEYWORDS) {
            return Some(QueryAnalysis::new(
                QueryType::ComplexResearch,
                true,
                &[Planner, SearchScraper],
                ExecutionStrategy::Sequential,
                Complexity::High,
                0.85,
            ));
        }

        if text.contains_any(&NEWS_KEYWORDS) {
            return Some(QueryAnalysis::new(
                QueryType::SimpleSearch,
                false,
                &[SearchScraper],
                ExecutionStrategy::Direct,
                Complexity::Low,
                0.8,
            ));
        }

        None
    }

    async fn llm_classify(&self, query: &str) -> Result<QueryAnalysis> {
        let prompt = format!(
            r#"Analyze the following user query and classify it for routing to appropriate research agents.

User Query: "{query}"

Classify the query type as ONE of:
- simple_fact: Single concept definitions or straightforward questions
- simple_search: Current information, news, or updates
- complex_research: Multi-faceted research requiring deep analysis
- time_based: Questions involving specific dates or time periods
- comparison: Comparing two or more things
- general: Default for unclear queries

Also determine:
- requires_planning: true if the query benefits from a structured research plan, false otherwise
- complexity: low, medium, or high

Respond ONLY with a JSON object in this exact format:
{{
    "query_type": "...",
    "requires_planning": true/false,
    "complexity": "low/medium/high"
}}"#
        );

        let response = complete_text(
            self.provider.as_ref(),
            &prompt,
            &CLASSIFY_OPTIONS.with_model(self.model.clone()),
        )
        .await?;

        let response = response.trim();
        if response.is_empty() {
            return Err(AgentError::Parse("Empty response from LLM".into()));
        }

        let candidate = JSON_OBJECT
            .as_ref()
            .and_then(|re| re.find(response))
            .map_or(response, |m| m.as_str());
        let classification: Value = serde_json::from_str(candidate)?;

        Ok(route(&classification))
    }
}

/// Map a model classification onto subagents and a strategy
fn route(classification: &Value) -> QueryAnalysis {
    use SubagentKind::{Planner, SearchScraper, ToolExecutor};

    let query_type = QueryType::from_label(
        classification
            .get("query_type")
            .and_then(Value::as_str)
            .unwrap_or("general"),
    );
    let requires_planning = classification
        .get("requires_planning")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let complexity = Complexity::from_label(
        classification
            .get("complexity")
            .and_then(Value::as_str)
            .unwrap_or("medium"),
    );

    let (subagents, strategy) = match (query_type, requires_planning) {
        (QueryType::TimeBased, true) => (&[ToolExecutor, Planner, SearchScraper][..], ExecutionStrategy::Sequential),
        (QueryType::TimeBased, false) => (&[ToolExecutor, SearchScraper][..], ExecutionStrategy::Sequential),
        (_, true) => (&[Planner, SearchScraper][..], ExecutionStrategy::Sequential),
        (_, false) => (&[SearchScraper][..], ExecutionStrategy::Direct),
    };

    QueryAnalysis::new(query_type, requires_planning, subagents, strategy, complexity, 0.7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::mock::ScriptedProvider;

    fn analyzer(provider: &Arc<ScriptedProvider>) -> QueryAnalyzer {
        QueryAnalyzer::new(provider.clone())
    }

    #[tokio::test]
    async fn test_comparison_needs_no_model() {
        let provider = Arc::new(ScriptedProvider::new());
        let analysis = analyzer(&provider).analyze("compare tokio vs async-std", &[]).await;

        assert_eq!(analysis.query_type, QueryType::Comparison);
        assert_eq!(analysis.required_subagents, vec![SubagentKind::Planner, SubagentKind::SearchScraper]);
        assert_eq!(analysis.execution_strategy, ExecutionStrategy::Sequential);
        assert!((analysis.confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_time_based_with_research() {
        let analysis = QueryAnalyzer::keyword_classify("Explain what happened in AI research this week").unwrap();
        assert_eq!(analysis.query_type, QueryType::TimeBased);
        assert_eq!(analysis.estimated_complexity, Complexity::High);
        assert_eq!(
            analysis.required_subagents,
            vec![SubagentKind::ToolExecutor, SubagentKind::Planner, SubagentKind::SearchScraper]
        );

        let plain = QueryAnalyzer::keyword_classify("What's the weather today?").unwrap();
        assert_eq!(plain.required_subagents, vec![SubagentKind::ToolExecutor, SubagentKind::SearchScraper]);
        assert_eq!(plain.estimated_complexity, Complexity::Medium);
    }

    #[test]
    fn test_simple_question_word_limit() {
        let short = QueryAnalyzer::keyword_classify("What is a monad?").unwrap();
        assert_eq!(short.query_type, QueryType::SimpleFact);
        assert_eq!(short.execution_strategy, ExecutionStrategy::Direct);

        assert!(QueryAnalyzer::keyword_classify("What is the reason that rust uses ownership semantics").is_none());
    }

    #[test]
    fn test_priority_and_whole_words() {
        // "now" inside "know" and "or" inside "for" do not count
        assert!(QueryAnalyzer::keyword_classify("I want to know more stuff for lunch").is_none());

        let research = QueryAnalyzer::keyword_classify("Give me an in-depth look at WebAssembly").unwrap();
        assert_eq!(research.query_type, QueryType::ComplexResearch);

        let news = QueryAnalyzer::keyword_classify("Any news on the Rust foundation").unwrap();
        assert_eq!(news.query_type, QueryType::SimpleSearch);
        assert!((news.confidence - 0.8).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_llm_tier_routing() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text(
            "Sure, here is the classification:\n{\"query_type\": \"time_based\", \"requires_planning\": true, \"complexity\": \"high\"}",
        );

        let analysis = analyzer(&provider).analyze("Tell me about the Apollo program", &[]).await;

        assert_eq!(analysis.query_type, QueryType::TimeBased);
        assert_eq!(
            analysis.required_subagents,
            vec![SubagentKind::ToolExecutor, SubagentKind::Planner, SubagentKind::SearchScraper]
        );
        assert!((analysis.confidence - 0.7).abs() < f32::EPSILON);

        let request = &provider.requests()[0];
        assert!((request.options.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(request.options.max_tokens, 150);
    }

    #[tokio::test]
    async fn test_llm_tier_defaults_missing_fields() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text("{}");

        let analysis = analyzer(&provider).analyze("Tell me about the Apollo program", &[]).await;
        assert_eq!(analysis.query_type, QueryType::General);
        assert_eq!(analysis.execution_strategy, ExecutionStrategy::Direct);
        assert_eq!(analysis.estimated_complexity, Complexity::Medium);
    }

    #[tokio::test]
    async fn test_fallback_on_garbage_or_error() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text("I cannot classify that.");
        provider.push_error(AgentError::ProviderUnavailable("offline".into()));
        provider.push_text("   ");

        let analyzer = analyzer(&provider);
        for _ in 0..3 {
            assert_eq!(analyzer.analyze("Tell me about the Apollo program", &[]).await, QueryAnalysis::fallback());
        }
    }
}
