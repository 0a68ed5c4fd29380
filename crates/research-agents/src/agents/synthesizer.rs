//! Result Synthesizer
//!
//! Merges subagent results into the final answer. LLM synthesis only runs
//! when there is more than one piece of evidence or something failed.

use std::sync::Arc;

use agent_core::{GenerationOptions, LlmProvider, Result, ToolTagScrubber, complete_text};

use super::prompts::SYNTHESIZER_PROMPT;
use crate::model::{QueryAnalysis, ResearchOutput, SubagentKind, SubagentOutput, SubagentResult};

pub const ALL_FAILED_MESSAGE: &str = "I apologize, but I encountered errors while researching your question. \
Please try again or rephrase your query.";

pub const PARTIAL_FAILURE_NOTE: &str = "\n\n*Note: Some research components encountered issues but I've provided \
the best answer possible with available information.*";

/// Tag names removed from synthesized prose
pub const SCRUBBED_TAGS: [&str; 6] = [
    "deep_search",
    "tavily_search",
    "web_scraper",
    "get_current_datetime",
    "planner",
    "search",
];

const SYNTHESIS_OPTIONS: GenerationOptions = GenerationOptions::new(0.7, 2000);

const MAX_LISTED_SOURCES: usize = 10;

pub struct ResultSynthesizer {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
    system_prompt: String,
    scrubber: ToolTagScrubber,
}

impl ResultSynthesizer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Result<Self> {
        Ok(Self {
            provider,
            model: None,
            system_prompt: SYNTHESIZER_PROMPT.into(),
            scrubber: ToolTagScrubber::new(SCRUBBED_TAGS)?,
        })
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

    /// Final answer for `query`. Errors only come from the synthesis model call.
    pub async fn synthesize(&self, query: &str, results: &[SubagentResult], analysis: &QueryAnalysis) -> Result<String> {
        let (successful, failed): (Vec<&SubagentResult>, Vec<&SubagentResult>) =
            results.iter().partition(|r| r.success);

        tracing::debug!(
            query_type = %analysis.query_type,
            successful = successful.len(),
            failed = failed.len(),
            "Synthesizing results"
        );

        match successful.as_slice() {
            [] => Ok(ALL_FAILED_MESSAGE.to_owned()),
            [only] if failed.is_empty() => Ok(format_single(only)),
            _ => self.llm_synthesize(query, &successful, !failed.is_empty()).await,
        }
    }

    async fn llm_synthesize(&self, query: &str, successful: &[&SubagentResult], any_failed: bool) -> Result<String> {
        let context = evidence_digest(successful);
        let prompt = format!(
            "{system}\n\nUser Query: {query}\n\nResearch Results:\n{context}\n\n\
Based on the research results above, provide a comprehensive answer to the user's query. \
Include citations to sources where appropriate.",
            system = self.system_prompt,
        );

        let response = complete_text(
            self.provider.as_ref(),
            &prompt,
            &SYNTHESIS_OPTIONS.with_model(self.model.clone()),
        )
        .await?;

        let mut answer = self.scrubber.scrub(&response);
        if any_failed {
            answer.push_str(PARTIAL_FAILURE_NOTE);
        }
        Ok(answer)
    }
}

fn format_single(result: &SubagentResult) -> String {
    match &result.data {
        Some(SubagentOutput::Research(ResearchOutput::Autonomous(research))) => research.synthesis.clone(),
        Some(SubagentOutput::Research(ResearchOutput::Guided(research))) => format!(
            "Found {} sources. Let me synthesize the information...",
            research.all_sources.len()
        ),
        Some(SubagentOutput::Tool(value)) => serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
        Some(other) => serde_json::to_string_pretty(other).unwrap_or_default(),
        None => String::new(),
    }
}

/// Plain-text evidence handed to the synthesis model
fn evidence_digest(successful: &[&SubagentResult]) -> String {
    let mut parts = Vec::new();

    for result in successful {
        match (result.subagent, &result.data) {
            (SubagentKind::ToolExecutor, Some(SubagentOutput::Tool(value))) => {
                let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
                parts.push(format!("Date/Time Information:\n{text}"));
            }
            (SubagentKind::Planner, data) => {
                let goal = match data {
                    Some(SubagentOutput::Plan(plan)) if !plan.goal.is_empty() => plan.goal.as_str(),
                    _ => "N/A",
                };
                parts.push(format!("Research Plan:\n{goal}"));
            }
            (SubagentKind::SearchScraper, Some(SubagentOutput::Research(output))) => {
                let sources = output.sources();
                parts.push(format!("Search Results: {} sources found", sources.len()));
                for (i, (title, url)) in sources.iter().take(MAX_LISTED_SOURCES).enumerate() {
                    parts.push(format!("{}. {title}\n   {url}", i + 1));
                }
            }
            _ => {}
        }
    }

    parts.join("\n\n")
}
