//! Planner Subagent
//!
//! Turns a query into a structured, validated research plan.

use std::sync::Arc;

use agent_core::message::format_history;
use agent_core::{GenerationOptions, LlmProvider, Message, ProgressSink, Result, StepStatus, ToolResult, complete_text};

use super::prompts::PLANNER_PROMPT;
use crate::error::ResearchError;
use crate::model::ResearchPlan;
use crate::text::ellipsize;

pub const DEFAULT_PLAN_STEPS: usize = 3;

const PLAN_OPTIONS: GenerationOptions = GenerationOptions::new(0.3, 1000);

const CONTEXT_MESSAGES: usize = 5;

pub struct PlannerAgent {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
    system_prompt: String,
    num_steps: usize,
}

impl PlannerAgent {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            model: None,
            system_prompt: PLANNER_PROMPT.into(),
            num_steps: DEFAULT_PLAN_STEPS,
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

    #[must_use]
    pub const fn with_num_steps(mut self, num_steps: usize) -> Self {
        self.num_steps = num_steps;
        self
    }

    /// Produce a plan for `query`. Model and parse problems are reported as a failed result.
    pub async fn plan(&self, query: &str, context: &[Message], progress: &ProgressSink) -> Result<ToolResult<ResearchPlan>> {
        progress.progress(
            "planner_analyzing",
            StepStatus::InProgress,
            "Analyzing query to create research strategy...",
            10,
        );

        let prompt = self.prompt(query, context);

        progress.progress(
            "planner_generating",
            StepStatus::InProgress,
            format!(
                "Creating {}-step research plan for '{}'",
                self.num_steps,
                ellipsize(query, 50)
            ),
            40,
        );

        let outcome = match complete_text(
            self.provider.as_ref(),
            &prompt,
            &PLAN_OPTIONS.with_model(self.model.clone()),
        )
        .await
        {
            Ok(response) => ResearchPlan::parse(&response).map_err(|e| match e {
                ResearchError::Serialization(e) => (
                    "Failed to generate research plan",
                    format!("Failed to parse plan JSON: {e}"),
                ),
                other => ("Error during planning phase", format!("Error generating plan: {other}")),
            }),
            Err(e) => Err(("Error during planning phase", format!("Error generating plan: {e}"))),
        };

        match outcome {
            Ok(plan) => {
                tracing::debug!(steps = plan.steps.len(), goal = %plan.goal, "Research plan ready");
                progress.progress(
                    "planner_complete",
                    StepStatus::Completed,
                    format!("Research plan ready with {} steps", plan.steps.len()),
                    100,
                );
                Ok(ToolResult::success(plan))
            }
            Err((detail, error)) => {
                tracing::warn!(%error, "Planning failed");
                progress.progress("planner_error", StepStatus::Failed, detail, 100);
                Ok(ToolResult::failure(error))
            }
        }
    }

    fn prompt(&self, query: &str, context: &[Message]) -> String {
        let context = if context.is_empty() {
            String::new()
        } else {
            format!(
                "\n\nConversation Context:\n{}",
                format_history(context, CONTEXT_MESSAGES)
            )
        };

        format!(
            r#"{system}

Query: "{query}"{context}

Create a research plan that breaks down this query into {steps} specific, actionable research steps. Each step should:
1. Have a clear action (search, scrape, or analyze)
2. Include specific search queries if the action is "search"
3. Be focused on gathering specific information

Respond ONLY with a JSON object in this exact format:
{{
    "goal": "A clear statement of what we're trying to learn",
    "steps": [
        {{
            "step_number": 1,
            "action": "search",
            "description": "Brief description of what this step accomplishes",
            "search_queries": ["specific search query 1", "specific search query 2"]
        }},
        ...
    ],
    "expected_sources": 10
}}

Rules:
- Use "search" action for web searches
- Each search step should have 1-3 specific, searchable queries
- Focus on different aspects of the topic across steps
- Be specific and actionable
- Expected_sources should be your estimate of how many sources we'll need

Generate the plan now:"#,
            system = self.system_prompt,
            steps = self.num_steps,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::mock::ScriptedProvider;
    use agent_core::{AgentError, ProgressEvent};

    const PLAN: &str = r#"{
        "goal": "Compare Rust web frameworks",
        "steps": [
            {"step_number": 1, "action": "search", "description": "axum", "search_queries": ["axum features"]},
            {"step_number": 2, "action": "search", "description": "actix", "search_queries": ["actix-web features", "actix benchmarks"]},
            {"step_number": 3, "action": "analyze", "description": "Weigh trade-offs"}
        ],
        "expected_sources": 6
    }"#;

    fn last_progress(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) -> Option<ProgressEvent> {
        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        last
    }

    #[tokio::test]
    async fn test_valid_plan() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text(PLAN);
        let planner = PlannerAgent::new(provider.clone());

        let (sink, mut rx) = ProgressSink::channel();
        let history = vec![Message::user("axum or actix?")];
        let result = planner.plan("axum or actix?", &history, &sink).await.unwrap();

        let plan = result.data.unwrap();
        assert_eq!(plan.goal, "Compare Rust web frameworks");
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.expected_sources, 6);

        let prompt = &provider.requests()[0].messages[0].content;
        assert!(prompt.starts_with(PLANNER_PROMPT));
        assert!(prompt.contains("Conversation Context:\nUSER: axum or actix?"));
        assert!(prompt.contains("into 3 specific"));

        assert_eq!(last_progress(&mut rx).unwrap().step(), Some("planner_complete"));
    }

    #[tokio::test]
    async fn test_search_step_without_queries_fails() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text(
            r#"{"goal": "g", "steps": [{"step_number": 1, "action": "search", "description": "d"}], "expected_sources": 1}"#,
        );

        let (sink, mut rx) = ProgressSink::channel();
        let result = PlannerAgent::new(provider).plan("q", &[], &sink).await.unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Error generating plan: Generated plan has invalid structure"));
        match last_progress(&mut rx).unwrap() {
            ProgressEvent::Progress { step, status, detail, .. } => {
                assert_eq!(step, "planner_error");
                assert_eq!(status, StepStatus::Failed);
                assert_eq!(detail, "Error during planning phase");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_and_provider_errors() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text("Step one: search the web.");
        provider.push_error(AgentError::RateLimited("429".into()));
        let planner = PlannerAgent::new(provider);

        let garbled = planner.plan("q", &[], &ProgressSink::noop()).await.unwrap();
        assert!(garbled.error.unwrap().starts_with("Failed to parse plan JSON"));

        let failed = planner.plan("q", &[], &ProgressSink::noop()).await.unwrap();
        assert!(failed.error.unwrap().starts_with("Error generating plan: Rate limited"));
    }
}
