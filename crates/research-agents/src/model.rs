//! Domain Models
//!
//! Routing decisions, research plans and the results subagents hand back
//! to the dispatcher.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use agent_core::ToolResult;

use crate::error::{ResearchError, Result};
use crate::search::{SearchHit, SearchResponse};
use crate::svckit::{DeepResearch, ScrapedPage};
use crate::text::outer_span;

/// What kind of question the user asked
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// "What is...?", single concept questions
    SimpleFact,
    /// Current information, news, updates
    SimpleSearch,
    ComplexResearch,
    TimeBased,
    Comparison,
    General,
}

impl QueryType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SimpleFact => "simple_fact",
            Self::SimpleSearch => "simple_search",
            Self::ComplexResearch => "complex_research",
            Self::TimeBased => "time_based",
            Self::Comparison => "comparison",
            Self::General => "general",
        }
    }

    /// Parse a model-provided label; anything unrecognised is `General`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "simple_fact" => Self::SimpleFact,
            "simple_search" => Self::SimpleSearch,
            "complex_research" => Self::ComplexResearch,
            "time_based" => Self::TimeBased,
            "comparison" => Self::Comparison,
            _ => Self::General,
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the dispatcher runs the required subagents
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// tool_executor -> planner -> search_scraper, plan threaded forward
    Sequential,
    /// tool_executor and search_scraper concurrently, no plan
    Parallel,
    /// Runs as `Sequential`
    Conditional,
    /// search_scraper alone, autonomous
    Direct,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    /// Parse a model-provided label; anything unrecognised is `Medium`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }
}

/// The subagents the dispatcher knows about
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentKind {
    Planner,
    SearchScraper,
    ToolExecutor,
}

impl SubagentKind {
    /// Name used as the `source` of progress events
    pub const fn agent_name(self) -> &'static str {
        match self {
            Self::Planner => "planner_agent",
            Self::SearchScraper => "search_scraper_agent",
            Self::ToolExecutor => "tool_executor_agent",
        }
    }
}

impl fmt::Display for SubagentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.agent_name())
    }
}

/// Routing decision for one incoming message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub query_type: QueryType,
    pub requires_planning: bool,
    /// Ordered, no duplicates
    pub required_subagents: Vec<SubagentKind>,
    pub execution_strategy: ExecutionStrategy,
    pub estimated_complexity: Complexity,
    /// 0.0 - 1.0
    pub confidence: f32,
}

impl QueryAnalysis {
    pub fn new(
        query_type: QueryType,
        requires_planning: bool,
        required_subagents: &[SubagentKind],
        execution_strategy: ExecutionStrategy,
        estimated_complexity: Complexity,
        confidence: f32,
    ) -> Self {
        let mut subagents = Vec::with_capacity(required_subagents.len());
        for kind in required_subagents {
            if !subagents.contains(kind) {
                subagents.push(*kind);
            }
        }

        Self {
            query_type,
            requires_planning,
            required_subagents: subagents,
            execution_strategy,
            estimated_complexity,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Used whenever classification cannot be trusted
    pub fn fallback() -> Self {
        Self::new(
            QueryType::General,
            false,
            &[SubagentKind::SearchScraper],
            ExecutionStrategy::Direct,
            Complexity::Medium,
            0.5,
        )
    }

    pub fn requires(&self, kind: SubagentKind) -> bool {
        self.required_subagents.contains(&kind)
    }
}

/// One step of a research plan
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Informational; steps run in list order
    pub step_number: u32,
    pub action: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_queries: Vec<String>,
}

impl PlanStep {
    pub fn is_search(&self) -> bool {
        self.action == "search"
    }
}

/// Structured research plan produced by the planner
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResearchPlan {
    pub goal: String,
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub expected_sources: u32,
}

const REQUIRED_STEP_FIELDS: [&str; 3] = ["step_number", "action", "description"];

impl ResearchPlan {
    /// Parse model output into a validated plan.
    ///
    /// Prose around the outermost JSON object is ignored. JSON syntax errors
    /// come back as [`ResearchError::Serialization`], structural problems as
    /// [`ResearchError::InvalidPlan`].
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(outermost_object(text))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        validate_plan(&value)?;
        serde_json::from_value(value).map_err(|e| ResearchError::InvalidPlan(e.to_string()))
    }

    /// Every search query in plan order
    pub fn search_queries(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .filter(|s| s.is_search())
            .flat_map(|s| s.search_queries.iter().map(String::as_str))
    }
}

fn outermost_object(text: &str) -> &str {
    outer_span(text, '{', '}').unwrap_or_else(|| text.trim())
}

fn validate_plan(value: &Value) -> Result<()> {
    let invalid = |reason: String| Err(ResearchError::InvalidPlan(reason));

    let Some(plan) = value.as_object() else {
        return invalid("plan is not an object".into());
    };
    if !plan.contains_key("goal") || !plan.contains_key("steps") {
        return invalid("missing goal or steps".into());
    }
    let Some(steps) = plan["steps"].as_array() else {
        return invalid("steps is not a list".into());
    };

    for (idx, step) in steps.iter().enumerate() {
        let Some(step) = step.as_object() else {
            return invalid(format!("step {} is not an object", idx + 1));
        };
        if let Some(field) = REQUIRED_STEP_FIELDS.iter().find(|f| !step.contains_key(**f)) {
            return invalid(format!("step {} is missing {field}", idx + 1));
        }
        if step["action"] == "search" {
            let has_queries = step
                .get("search_queries")
                .and_then(Value::as_array)
                .is_some_and(|queries| !queries.is_empty());
            if !has_queries {
                return invalid(format!("search step {} has no search_queries", idx + 1));
            }
        }
    }

    Ok(())
}

/// Aggregate of a plan-guided research run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuidedResearch {
    pub query: String,
    pub plan: ResearchPlan,
    pub searches_performed: usize,
    pub pages_scraped: usize,
    /// One entry per issued search query, in plan order
    pub results: Vec<ToolResult<SearchResponse>>,
    pub all_sources: Vec<SearchHit>,
    pub scraped_content: Vec<ScrapedPage>,
}

/// What the search-scraper produced
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResearchOutput {
    Guided(GuidedResearch),
    Autonomous(DeepResearch),
}

impl ResearchOutput {
    /// Finished prose, if the run produced one
    pub fn synthesis(&self) -> Option<&str> {
        match self {
            Self::Guided(_) => None,
            Self::Autonomous(research) => Some(&research.synthesis),
        }
    }

    /// `(title, url)` of every source found
    pub fn sources(&self) -> Vec<(&str, &str)> {
        match self {
            Self::Guided(research) => research
                .all_sources
                .iter()
                .map(|s| (s.title.as_str(), s.url.as_str()))
                .collect(),
            Self::Autonomous(research) => research
                .sources
                .iter()
                .map(|s| (s.title.as_str(), s.url.as_str()))
                .collect(),
        }
    }
}

/// Payload of a successful subagent run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum SubagentOutput {
    /// Raw tool output from the tool executor
    Tool(Value),
    Plan(ResearchPlan),
    Research(ResearchOutput),
}

impl From<Value> for SubagentOutput {
    fn from(value: Value) -> Self {
        Self::Tool(value)
    }
}

impl From<ResearchPlan> for SubagentOutput {
    fn from(plan: ResearchPlan) -> Self {
        Self::Plan(plan)
    }
}

impl From<ResearchOutput> for SubagentOutput {
    fn from(output: ResearchOutput) -> Self {
        Self::Research(output)
    }
}

/// Outcome of one subagent execution, success or not
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubagentResult {
    pub subagent: SubagentKind,
    pub success: bool,
    pub data: Option<SubagentOutput>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl SubagentResult {
    pub fn from_tool_result<T: Into<SubagentOutput>>(subagent: SubagentKind, result: ToolResult<T>) -> Self {
        Self {
            subagent,
            success: result.success,
            data: result.data.map(Into::into),
            error: result.error,
            metadata: None,
        }
    }

    pub fn failed(subagent: SubagentKind, error: impl Into<String>) -> Self {
        Self {
            subagent,
            success: false,
            data: None,
            error: Some(error.into()),
            metadata: None,
        }
    }

    pub fn plan(&self) -> Option<&ResearchPlan> {
        match &self.data {
            Some(SubagentOutput::Plan(plan)) if self.success => Some(plan),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan_json() -> Value {
        json!({
            "goal": "Understand Rust async runtimes",
            "steps": [
                {"step_number": 1, "action": "search", "description": "Survey", "search_queries": ["rust async runtimes"]},
                {"step_number": 2, "action": "search", "description": "Compare", "search_queries": ["tokio vs async-std", "smol runtime"]},
                {"step_number": 3, "action": "analyze", "description": "Summarize trade-offs"}
            ],
            "expected_sources": 8
        })
    }

    #[test]
    fn test_complete_plan_accepted() {
        let plan = ResearchPlan::from_value(plan_json()).unwrap();
        assert_eq!(plan.goal, "Understand Rust async runtimes");
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.search_queries().count(), 3);
    }

    #[test]
    fn test_search_step_without_queries_rejected() {
        let mut value = plan_json();
        value["steps"][0].as_object_mut().unwrap().remove("search_queries");
        assert!(matches!(ResearchPlan::from_value(value), Err(ResearchError::InvalidPlan(_))));

        let mut value = plan_json();
        value["steps"][1]["search_queries"] = json!([]);
        assert!(matches!(ResearchPlan::from_value(value), Err(ResearchError::InvalidPlan(_))));
    }

    #[test]
    fn test_structural_problems_rejected() {
        assert!(ResearchPlan::from_value(json!({"steps": []})).is_err());
        assert!(ResearchPlan::from_value(json!({"goal": "x", "steps": "later"})).is_err());
        assert!(ResearchPlan::from_value(json!({"goal": "x", "steps": [{"action": "search"}]})).is_err());
    }

    #[test]
    fn test_parse_ignores_surrounding_prose() {
        let text = format!("Here is the plan:\n```json\n{}\n```", plan_json());
        let plan = ResearchPlan::parse(&text).unwrap();
        assert_eq!(plan.expected_sources, 8);

        assert!(matches!(ResearchPlan::parse("no plan today"), Err(ResearchError::Serialization(_))));
    }

    #[test]
    fn test_analysis_dedupes_subagents() {
        let analysis = QueryAnalysis::new(
            QueryType::Comparison,
            true,
            &[SubagentKind::Planner, SubagentKind::Planner, SubagentKind::SearchScraper],
            ExecutionStrategy::Sequential,
            Complexity::High,
            1.5,
        );
        assert_eq!(analysis.required_subagents, vec![SubagentKind::Planner, SubagentKind::SearchScraper]);
        assert!((analysis.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_labels() {
        assert_eq!(QueryType::from_label("Time_Based"), QueryType::TimeBased);
        assert_eq!(QueryType::from_label("poetry"), QueryType::General);
        assert_eq!(Complexity::from_label("HIGH"), Complexity::High);
        assert_eq!(
            serde_json::to_value(SubagentKind::SearchScraper).unwrap(),
            json!("search_scraper")
        );
    }
}
