//! Web Search Tool
//!
//! Current information from the web through a [`SearchBackend`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use agent_core::{Result as CoreResult, Tool, ToolCall, ToolResult, ToolSchema, tool::ParameterSchema};

use crate::search::{SearchBackend, SearchDepth, SearchRequest, SearchResponse};

pub const WEB_SEARCH_TOOL: &str = "tavily_search";

const MAX_RESULTS_LIMIT: u32 = 20;

/// Tool for quick web searches
pub struct WebSearchTool {
    backend: Arc<dyn SearchBackend>,
}

impl WebSearchTool {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    /// Run one search. Never fails; backend errors become a failed result.
    pub async fn search(&self, request: &SearchRequest) -> ToolResult<SearchResponse> {
        match self.backend.search(request).await {
            Ok(mut response) => {
                response.query.clone_from(&request.query);
                ToolResult::success(response)
            }
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), query = %request.query, error = %e, "Search failed");
                ToolResult::failure(e.to_string())
            }
        }
    }
}

fn string_list(call: &ToolCall, key: &str) -> Vec<String> {
    call.arguments
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_owned).collect())
        .unwrap_or_default()
}

#[async_trait]
impl Tool for WebSearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: WEB_SEARCH_TOOL.into(),
            description: "Search the web for current information using Tavily. Use this for finding \
up-to-date information, news, facts, and general web content."
                .into(),
            parameters: vec![
                ParameterSchema::new("query", "string", "The search query to look up").required(),
                ParameterSchema::new(
                    "search_depth",
                    "string",
                    "Search depth - 'basic' for quick results, 'advanced' for more thorough search",
                )
                .default_value("basic")
                .one_of(&["basic", "advanced"]),
                ParameterSchema::new("max_results", "integer", "Maximum number of results to return (1-20)")
                    .default_value(5),
                ParameterSchema::new(
                    "include_domains",
                    "array",
                    "List of domains to specifically include in search",
                ),
                ParameterSchema::new("exclude_domains", "array", "List of domains to exclude from search"),
            ],
            category: Some("research".into()),
        }
    }

    async fn execute(&self, call: &ToolCall) -> CoreResult<ToolResult> {
        let Some(query) = call.str_arg("query") else {
            return Ok(ToolResult::failure("query is required"));
        };

        let max_results = call
            .arguments
            .get("max_results")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(5)
            .clamp(1, MAX_RESULTS_LIMIT);

        let mut request = SearchRequest::new(query)
            .depth(SearchDepth::from_label(call.str_arg("search_depth").unwrap_or("basic")))
            .max_results(max_results);
        request.include_domains = string_list(call, "include_domains");
        request.exclude_domains = string_list(call, "exclude_domains");

        Ok(self
            .search(&request)
            .await
            .map(|response| serde_json::to_value(response).unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::MockSearchBackend;

    #[tokio::test]
    async fn test_execute_builds_request() {
        let backend = Arc::new(MockSearchBackend::new());
        let tool = WebSearchTool::new(backend.clone());

        let call = ToolCall::new(WEB_SEARCH_TOOL)
            .arg("query", "rust 2024 edition")
            .arg("search_depth", "advanced")
            .arg("max_results", 50)
            .arg("exclude_domains", serde_json::json!(["spam.example"]));
        let result = tool.execute(&call).await.unwrap();

        assert!(result.success);
        let data = result.data.unwrap();
        assert_eq!(data["query"], "rust 2024 edition");
        assert_eq!(data["results"].as_array().unwrap().len(), 3);

        let sent = &backend.requests()[0];
        assert_eq!(sent.depth, SearchDepth::Advanced);
        assert_eq!(sent.max_results, 20);
        assert_eq!(sent.exclude_domains, vec!["spam.example".to_owned()]);
    }

    #[tokio::test]
    async fn test_backend_error_is_failed_result() {
        let tool = WebSearchTool::new(Arc::new(MockSearchBackend::new().fail_on("outage")));
        let result = tool.execute(&ToolCall::new(WEB_SEARCH_TOOL).arg("query", "outage")).await.unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("outage"));
    }
}
