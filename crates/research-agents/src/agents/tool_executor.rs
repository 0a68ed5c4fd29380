//! ToolExecutor Subagent
//!
//! Runs non-search utility tools by name. New utilities are added by
//! registering them, the `execute(tool_name, arguments)` contract stays fixed.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use agent_core::tool::DATETIME_TOOL;
use agent_core::{DateTimeTool, ProgressSink, Result, StepStatus, Tool, ToolCall, ToolRegistry, ToolResult};

pub struct ToolExecutorAgent {
    tools: ToolRegistry,
    timezone: String,
}

impl ToolExecutorAgent {
    pub fn new(timezone: impl Into<String>) -> Self {
        let mut tools = ToolRegistry::new();
        tools.register(DateTimeTool);

        Self {
            tools,
            timezone: timezone.into(),
        }
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    /// Add a utility tool under its schema name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.register_shared(tool);
    }

    pub fn available_tools(&self) -> Vec<&str> {
        self.tools.names()
    }

    pub async fn execute(
        &self,
        tool_name: &str,
        mut arguments: HashMap<String, Value>,
        progress: &ProgressSink,
    ) -> Result<ToolResult> {
        let detail = if tool_name == DATETIME_TOOL {
            format!("Getting current date/time in {}", self.timezone)
        } else {
            format!("Running {tool_name}")
        };
        progress.progress("tool_executor_start", StepStatus::InProgress, detail, 10);

        if self.tools.get(tool_name).is_none() {
            progress.progress("tool_executor_error", StepStatus::Failed, "Tool not found", 100);
            return Ok(ToolResult::failure(format!(
                "Unknown tool: {tool_name}. Available tools: {}",
                self.available_tools().join(", ")
            )));
        }

        if tool_name == DATETIME_TOOL {
            arguments
                .entry("timezone".to_owned())
                .or_insert_with(|| Value::String(self.timezone.clone()));
        }

        let mut call = ToolCall::new(tool_name);
        call.arguments = arguments;

        match self.tools.execute_with_progress(&call, progress).await {
            Ok(result) => {
                progress.progress(
                    "tool_executor_complete",
                    StepStatus::Completed,
                    format!("Completed {tool_name}"),
                    100,
                );
                Ok(result)
            }
            Err(e) => {
                tracing::warn!(tool = tool_name, error = %e, "Utility tool failed");
                progress.progress(
                    "tool_executor_error",
                    StepStatus::Failed,
                    format!("Error in {tool_name}"),
                    100,
                );
                Ok(ToolResult::failure(format!("Error executing {tool_name}: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::ProgressEvent;
    use serde_json::json;

    #[tokio::test]
    async fn test_datetime_gets_configured_timezone() {
        let executor = ToolExecutorAgent::new("Asia/Tokyo");
        let (sink, mut rx) = ProgressSink::channel();

        let result = executor.execute(DATETIME_TOOL, HashMap::new(), &sink).await.unwrap();

        assert!(result.success);
        assert_eq!(result.data.unwrap()["timezone"], "Asia/Tokyo");

        let first = rx.try_recv().unwrap();
        match first {
            ProgressEvent::Progress { step, detail, .. } => {
                assert_eq!(step, "tool_executor_start");
                assert_eq!(detail, "Getting current date/time in Asia/Tokyo");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_explicit_timezone_wins() {
        let executor = ToolExecutorAgent::new("Asia/Tokyo");
        let args = HashMap::from([("timezone".to_owned(), json!("Europe/Berlin"))]);

        let result = executor.execute(DATETIME_TOOL, args, &ProgressSink::noop()).await.unwrap();
        assert_eq!(result.data.unwrap()["timezone"], "Europe/Berlin");
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_available() {
        let executor = ToolExecutorAgent::new("UTC");
        let (sink, mut rx) = ProgressSink::channel();

        let result = executor.execute("calculator", HashMap::new(), &sink).await.unwrap();

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Unknown tool: calculator. Available tools: get_current_datetime")
        );

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = event.step().map(str::to_owned);
        }
        assert_eq!(last.as_deref(), Some("tool_executor_error"));
    }
}
