//! Tool System
//!
//! Extensible tool framework for agent capabilities.
//! Tools are registered at runtime by name and invoked either by the
//! tool-calling loop or directly by subagents.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{AgentError, Result};
use crate::progress::ProgressSink;

fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID for pairing the request with its result
    #[serde(default = "new_call_id")]
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub arguments: HashMap<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_call_id(),
            name: name.into(),
            arguments: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[must_use]
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Fetch a string argument
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }

    /// Arguments as a JSON object (for provider wire formats)
    pub fn arguments_json(&self) -> Value {
        Value::Object(
            self.arguments
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        )
    }
}

/// Uniform success/data/error envelope returned by every tool and subagent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult<T = Value> {
    /// Whether execution succeeded
    pub success: bool,

    /// Payload on success
    #[serde(default = "Option::default")]
    pub data: Option<T>,

    /// Error description on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ToolResult<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Transform the payload, keeping the envelope
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ToolResult<U> {
        ToolResult {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
        }
    }
}

impl ToolResult<Value> {
    /// Render as the text handed back to the model
    pub fn render(&self) -> String {
        if self.success {
            let data = self.data.clone().unwrap_or(Value::Null);
            serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string())
        } else {
            json!({ "error": self.error.clone().unwrap_or_default() }).to_string()
        }
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, integer, boolean, object)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    pub fn new(name: impl Into<String>, param_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: false,
            default: None,
            enum_values: None,
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    #[must_use]
    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| json!(v)).collect());
        self
    }
}

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Category for grouping
    #[serde(default)]
    pub category: Option<String>,
}

impl ToolSchema {
    /// JSON Schema object describing the parameters
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut prop = json!({
                "type": param.param_type,
                "description": param.description,
            });
            if let Some(default) = &param.default {
                prop["default"] = default.clone();
            }
            if let Some(values) = &param.enum_values {
                prop["enum"] = Value::Array(values.clone());
            }
            // Arrays are lists of strings
            if param.param_type == "array" {
                prop["items"] = json!({ "type": "string" });
            }
            properties.insert(param.name.clone(), prop);
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema for LLM function calling
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments.
    ///
    /// Ordinary failures (bad query, unreachable URL, empty result) are
    /// reported as a failed [`ToolResult`]; `Err` is reserved for faults.
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult>;

    /// Execute while reporting sub-progress. Tools with nested stages override this.
    async fn execute_with_progress(&self, call: &ToolCall, _progress: &ProgressSink) -> Result<ToolResult> {
        self.execute(call).await
    }

    /// Validate arguments before execution (optional)
    fn validate(&self, call: &ToolCall) -> Result<()> {
        let schema = self.schema();

        for param in &schema.parameters {
            if param.required && !call.arguments.contains_key(&param.name) {
                return Err(AgentError::ToolValidation(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }

        Ok(())
    }
}

/// Registry for available tools, keyed by name
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_shared(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        self.tools.insert(schema.name, tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Execute a tool call
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        self.execute_with_progress(call, &ProgressSink::noop()).await
    }

    /// Execute a tool call, forwarding the tool's own progress events
    pub async fn execute_with_progress(&self, call: &ToolCall, progress: &ProgressSink) -> Result<ToolResult> {
        let tool = self.get(&call.name).ok_or_else(|| {
            AgentError::ToolNotFound(call.name.clone())
        })?;

        tool.validate(call)?;
        tool.execute_with_progress(call, progress).await
    }

    /// Get all tool schemas
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    /// Get tool names (sorted)
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ============================================================================
// Built-in Tools
// ============================================================================

/// Name under which [`DateTimeTool`] registers
pub const DATETIME_TOOL: &str = "get_current_datetime";

const MAX_RELATIVE_DAYS: i64 = 36_500;

/// DateTime tool - current date/time in a timezone, plus relative dates
pub struct DateTimeTool;

#[async_trait]
impl Tool for DateTimeTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: DATETIME_TOOL.into(),
            description: "Get the current date and time information. Use this tool when you need to know \
today's date for time-sensitive queries, calculate relative dates like \"yesterday\" or \"last week\", \
or format dates for search queries."
                .into(),
            parameters: vec![
                ParameterSchema::new(
                    "timezone",
                    "string",
                    "Timezone name (e.g., 'UTC', 'America/New_York', 'Asia/Tokyo'). Defaults to UTC.",
                )
                .default_value("UTC"),
                ParameterSchema::new(
                    "format",
                    "string",
                    "Output format: 'full', 'date_only' (YYYY-MM-DD), 'iso', or 'search_friendly'",
                )
                .default_value("full")
                .one_of(&["full", "date_only", "iso", "search_friendly"]),
                ParameterSchema::new(
                    "relative_days",
                    "integer",
                    "Calculate a date relative to today. Negative for past dates (-1 for yesterday).",
                ),
            ],
            category: Some("time".into()),
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let requested = call.str_arg("timezone").unwrap_or("UTC");
        let (tz, tz_name) = requested
            .parse::<Tz>()
            .map_or((Tz::UTC, "UTC"), |tz| (tz, requested));

        let format = call.str_arg("format").unwrap_or("full");
        let relative_days = call
            .arguments
            .get("relative_days")
            .and_then(Value::as_i64)
            .map(|d| d.clamp(-MAX_RELATIVE_DAYS, MAX_RELATIVE_DAYS));

        let now = Utc::now().with_timezone(&tz);
        let target = relative_days.map_or(now, |days| now + Duration::days(days));

        let formatted = match format {
            "date_only" => target.format("%Y-%m-%d").to_string(),
            "iso" => target.to_rfc3339(),
            "search_friendly" => target.format("%B %d, %Y").to_string(),
            _ => target.format("%A, %B %d, %Y at %I:%M %p %Z").to_string(),
        };

        let mut data = json!({
            "current_datetime": now.to_rfc3339(),
            "formatted": formatted,
            "timezone": tz_name,
            "date_components": {
                "year": target.format("%Y").to_string().parse::<i32>().unwrap_or_default(),
                "month": target.format("%m").to_string().parse::<u32>().unwrap_or_default(),
                "month_name": target.format("%B").to_string(),
                "day": target.format("%d").to_string().parse::<u32>().unwrap_or_default(),
                "weekday": target.format("%A").to_string(),
                "hour": target.format("%H").to_string().parse::<u32>().unwrap_or_default(),
                "minute": target.format("%M").to_string().parse::<u32>().unwrap_or_default(),
            },
            "relative_dates": {
                "yesterday": (now - Duration::days(1)).format("%Y-%m-%d").to_string(),
                "last_week": (now - Duration::days(7)).format("%Y-%m-%d").to_string(),
                "last_month": (now - Duration::days(30)).format("%Y-%m-%d").to_string(),
                "tomorrow": (now + Duration::days(1)).format("%Y-%m-%d").to_string(),
            },
        });

        if let Some(days) = relative_days {
            data["calculated_date"] = json!(target.format("%Y-%m-%d").to_string());
            data["days_offset"] = json!(days);
        }

        Ok(ToolResult::success(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_datetime_unknown_timezone_falls_back_to_utc() {
        let call = ToolCall::new(DATETIME_TOOL).arg("timezone", "Mars/Olympus_Mons");
        let result = DateTimeTool.execute(&call).await.unwrap();

        assert!(result.success);
        assert_eq!(result.data.unwrap()["timezone"], "UTC");
    }

    #[tokio::test]
    async fn test_datetime_relative_days() {
        let call = ToolCall::new(DATETIME_TOOL)
            .arg("timezone", "Asia/Tokyo")
            .arg("format", "date_only")
            .arg("relative_days", -1);
        let data = DateTimeTool.execute(&call).await.unwrap().data.unwrap();

        assert_eq!(data["timezone"], "Asia/Tokyo");
        assert_eq!(data["days_offset"], -1);
        assert_eq!(data["calculated_date"], data["relative_dates"]["yesterday"]);
        assert_eq!(data["formatted"], data["calculated_date"]);
    }

    #[test]
    fn test_tool_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(DateTimeTool);

        assert_eq!(registry.len(), 1);
        assert!(registry.get(DATETIME_TOOL).is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.names(), vec![DATETIME_TOOL]);
    }

    #[tokio::test]
    async fn test_registry_unknown_tool_is_an_error() {
        let registry = ToolRegistry::new();
        let err = registry.execute(&ToolCall::new("nope")).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolNotFound(name) if name == "nope"));
    }

    #[test]
    fn test_json_schema_lists_required_parameters() {
        let schema = ToolSchema {
            name: "lookup".into(),
            description: "Look something up".into(),
            parameters: vec![
                ParameterSchema::new("query", "string", "What to look up").required(),
                ParameterSchema::new("depth", "string", "How deep").one_of(&["basic", "advanced"]),
            ],
            category: None,
        };

        let json = schema.to_json_schema();
        assert_eq!(json["type"], "object");
        assert_eq!(json["required"], json!(["query"]));
        assert_eq!(json["properties"]["depth"]["enum"], json!(["basic", "advanced"]));
    }

    #[test]
    fn test_tool_result_render() {
        let ok = ToolResult::success(json!({"a": 1}));
        assert!(ok.render().contains("\"a\": 1"));

        let failed: ToolResult = ToolResult::failure("boom");
        assert_eq!(failed.render(), r#"{"error":"boom"}"#);
    }

    #[test]
    fn test_tool_result_payload_needs_no_default() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Hit {
            url: String,
        }

        let failed: ToolResult<Hit> = serde_json::from_str(r#"{"success":false,"error":"timeout"}"#).unwrap();
        assert_eq!(failed.data, None);
        assert_eq!(failed.error.as_deref(), Some("timeout"));

        let ok: ToolResult<Hit> = serde_json::from_str(r#"{"success":true,"data":{"url":"https://a"}}"#).unwrap();
        assert_eq!(ok.data.unwrap().url, "https://a");
    }
}
