//! Progress Reporting
//!
//! Events emitted while a turn is being processed. They are notifications
//! only; nothing downstream of a sink can influence the agent that emitted
//! them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Status of a reported step
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    InProgress,
    Completed,
    Failed,
}

/// A single progress notification
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A named step changed state
    Progress {
        step: String,
        status: StepStatus,
        detail: String,
        /// 0-100
        progress: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    /// The model asked for a tool
    ToolCall {
        tool: String,
        #[serde(default)]
        arguments: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    /// Tool execution started
    ToolStart {
        tool: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    /// Tool execution finished
    ToolEnd {
        tool: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    /// The model is working
    Thinking {
        detail: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    /// Final answer for the turn
    Response { content: String },
    /// Terminates the event stream of a turn
    Done,
}

impl ProgressEvent {
    pub fn progress(step: impl Into<String>, status: StepStatus, detail: impl Into<String>, progress: u8) -> Self {
        Self::Progress {
            step: step.into(),
            status,
            detail: detail.into(),
            progress: progress.min(100),
            source: None,
        }
    }

    /// Attribution of the event, if any
    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Progress { source, .. }
            | Self::ToolCall { source, .. }
            | Self::ToolStart { source, .. }
            | Self::ToolEnd { source, .. }
            | Self::Thinking { source, .. } => source.as_deref(),
            Self::Response { .. } | Self::Done => None,
        }
    }

    /// Stamp a source unless one is already set
    fn attribute(&mut self, name: &str) {
        match self {
            Self::Progress { source, .. }
            | Self::ToolCall { source, .. }
            | Self::ToolStart { source, .. }
            | Self::ToolEnd { source, .. }
            | Self::Thinking { source, .. } => {
                if source.is_none() {
                    *source = Some(name.to_owned());
                }
            }
            Self::Response { .. } | Self::Done => {}
        }
    }

    /// Step name for `progress` events
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::Progress { step, .. } => Some(step),
            _ => None,
        }
    }
}

/// Where progress events go.
///
/// A default sink drops everything. Clones share the same receiver.
#[derive(Clone, Debug, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
    source: Option<Arc<str>>,
}

impl ProgressSink {
    /// A sink that discards every event
    pub fn noop() -> Self {
        Self::default()
    }

    /// A sink backed by an unbounded channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                source: None,
            },
            rx,
        )
    }

    /// Scoped sink that attributes events to `name`
    #[must_use]
    pub fn with_source(&self, name: &str) -> Self {
        Self {
            tx: self.tx.clone(),
            source: Some(Arc::from(name)),
        }
    }

    /// Whether anything is listening
    pub fn is_active(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub fn emit(&self, mut event: ProgressEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Some(source) = &self.source {
            event.attribute(source);
        }
        // A closed receiver just means nobody is listening anymore
        let _ = tx.send(event);
    }

    pub fn progress(&self, step: &str, status: StepStatus, detail: impl Into<String>, progress: u8) {
        self.emit(ProgressEvent::progress(step, status, detail, progress));
    }

    pub fn thinking(&self, detail: impl Into<String>) {
        self.emit(ProgressEvent::Thinking {
            detail: detail.into(),
            source: None,
        });
    }

    pub fn tool_call(&self, tool: &str, arguments: Value) {
        self.emit(ProgressEvent::ToolCall {
            tool: tool.to_owned(),
            arguments,
            source: None,
        });
    }

    pub fn tool_start(&self, tool: &str) {
        self.emit(ProgressEvent::ToolStart {
            tool: tool.to_owned(),
            source: None,
        });
    }

    pub fn tool_end(&self, tool: &str, success: bool) {
        self.emit(ProgressEvent::ToolEnd {
            tool: tool.to_owned(),
            success,
            source: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let event = ProgressEvent::progress("analyzing", StepStatus::InProgress, "Analyzing your question...", 5);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(
            json,
            json!({
                "type": "progress",
                "step": "analyzing",
                "status": "in_progress",
                "detail": "Analyzing your question...",
                "progress": 5,
            })
        );
        assert_eq!(serde_json::to_value(ProgressEvent::Done).unwrap(), json!({"type": "done"}));
    }

    #[test]
    fn test_unknown_event_type_rejected() {
        let result = serde_json::from_value::<ProgressEvent>(json!({"type": "telemetry", "detail": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_noop_sink_is_safe() {
        let sink = ProgressSink::noop();
        assert!(!sink.is_active());
        sink.progress("anything", StepStatus::Completed, "ignored", 100);
    }

    #[tokio::test]
    async fn test_scoped_sink_stamps_source() {
        let (sink, mut rx) = ProgressSink::channel();
        let planner = sink.with_source("planner_agent");

        planner.progress("planner_analyzing", StepStatus::InProgress, "Analyzing query...", 10);
        planner.with_source("master_agent").emit(ProgressEvent::Progress {
            step: "inner".into(),
            status: StepStatus::Completed,
            detail: String::new(),
            progress: 100,
            source: Some("tool".into()),
        });
        sink.thinking("plain");

        assert_eq!(rx.recv().await.unwrap().source(), Some("planner_agent"));
        assert_eq!(rx.recv().await.unwrap().source(), Some("tool"));
        assert_eq!(rx.recv().await.unwrap().source(), None);
    }

    #[test]
    fn test_progress_is_clamped() {
        let event = ProgressEvent::progress("x", StepStatus::InProgress, "", 250);
        assert!(matches!(event, ProgressEvent::Progress { progress: 100, .. }));
    }
}
