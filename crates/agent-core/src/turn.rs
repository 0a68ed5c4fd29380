//! Turn boundary
//!
//! Everything a caller sees of one user turn: a stream of progress events
//! closed by exactly one `response` and one `done`, or just the answer.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt, future};
use tokio::sync::Mutex;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::message::Message;
use crate::progress::{ProgressEvent, ProgressSink};

/// Answer given when a turn panics
pub const TURN_FAILED_MESSAGE: &str =
    "I apologize, but something went wrong while processing your request. Please try again.";

/// An agent that answers one user message at a time and owns its history
#[async_trait]
pub trait ChatAgent: Send {
    /// Process one message to a final answer. Never fails; errors become prose.
    async fn run_turn(&mut self, message: &str, progress: &ProgressSink) -> String;

    /// Forget the conversation
    fn reset(&mut self);

    /// Conversation so far
    fn history(&self) -> &[Message];
}

async fn guarded_turn<A: ChatAgent + ?Sized>(agent: &mut A, message: &str, progress: &ProgressSink) -> String {
    match AssertUnwindSafe(agent.run_turn(message, progress)).catch_unwind().await {
        Ok(answer) => answer,
        Err(_) => {
            tracing::error!("Agent panicked during turn");
            TURN_FAILED_MESSAGE.to_owned()
        }
    }
}

/// Run a turn, yielding its progress events as they happen
pub fn stream_turn<'a, A: ChatAgent + ?Sized>(agent: &'a mut A, message: &'a str) -> BoxStream<'a, ProgressEvent> {
    let (sink, rx) = ProgressSink::channel();

    let work = async move {
        let content = guarded_turn(agent, message, &sink).await;
        sink.emit(ProgressEvent::Response { content });
        sink.emit(ProgressEvent::Done);
    };

    // The channel closes once the work future drops the last sender
    stream::select(
        UnboundedReceiverStream::new(rx),
        stream::once(work).filter_map(|()| future::ready(None)),
    )
    .boxed()
}

/// Run a turn on its own task, yielding its progress events.
///
/// The turn runs to completion even if the stream is dropped, so the agent's
/// history never ends halfway through a tool exchange.
pub fn spawn_turn<A: ChatAgent + 'static>(agent: Arc<Mutex<A>>, message: String) -> BoxStream<'static, ProgressEvent> {
    let (sink, rx) = ProgressSink::channel();

    tokio::spawn(async move {
        let mut agent = agent.lock().await;
        let content = guarded_turn(&mut *agent, &message, &sink).await;
        sink.emit(ProgressEvent::Response { content });
        sink.emit(ProgressEvent::Done);
    });

    UnboundedReceiverStream::new(rx).boxed()
}

/// Run a turn and return only the answer
pub async fn chat<A: ChatAgent + ?Sized>(agent: &mut A, message: &str) -> String {
    guarded_turn(agent, message, &ProgressSink::noop()).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::message::Role;
    use crate::mock::ScriptedProvider;
    use crate::progress::StepStatus;
    use crate::reasoning::AgentBuilder;
    use crate::tool::{Tool, ToolCall, ToolResult, ToolSchema};

    struct EchoAgent {
        history: Vec<Message>,
    }

    #[async_trait]
    impl ChatAgent for EchoAgent {
        async fn run_turn(&mut self, message: &str, progress: &ProgressSink) -> String {
            progress.progress("echo", StepStatus::InProgress, "Echoing...", 50);
            self.history.push(Message::user(message));
            format!("echo: {message}")
        }

        fn reset(&mut self) {
            self.history.clear();
        }

        fn history(&self) -> &[Message] {
            &self.history
        }
    }

    struct PanickingAgent;

    #[async_trait]
    impl ChatAgent for PanickingAgent {
        async fn run_turn(&mut self, _message: &str, _progress: &ProgressSink) -> String {
            panic!("boom")
        }

        fn reset(&mut self) {}

        fn history(&self) -> &[Message] {
            &[]
        }
    }

    #[tokio::test]
    async fn test_stream_ends_with_response_then_done() {
        let mut agent = EchoAgent { history: Vec::new() };
        let events: Vec<_> = stream_turn(&mut agent, "hi").collect().await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].step(), Some("echo"));
        assert_eq!(events[1], ProgressEvent::Response { content: "echo: hi".into() });
        assert_eq!(events[2], ProgressEvent::Done);
        assert_eq!(agent.history().len(), 1);
    }

    #[tokio::test]
    async fn test_panic_still_terminates_stream() {
        let mut agent = PanickingAgent;
        let events: Vec<_> = stream_turn(&mut agent, "hi").collect().await;

        assert_eq!(
            events,
            vec![
                ProgressEvent::Response { content: TURN_FAILED_MESSAGE.into() },
                ProgressEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_chat_returns_answer_only() {
        let mut agent = EchoAgent { history: Vec::new() };
        assert_eq!(chat(&mut agent, "x").await, "echo: x");
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "slow_lookup".into(),
                description: "Takes a while".into(),
                parameters: Vec::new(),
                category: None,
            }
        }

        async fn execute(&self, _call: &ToolCall) -> crate::Result<ToolResult> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(ToolResult::success(serde_json::json!({"value": 42})))
        }
    }

    #[tokio::test]
    async fn test_spawned_turn_streams_to_done() {
        let agent = Arc::new(Mutex::new(EchoAgent { history: Vec::new() }));
        let events: Vec<_> = spawn_turn(agent.clone(), "hi".into()).collect().await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[2], ProgressEvent::Done);
        assert_eq!(agent.lock().await.history().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_stream_does_not_cut_turn_short() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_tool_calls(vec![ToolCall::new("slow_lookup").with_id("call_1")]);
        provider.push_text("Finished.");
        let agent = AgentBuilder::new().provider(provider).tool(SlowTool).build().unwrap();
        let agent = Arc::new(Mutex::new(agent));

        let mut events = spawn_turn(agent.clone(), "look it up".into());
        while let Some(event) = events.next().await {
            if matches!(event, ProgressEvent::ToolStart { .. }) {
                break;
            }
        }
        drop(events);

        // The turn task holds the lock until the turn is over
        let agent = agent.lock().await;
        let roles: Vec<_> = agent.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(agent.history()[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(agent.history()[3].content, "Finished.");
    }
}
