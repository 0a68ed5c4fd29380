//! Application State

use std::sync::Arc;

use agent_core::{ChatSession, ChatStorage, Result, SessionId, SessionRegistry, SharedSession};
use research_agents::{AgentFactory, AgentMode};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Builds a fresh agent for every new session
    pub factory: Arc<AgentFactory>,

    /// Live sessions
    pub sessions: Arc<dyn SessionRegistry>,

    /// Conversation history mirrored from the sessions
    pub storage: Arc<dyn ChatStorage>,
}

impl AppState {
    /// Session for `id`, created in `mode` (or the configured mode) if new.
    ///
    /// An existing session keeps the mode it was created with.
    pub async fn session(&self, id: &SessionId, mode: Option<AgentMode>) -> Result<SharedSession> {
        let factory = self.factory.clone();
        let storage = self.storage.clone();
        let create = move |id: SessionId| -> Result<ChatSession> {
            Ok(ChatSession::new(id, factory.build(mode)?).with_storage(storage.clone()))
        };

        self.sessions.get_or_create(id, &create).await
    }
}
