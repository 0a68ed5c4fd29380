//! Session Management
//!
//! Live agent sessions keyed by id. Each session owns one agent and, when
//! storage is configured, mirrors user messages and final answers into it.
//! Idle sessions expire; when full, the least recently used one is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::history::ChatStorage;
use crate::message::{Message, Role};
use crate::progress::ProgressSink;
use crate::turn::ChatAgent;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live conversation: an agent plus its optional storage binding
pub struct ChatSession {
    id: SessionId,
    agent: Box<dyn ChatAgent>,
    storage: Option<Arc<dyn ChatStorage>>,
}

impl ChatSession {
    pub fn new(id: SessionId, agent: Box<dyn ChatAgent>) -> Self {
        Self {
            id,
            agent,
            storage: None,
        }
    }

    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn ChatStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    async fn record_user_message(id: &SessionId, storage: &dyn ChatStorage, message: &str) -> Result<()> {
        let id = id.as_str();
        let untitled = storage
            .get_conversation(id)
            .await?
            .is_none_or(|c| c.title.is_none());

        storage.create_conversation(id, None, None).await?;
        storage.add_message(id, Role::User, message, None).await?;
        if untitled {
            storage.generate_title(id, message).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChatAgent for ChatSession {
    async fn run_turn(&mut self, message: &str, progress: &ProgressSink) -> String {
        let storage = self.storage.clone();

        if let Some(storage) = &storage {
            if let Err(e) = Self::record_user_message(&self.id, storage.as_ref(), message).await {
                tracing::warn!(session = %self.id, error = %e, "Failed to store user message");
            }
        }

        let answer = self.agent.run_turn(message, progress).await;

        if let Some(storage) = &storage {
            if let Err(e) = storage
                .add_message(self.id.as_str(), Role::Assistant, &answer, None)
                .await
            {
                tracing::warn!(session = %self.id, error = %e, "Failed to store assistant message");
            }
        }

        answer
    }

    fn reset(&mut self) {
        self.agent.reset();
    }

    fn history(&self) -> &[Message] {
        self.agent.history()
    }
}

/// A session shared between the registry and in-flight requests
pub type SharedSession = Arc<Mutex<ChatSession>>;

/// Builds the session for an id not seen before
pub type SessionFactory = dyn Fn(SessionId) -> Result<ChatSession> + Send + Sync;

/// Registry of live sessions
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Existing session, or a new one from `factory`
    async fn get_or_create(&self, id: &SessionId, factory: &SessionFactory) -> Result<SharedSession>;

    /// Existing session only
    async fn get(&self, id: &SessionId) -> Option<SharedSession>;

    /// Clear a session's history; false if unknown
    async fn reset(&self, id: &SessionId) -> bool;

    /// Drop a session; false if unknown
    async fn remove(&self, id: &SessionId) -> bool;

    /// Drop idle sessions, returning how many went
    async fn evict_idle(&self) -> usize;

    /// Number of live sessions
    async fn len(&self) -> usize;
}

struct Slot {
    session: SharedSession,
    last_used: Instant,
}

/// In-memory session registry with idle expiry and LRU eviction
pub struct MemorySessionRegistry {
    slots: Mutex<HashMap<SessionId, Slot>>,
    idle_ttl: Duration,
    capacity: usize,
}

impl MemorySessionRegistry {
    pub fn new(idle_ttl: Duration, capacity: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            idle_ttl,
            capacity: capacity.max(1),
        }
    }

    fn purge_expired(&self, slots: &mut HashMap<SessionId, Slot>) -> usize {
        let before = slots.len();
        slots.retain(|_, slot| slot.last_used.elapsed() < self.idle_ttl);
        before - slots.len()
    }
}

#[async_trait]
impl SessionRegistry for MemorySessionRegistry {
    async fn get_or_create(&self, id: &SessionId, factory: &SessionFactory) -> Result<SharedSession> {
        let mut slots = self.slots.lock().await;
        self.purge_expired(&mut slots);

        if let Some(slot) = slots.get_mut(id) {
            slot.last_used = Instant::now();
            return Ok(slot.session.clone());
        }

        if slots.len() >= self.capacity {
            let oldest = slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                tracing::debug!(session = %oldest, "Evicting least recently used session");
                slots.remove(&oldest);
            }
        }

        let session = factory(id.clone())?;
        if session.id() != id {
            return Err(AgentError::Session(format!(
                "Factory built session {} for {id}",
                session.id()
            )));
        }

        let shared = Arc::new(Mutex::new(session));
        slots.insert(
            id.clone(),
            Slot {
                session: shared.clone(),
                last_used: Instant::now(),
            },
        );
        tracing::debug!(session = %id, live = slots.len(), "Session created");
        Ok(shared)
    }

    async fn get(&self, id: &SessionId) -> Option<SharedSession> {
        let mut slots = self.slots.lock().await;
        let slot = slots.get_mut(id)?;
        slot.last_used = Instant::now();
        Some(slot.session.clone())
    }

    async fn reset(&self, id: &SessionId) -> bool {
        let Some(session) = self.get(id).await else {
            return false;
        };
        session.lock().await.reset();
        true
    }

    async fn remove(&self, id: &SessionId) -> bool {
        self.slots.lock().await.remove(id).is_some()
    }

    async fn evict_idle(&self) -> usize {
        let mut slots = self.slots.lock().await;
        self.purge_expired(&mut slots)
    }

    async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryChatStorage;

    struct CountingAgent {
        history: Vec<Message>,
    }

    #[async_trait]
    impl ChatAgent for CountingAgent {
        async fn run_turn(&mut self, message: &str, _progress: &ProgressSink) -> String {
            self.history.push(Message::user(message));
            let answer = format!("answer {}", self.history.len());
            self.history.push(Message::assistant(&answer));
            answer
        }

        fn reset(&mut self) {
            self.history.clear();
        }

        fn history(&self) -> &[Message] {
            &self.history
        }
    }

    fn factory(id: SessionId) -> Result<ChatSession> {
        Ok(ChatSession::new(id, Box::new(CountingAgent { history: Vec::new() })))
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_session() {
        let registry = MemorySessionRegistry::new(Duration::from_secs(60), 8);
        let id = SessionId::from_string("s1");

        let first = registry.get_or_create(&id, &factory).await.unwrap();
        first.lock().await.run_turn("hi", &ProgressSink::noop()).await;

        let again = registry.get_or_create(&id, &factory).await.unwrap();
        assert_eq!(again.lock().await.history().len(), 2);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let registry = MemorySessionRegistry::new(Duration::from_secs(60), 2);
        let (a, b, c) = (SessionId::from_string("a"), SessionId::from_string("b"), SessionId::from_string("c"));

        registry.get_or_create(&a, &factory).await.unwrap();
        registry.get_or_create(&b, &factory).await.unwrap();
        registry.get(&a).await.unwrap();
        registry.get_or_create(&c, &factory).await.unwrap();

        assert!(registry.get(&a).await.is_some());
        assert!(registry.get(&b).await.is_none());
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let registry = MemorySessionRegistry::new(Duration::ZERO, 8);
        registry.get_or_create(&SessionId::new(), &factory).await.unwrap();

        assert_eq!(registry.evict_idle().await, 1);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_reset_and_remove() {
        let registry = MemorySessionRegistry::new(Duration::from_secs(60), 8);
        let id = SessionId::from_string("s1");
        let session = registry.get_or_create(&id, &factory).await.unwrap();
        session.lock().await.run_turn("hi", &ProgressSink::noop()).await;

        assert!(registry.reset(&id).await);
        assert!(session.lock().await.history().is_empty());
        assert!(registry.remove(&id).await);
        assert!(!registry.reset(&id).await);
    }

    #[tokio::test]
    async fn test_storage_binding_records_turns() {
        let storage = Arc::new(MemoryChatStorage::new());
        let mut session = factory(SessionId::from_string("c1"))
            .unwrap()
            .with_storage(storage.clone());

        session.run_turn("What is Rust?", &ProgressSink::noop()).await;
        session.run_turn("And Cargo?", &ProgressSink::noop()).await;

        let messages = storage.get_messages("c1", None).await.unwrap();
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);

        let conversation = storage.get_conversation("c1").await.unwrap().unwrap();
        assert_eq!(conversation.title.as_deref(), Some("What is Rust?"));
    }

    #[tokio::test]
    async fn test_stored_turn_runs_on_spawned_task() {
        let storage = Arc::new(MemoryChatStorage::new());
        let registry = MemorySessionRegistry::new(Duration::from_secs(60), 8);
        let create = move |id: SessionId| -> Result<ChatSession> {
            Ok(factory(id)?.with_storage(storage.clone()))
        };
        let session = registry.get_or_create(&SessionId::from_string("s1"), &create).await.unwrap();

        let answer = tokio::spawn(async move {
            session.lock().await.run_turn("hi", &ProgressSink::noop()).await
        })
        .await
        .unwrap();

        assert_eq!(answer, "answer 2");
    }
}
