//! research-agent HTTP Server
//!
//! Axum-based server providing REST API and WebSocket endpoints for the
//! single- and multi-agent research assistants.

mod handlers;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{LlmProvider, MemoryChatStorage, MemorySessionRegistry};
use agent_runtime::{ProviderSettings, build_provider};
use research_agents::{AgentFactory, ResearchConfig};

use crate::handlers::{
    chat_handler, chat_stream_handler, conversation_messages, delete_conversation, delete_session, health_check,
    list_conversations, reset_session, search_handler,
};
use crate::state::AppState;

const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
const DEFAULT_MAX_SESSIONS: usize = 256;
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}", name, raw);
            default
        }),
        Err(_) => default,
    }
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health_check))
        // Agent API
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", get(chat_stream_handler))
        .route("/api/search", post(search_handler))
        // Sessions
        .route("/api/session/{id}/reset", post(reset_session))
        .route("/api/session/{id}", delete(delete_session))
        // Stored history
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/{id}", delete(delete_conversation))
        .route("/api/conversations/{id}/messages", get(conversation_messages))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment before reading RUST_LOG
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize LLM provider
    let settings = ProviderSettings::from_env()?;
    let provider = build_provider(&settings, None, None)?;

    match provider.health_check().await {
        Ok(true) => {
            tracing::info!("✓ Connected to {}", provider.kind());
            if let Ok(models) = provider.list_models().await {
                for model in models {
                    tracing::debug!("  Model: {}", model.id);
                }
            }
        }
        Ok(false) | Err(_) => {
            tracing::warn!("⚠ {} not reachable - turns will fail until it is", provider.kind());
        }
    }

    // Research agents
    let config = ResearchConfig::from_env()?;
    let factory = AgentFactory::from_config(provider, config)?;

    if factory.search_configured() {
        tracing::info!("✓ Web search configured");
    } else {
        tracing::warn!("⚠ Web search not configured - set TAVILY_API_KEY in .env");
    }
    tracing::info!("Default agent mode: {}", factory.config().mode);

    let session_ttl = Duration::from_secs(env_parse("SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS));
    let max_sessions = env_parse("MAX_SESSIONS", DEFAULT_MAX_SESSIONS);

    let state = AppState {
        factory: Arc::new(factory),
        sessions: Arc::new(MemorySessionRegistry::new(session_ttl, max_sessions)),
        storage: Arc::new(MemoryChatStorage::new()),
    };

    // Idle session eviction
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            ticker.tick().await;
            let evicted = sessions.evict_idle().await;
            if evicted > 0 {
                tracing::info!("Evicted {} idle sessions", evicted);
            }
        }
    });

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 research-agent server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET    /health                          - Health check");
    tracing::info!("  POST   /api/chat                        - Send message");
    tracing::info!("  GET    /api/chat/stream                 - WebSocket streaming");
    tracing::info!("  POST   /api/search                      - Direct web search");
    tracing::info!("  POST   /api/session/:id/reset           - Clear a session");
    tracing::info!("  DELETE /api/session/:id                 - Drop a session");
    tracing::info!("  GET    /api/conversations               - Stored conversations");
    tracing::info!("  GET    /api/conversations/:id/messages  - Stored messages");

    axum::serve(listener, router(state)).await?;

    Ok(())
}
