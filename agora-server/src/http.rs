//! Agora HTTP API
//!
//! Axum-based HTTP server exposing the assistant chat endpoint.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function returning `(StatusCode, serde_json::Value)`. The inner
//! functions are directly testable without axum dispatch machinery.
//!
//! Endpoints:
//! - POST /api/chat: answer a message, persisting the exchange for known users
//! - GET  /version : server version info

use std::any::Any;
use std::sync::Arc;

use agora_core::{
    ChatError, ChatService, FallbackGenerator, GeminiChatClient, GeneratedReply, HistoryPersister,
    Identity, PersistOutcome, PgHistoryStore,
};
use agora_core::AgoraConfig;
use anyhow::Result;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::identity::{resolver_from_config, IdentityResolver};

/// Body sent for every failure the caller cannot act on.
pub const GENERIC_ERROR: &str = "Failed to process chat request";

/// Same as axum's built-in default.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Shared state for all HTTP handlers. Built once at startup.
#[derive(Clone)]
pub struct HttpState {
    pub chat: ChatService,
    pub identity: Arc<dyn IdentityResolver>,
    pub max_body_bytes: usize,
}

impl HttpState {
    pub fn new(chat: ChatService, identity: Arc<dyn IdentityResolver>) -> Self {
        Self {
            chat,
            identity,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_body_limit(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Wire the Gemini client, Postgres store and identity resolver from config.
    pub fn from_config(config: &AgoraConfig, pool: PgPool) -> Result<Self> {
        let client = GeminiChatClient::from_config(&config.generation)?;
        tracing::info!(model = client.model(), "Gemini chat client ready");

        let persister = HistoryPersister::new(Arc::new(PgHistoryStore::new(pool)), &config.persistence);
        if !persister.is_enabled() {
            tracing::warn!("Chat history persistence disabled");
        }

        let identity = resolver_from_config(&config.identity)?;
        tracing::info!(resolver = identity.name(), "Identity resolver ready");

        let chat = ChatService::new(FallbackGenerator::new(Arc::new(client)), persister);
        Ok(Self::new(chat, identity).with_body_limit(config.http.max_body_bytes))
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/version", get(version_handler))
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: HttpState,
    config: &AgoraConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);

    let app = build_router(Arc::new(state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Agora HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Response DTOs
// ============================================================================

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }

    fn into_value(self) -> serde_json::Value {
        serde_json::json!({ "error": self.error })
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner chat: parses the body, runs the chat service, maps the outcome.
pub async fn chat_inner(
    state: &HttpState,
    identity: Option<Identity>,
    body: &[u8],
) -> (StatusCode, serde_json::Value) {
    let payload: serde_json::Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(error = %e, "Chat request body is not valid JSON");
            return internal_error();
        }
    };

    match state.chat.handle(&payload, identity).await {
        Ok(outcome) => {
            log_persistence(&outcome.persisted);
            reply_body(&outcome.reply)
        }
        Err(ChatError::Validation(e)) => {
            tracing::debug!(error = %e, "Rejected chat request");
            (StatusCode::BAD_REQUEST, ErrorResponse::new(e.to_string()).into_value())
        }
        Err(e) => {
            tracing::error!(error = %e, "Chat request failed");
            internal_error()
        }
    }
}

/// Inner body rejection: the body could not be read (oversized or aborted).
/// Keeps the rejection's status but answers with the generic JSON error.
pub fn body_rejected_inner(rejection: &BytesRejection) -> (StatusCode, serde_json::Value) {
    tracing::warn!(status = %rejection.status(), reason = %rejection.body_text(), "Chat request body rejected");
    (
        rejection.status(),
        ErrorResponse::new(GENERIC_ERROR).into_value(),
    )
}

fn reply_body(reply: &GeneratedReply) -> (StatusCode, serde_json::Value) {
    match serde_json::to_value(reply) {
        Ok(v) => (StatusCode::OK, v),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize chat reply");
            internal_error()
        }
    }
}

/// The persister already logged the details; this records the outcome per request.
fn log_persistence(outcome: &PersistOutcome) {
    match outcome {
        PersistOutcome::Stored { id } => tracing::debug!(id = %id, "Chat exchange persisted"),
        PersistOutcome::Skipped(reason) => tracing::debug!(reason = ?reason, "Chat exchange not persisted"),
        PersistOutcome::Failed { error } => {
            tracing::warn!(error = %error, "Answered chat request without storing the exchange")
        }
    }
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "agora-chat/1",
    })
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn chat_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> impl IntoResponse {
    let (status, body) = match body {
        Ok(body) => {
            let identity = state.identity.resolve(&headers);
            chat_inner(&state, identity, &body).await
        }
        Err(rejection) => body_rejected_inner(&rejection),
    };
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

// ============================================================================
// Helpers
// ============================================================================

fn internal_error() -> (StatusCode, serde_json::Value) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorResponse::new(GENERIC_ERROR).into_value(),
    )
}

/// Last-resort boundary: a panic anywhere in a handler becomes the generic 500.
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "Handler panicked");

    let (status, body) = internal_error();
    (status, Json(body)).into_response()
}

// ============================================================================
// Unit tests, calling inner functions directly
// ============================================================================
