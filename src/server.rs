use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::config::AppConfig;
use crate::conversation::{ConversationEngine, ConversationStore, TurnMode, TurnRequest};
use crate::events::{TurnEvent, sse_event};
use crate::llm::{ChatCompletionsDriver, LlmDriver};
use crate::mcp::{McpHub, RmcpConnector, StatusReport};

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let settings = config.llm.settings();
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        "LLM configuration loaded"
    );

    let endpoints = config.mcp.endpoints();
    info!(server_count = endpoints.len(), "Starting MCP connection supervisors");
    let hub = Arc::new(McpHub::start(endpoints, Arc::new(RmcpConnector)));

    let driver: Arc<dyn LlmDriver> = Arc::new(ChatCompletionsDriver::new(settings));
    let engine = ConversationEngine::new(
        driver,
        Arc::clone(hub.registry()),
        hub.router(),
        ConversationStore::new(config.chat.system_message.clone()),
    )
    .with_max_history_length(config.chat.max_history_length);

    let state = AppState {
        engine,
        hub: Arc::clone(&hub),
        default_mode: if config.llm.stream {
            TurnMode::Streaming
        } else {
            TurnMode::NonStreaming
        },
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    let served = axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    let report = hub.shutdown().await;
    if !report.is_clean() {
        warn!(
            aborted = ?report.aborted,
            stuck = ?report.stuck,
            "Some MCP supervisors did not stop cleanly"
        );
    }

    served?;
    Ok(())
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/mcp/status", get(api_mcp_status))
        .route("/api/chat", post(api_chat))
        .route("/api/chat/stream", post(api_chat_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received; draining connections");
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for the chat endpoints.
#[derive(Debug, Deserialize)]
struct ChatRequest {
    /// Conversation key (generated when absent).
    #[serde(default)]
    conversation_id: Option<String>,
    /// User message content.
    message: String,
    /// Forwarded to the backend as `user`.
    #[serde(default)]
    user_id: Option<String>,
    /// Use backend streaming; defaults to the configured mode.
    #[serde(default)]
    stream: Option<bool>,
}

/// Response from the non-streaming chat endpoint.
#[derive(Debug, Serialize)]
struct ChatResponse {
    conversation_id: String,
    events: Vec<TurnEvent>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn bad_request(message: &str) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
}

fn turn_request(
    req: ChatRequest,
    default_mode: TurnMode,
) -> Result<TurnRequest, (StatusCode, Json<ErrorBody>)> {
    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let conversation_id = req
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mode = match req.stream {
        Some(true) => TurnMode::Streaming,
        Some(false) => TurnMode::NonStreaming,
        None => default_mode,
    };

    Ok(TurnRequest {
        conversation_id,
        message: req.message,
        user_id: req.user_id,
        mode,
    })
}

/// GET /health
async fn health() -> &'static str {
    "ok"
}

/// GET /api/mcp/status - Per-server state and tool preview.
async fn api_mcp_status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.hub.status())
}

/// POST /api/chat - Run a turn and return all of its events.
async fn api_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorBody>)> {
    let turn = turn_request(req, state.default_mode)?;
    info!(
        conversation_id = %turn.conversation_id,
        mode = ?turn.mode,
        "Received chat request"
    );

    let conversation_id = turn.conversation_id.clone();
    let events: Vec<TurnEvent> = state.engine.run_turn(turn).collect().await;

    Ok(Json(ChatResponse {
        conversation_id,
        events,
    }))
}

/// POST /api/chat/stream - Run a turn and stream its events as SSE.
async fn api_chat_stream(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, (StatusCode, Json<ErrorBody>)> {
    let turn = turn_request(req, state.default_mode)?;
    info!(
        conversation_id = %turn.conversation_id,
        mode = ?turn.mode,
        "Received streaming chat request"
    );

    let conversation_id = turn.conversation_id.clone();
    let sse_stream = state
        .engine
        .run_turn(turn)
        .map(|event| Ok::<String, Infallible>(sse_event(&event)));

    let mut resp = Body::from_stream(sse_stream).into_response();
    let headers = resp.headers_mut();
    headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));
    if let Ok(value) = header::HeaderValue::from_str(&conversation_id) {
        headers.insert("x-conversation-id", value);
    }
    Ok(resp)
}
