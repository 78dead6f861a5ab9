//! Chat HTTP server.
//!
//! Three routes, all JSON except the page itself:
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | The chat page |
//! | `GET`  | `/health` | Service status, model id, whether retrieval is on |
//! | `POST` | `/chat` | One message in, one reply out |
//!
//! # Error Contract
//!
//! `/chat` answers HTTP 200 for every business outcome — upstream failures,
//! filtered replies, even an unreadable request body all map to a fixed
//! reply string in the normal response shape:
//!
//! ```json
//! { "response": "Bir şeyler yaz bakalım 😊" }
//! ```
//!
//! Only transport-level faults (a port that will not bind, a dropped
//! connection) surface as non-200.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the page can be
//! embedded or proxied freely.

use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::chat::{ChatService, REQUEST_TROUBLE_REPLY};
use crate::config::Config;
use crate::history::DEFAULT_SESSION;

/// The chat page, embedded at compile time.
const CHAT_PAGE: &str = include_str!("../assets/chat.html");

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    chat: Arc<ChatService>,
}

/// Starts the chat HTTP server.
///
/// Binds to the address configured in `[server].bind` and serves until the
/// process is terminated. The [`ChatService`] carries whatever degraded
/// state startup decided on (no generation client, no index); the server
/// itself always comes up.
pub async fn run_server(config: &Config, chat: Arc<ChatService>) -> anyhow::Result<()> {
    let state = AppState { chat };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .layer(cors)
        .with_state(state);

    println!("Sohbet sunucusu dinliyor: http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ GET / ============

async fn handle_index() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"online"` when the server is running.
    status: String,
    /// The configured generation model id.
    model: String,
    /// Whether the knowledge index loaded at startup.
    rag_enabled: bool,
    /// Current time, ISO-8601.
    timestamp: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "online".to_string(),
        model: state.chat.model().to_string(),
        rag_enabled: state.chat.rag_enabled(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

// ============ POST /chat ============

/// JSON request body for `POST /chat`.
///
/// A missing `message` field reads as empty (the nudge path), and a missing
/// `session_id` joins the shared default conversation.
#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

/// JSON response body for `POST /chat`.
#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

/// Handler for `POST /chat`.
///
/// The rejection arm keeps malformed bodies inside the normal response
/// contract: log the rejection, answer 200 with the catch-all string.
async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Json<ChatResponse> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection, "unreadable chat request");
            return Json(ChatResponse {
                response: REQUEST_TROUBLE_REPLY.to_string(),
            });
        }
    };

    let session = request.session_id.as_deref().unwrap_or(DEFAULT_SESSION);
    let response = state.chat.respond(session, &request.message).await;

    Json(ChatResponse { response })
}
