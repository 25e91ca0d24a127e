//! HTTP gateway for hassAI.
//!
//! Exposes the conversation loop as a Server-Sent Events endpoint:
//!
//! - `POST /chat`: bearer-authenticated, streams `ChatEvent`s
//! - `GET /health`: liveness probe
//!
//! Built on Axum.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    middleware::{self, Next},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use hassai_agent::{ChatRequest, Orchestrator};
use hassai_config::AppConfig;

const BODY_LIMIT: usize = 1024 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Orchestrator,
    pub access_token: String,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
///
/// Layers, outermost first: HTTP trace logging, 1 MB request body limit,
/// and bearer authentication on `/chat` only.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Builds the completion client and tool gateway once and shares them
/// across all requests. Returns after Ctrl-C once in-flight requests drain.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.ensure_complete()?;

    let orchestrator = Orchestrator::from_config(&config)?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = Arc::new(GatewayState {
        orchestrator,
        access_token: config.server.access_token.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, provider = state.orchestrator.provider_name(), "Gateway listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C; shutting down");
    }
    info!("Shutdown signal received");
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /chat`: run one conversation, stream its events.
async fn chat_handler(
    State(state): State<SharedState>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.orchestrator.stream(request);

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event.event_type()).data(data))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Serialize)]
struct ErrorDetail {
    detail: &'static str,
}

/// Bearer authentication for `/chat`.
///
/// The scheme is matched case-insensitively; the token must equal the
/// configured access token exactly.
async fn auth_middleware(
    State(state): State<SharedState>,
    req: axum::extract::Request,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    match token {
        Some(token) if token == state.access_token => next.run(req).await,
        _ => {
            warn!("Unauthorized request to /chat: missing or invalid bearer token");
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorDetail {
                    detail: "Invalid token",
                }),
            )
                .into_response()
        }
    }
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token)
}
