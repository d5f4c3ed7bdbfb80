use crate::dispatcher::WebhookDispatcher;
use crate::error::Error;
use crate::handlers::{sessions, webhook};
use crate::session::{gateway, SessionManager};
use crate::settings::WebhookSettings;
use crate::verification;
use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared handles for every route. One dispatcher and one session manager
/// per process, passed in explicitly.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub settings: Arc<WebhookSettings>,
    /// Bearer token for the send routes. `None` rejects every send.
    pub auth_token: Option<String>,
    /// Shared secret the gateway must present on event callbacks.
    pub gateway_api_key: Option<String>,
    pub upload_dir: PathBuf,
}

pub fn router(state: AppState) -> Router {
    let send_routes = Router::new()
        .route("/sessions/{session_id}/send-text", post(sessions::send_text))
        .route("/sessions/{session_id}/send-media", post(sessions::send_media))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    let api = Router::new()
        .route("/health", get(health))
        .route(
            "/sessions",
            post(sessions::create_session).get(sessions::list_sessions),
        )
        .route(
            "/sessions/{session_id}",
            get(sessions::get_session).delete(sessions::destroy_session),
        )
        .route("/sessions/{session_id}/logout", post(sessions::logout))
        .merge(send_routes)
        .route(
            "/webhook/settings",
            get(webhook::get_settings).post(webhook::update_settings),
        )
        .route("/webhook/test", post(webhook::test_webhook))
        .route(
            "/webhook/logs",
            get(webhook::get_logs).delete(webhook::clear_logs),
        );

    Router::new()
        .nest("/api", api)
        .route("/gateway/events/{session_id}", post(gateway_event))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `listener` until Ctrl-C.
pub async fn start(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!("HTTP server listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for shutdown signal: {e}");
            }
            info!("shutting down");
        })
        .await
}

async fn health() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "WhatsApp API is running",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    verification::verify_bearer(state.auth_token.as_deref(), header_value)
        .map_err(Error::Unauthorized)?;
    Ok(next.run(request).await)
}

/// Event callback from the automation gateway for one session.
async fn gateway_event(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> StatusCode {
    if let Some(expected) = state.gateway_api_key.as_deref() {
        let presented = headers
            .get("apikey")
            .and_then(|v| v.to_str().ok())
            .or_else(|| payload["apikey"].as_str())
            .unwrap_or("");
        if !verification::verify_shared_secret(expected, presented) {
            warn!(session_id = %session_id, "gateway callback rejected: bad api key");
            return StatusCode::UNAUTHORIZED;
        }
    }

    for event in gateway::parse_gateway_event(&payload) {
        if !state.sessions.route_event(&session_id, event).await {
            return StatusCode::NOT_FOUND;
        }
    }
    StatusCode::OK
}
