// Web server: the Axum HTTP surface over the two inference services.
//
// Three routes: /health, /moderate, /transcribe. The services are built by
// the composition root in main and injected through AppState; nothing here
// reads configuration or constructs models.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::moderation::ModerationService;
use crate::transcription::TranscriptionService;

pub mod handlers;

/// Shared application state threaded through all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub moderation: Arc<ModerationService>,
    pub transcription: Arc<TranscriptionService>,
}

/// Start the web server and block until it exits.
pub async fn run_server(
    moderation: Arc<ModerationService>,
    transcription: Arc<TranscriptionService>,
    allowed_origins: &[String],
    bind: &str,
    port: u16,
) -> Result<()> {
    let state = AppState {
        moderation,
        transcription,
    };
    let app = build_router(state, allowed_origins)?;

    let addr = format!("{bind}:{port}");
    info!("hearo-ai listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState, allowed_origins: &[String]) -> Result<Router> {
    Ok(Router::new()
        .route("/health", get(health))
        .route("/moderate", post(handlers::moderate::moderate))
        // Uploads are read whole into memory and the contract has no size
        // limit; axum's default 2 MiB cap would silently add one.
        .route(
            "/transcribe",
            post(handlers::transcribe::transcribe).layer(DefaultBodyLimit::disable()),
        )
        .layer(cors_layer(allowed_origins)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// CORS: explicit origin allow-list with credentials. Methods and headers
/// mirror the request for permitted origins; `Any` cannot be combined
/// with `allow_credentials`.
fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer> {
    let origins = allowed_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin: {origin:?}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

/// Liveness check. Never touches the inference services.
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

/// Typed JSON error response helper.
pub fn api_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
