// POST /moderate: moderate one piece of text.
//
// Malformed or missing bodies are rejected by the Json extractor before
// this handler runs; a classifier failure is a plain 500 with the detail
// kept in the server log.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::error;

use crate::web::{api_error, AppState};

#[derive(Debug, Deserialize)]
pub struct ModerateRequest {
    pub text: String,
}

pub async fn moderate(
    State(state): State<AppState>,
    Json(req): Json<ModerateRequest>,
) -> Response {
    match state.moderation.moderate(&req.text).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => {
            error!("moderation failed: {err:#}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "moderation failed")
        }
    }
}
