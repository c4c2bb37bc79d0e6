// POST /transcribe: transcribe a multipart audio upload.
//
// The whole upload is read into memory and handed to the service together
// with the client's filename (a format hint for normalization). A missing
// `file` field is the caller's fault; everything past normalization is a
// plain 500 with the detail kept in the server log.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use crate::web::{api_error, AppState};

pub async fn transcribe(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return api_error(
                    StatusCode::BAD_REQUEST,
                    &format!("unreadable multipart body: {err}"),
                )
            }
        };

        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("audio").to_string();
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                return api_error(
                    StatusCode::BAD_REQUEST,
                    &format!("failed reading upload: {err}"),
                )
            }
        };

        return match state
            .transcription
            .transcribe(bytes.to_vec(), &filename)
            .await
        {
            Ok(result) => Json(result).into_response(),
            Err(err) => {
                error!("transcription failed: {err:#}");
                api_error(StatusCode::INTERNAL_SERVER_ERROR, "transcription failed")
            }
        };
    }

    api_error(StatusCode::BAD_REQUEST, "missing file field")
}
