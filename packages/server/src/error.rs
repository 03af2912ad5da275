//! Mapping of [`VoiceError`] onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{error, warn};
use voxweave_domain::{ErrorKind, GENERATE_FAILURE, VoiceError};

#[derive(Debug)]
pub enum ServerError {
    Voice(VoiceError),
    FileNotFound(String),
}

impl From<VoiceError> for ServerError {
    fn from(err: VoiceError) -> Self {
        Self::Voice(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ArityMismatch | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::VoiceNotFound => StatusCode::NOT_FOUND,
        ErrorKind::SynthesisTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::ResidencyTransitionUnavailable => StatusCode::CONFLICT,
        ErrorKind::Download => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            Self::Voice(err) => {
                let kind = err.kind();
                let status = status_for(kind);
                if status.is_server_error() {
                    error!(error_kind = %kind, %err, "request failed");
                } else {
                    warn!(error_kind = %kind, %err, "request rejected");
                }
                let body = json!({
                    "status": GENERATE_FAILURE,
                    "error_kind": kind.as_str(),
                    "message": err.to_string(),
                });
                (status, Json(body)).into_response()
            }
            Self::FileNotFound(name) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "detail": format!("File not found: {name}") })),
            )
                .into_response(),
        }
    }
}
