//! HTTP mapping of [`SidecarError`].

use crate::utils::SidecarError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::io::ErrorKind;

impl SidecarError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SidecarError::Decode(_) | SidecarError::InvalidWalName(_) => StatusCode::BAD_REQUEST,
            SidecarError::Filesystem { source, .. } if source.kind() == ErrorKind::NotFound => {
                StatusCode::NOT_FOUND
            }
            SidecarError::BackupInProgress(_) => StatusCode::CONFLICT,
            SidecarError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SidecarError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
