//! Error responses for the bridge HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sync_engine::SyncError;
use thiserror::Error;

/// Errors a handler can return.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The caller did not identify its tenant.
    #[error("missing x-tenant-id header")]
    MissingTenant,

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingTenant => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Sync(err) => match err {
                SyncError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                SyncError::Forbidden(_) => StatusCode::FORBIDDEN,
                SyncError::EditWindowExpired { .. } => StatusCode::CONFLICT,
                err if err.is_not_found() => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, %status, "Request rejected");
        }

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}

/// Result type for handlers.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(SyncError::InvalidRequest("x".into())), StatusCode::BAD_REQUEST),
            (ApiError::from(SyncError::Forbidden("x".into())), StatusCode::FORBIDDEN),
            (ApiError::from(SyncError::MessageNotFound("x".into())), StatusCode::NOT_FOUND),
            (ApiError::from(SyncError::NotMappedToGateway("x".into())), StatusCode::NOT_FOUND),
            (
                ApiError::from(SyncError::EditWindowExpired { age_minutes: 20 }),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(SyncError::NoInstanceAvailable("L1".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::MissingTenant, StatusCode::UNAUTHORIZED),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }
}
