// ABOUTME: Typed failures of the chunked import protocol
// ABOUTME: Each variant maps onto an HTTP status and renders as {"error": message}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Missing or malformed request parameter, oversized body, unknown target
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("chunk checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("{0}")]
    FormatDetection(String),
    /// Chunk out of order or sent to a finished session
    #[error("{0}")]
    Protocol(String),
    /// The session has been persisted as stalled
    #[error("{0}")]
    Stalled(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ImportError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation(_)
            | Self::ChecksumMismatch { .. }
            | Self::FormatDetection(_)
            | Self::Protocol(_)
            | Self::Stalled(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ImportError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            Self::Internal(e) => {
                tracing::error!("Import request failed: {:#}", e);
                format!("{:#}", e)
            }
            other => other.to_string(),
        };
        (status, axum::Json(ErrorResponse { error })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ImportError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ImportError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ImportError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_checksum_message() {
        let error = ImportError::ChecksumMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert_eq!(
            error.to_string(),
            "chunk checksum mismatch: expected aa, computed bb"
        );
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
