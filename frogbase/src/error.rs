//! Error types for frogbase
//!
//! `IngestError` is the pipeline taxonomy. Every variant has a stable
//! `kind()` string used in add summaries, events and API payloads.
//! `ApiError` maps everything onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Pipeline and search error taxonomy
#[derive(Debug, Error)]
pub enum IngestError {
    /// Neither a supported URL nor an existing filesystem path
    #[error("Invalid source '{input}': {reason}")]
    InvalidSource { input: String, reason: String },

    /// Network failure, unsupported platform, or corrupt/partial download
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Speech-to-text backend failed or timed out
    #[error("Transcription failed: {0}")]
    Transcription(String),

    /// Text could not be encoded into a vector
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// Persisted index does not match the expected format
    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),

    /// Search issued against an index with no entries
    #[error("Index is empty; add media before searching")]
    EmptyIndex,

    /// Batch was cancelled before the item started
    #[error("Cancelled before processing started")]
    Cancelled,

    /// Metadata store error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// frogbase-common error (config, IO, invalid input)
    #[error(transparent)]
    Common(#[from] frogbase_common::Error),
}

impl IngestError {
    pub fn invalid_source(input: impl Into<String>, reason: impl Into<String>) -> Self {
        IngestError::InvalidSource {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::InvalidSource { .. } => "invalid_source",
            IngestError::Fetch(_) => "fetch_error",
            IngestError::Transcription(_) => "transcription_error",
            IngestError::Embedding(_) => "embedding_error",
            IngestError::IndexCorrupt(_) => "index_corrupt",
            IngestError::EmptyIndex => "empty_index",
            IngestError::Cancelled => "cancelled",
            IngestError::Database(_) => "database_error",
            IngestError::Common(frogbase_common::Error::Config(_)) => "config_error",
            IngestError::Common(frogbase_common::Error::Database(_)) => "database_error",
            IngestError::Common(frogbase_common::Error::NotFound(_)) => "not_found",
            IngestError::Common(frogbase_common::Error::InvalidInput(_)) => "invalid_input",
            IngestError::Common(_) => "internal_error",
        }
    }
}

/// Result type for pipeline, index and search operations
pub type IngestResult<T> = Result<T, IngestError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Pipeline, index or search error
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// frogbase-common error
    #[error("Common error: {0}")]
    Common(#[from] frogbase_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Ingest(ref err) => {
                let (status, code) = match err {
                    IngestError::InvalidSource { .. } => (StatusCode::BAD_REQUEST, "INVALID_SOURCE"),
                    IngestError::EmptyIndex => (StatusCode::CONFLICT, "EMPTY_INDEX"),
                    IngestError::Embedding(_) => (StatusCode::BAD_REQUEST, "EMBEDDING_ERROR"),
                    IngestError::Common(frogbase_common::Error::NotFound(_)) => {
                        (StatusCode::NOT_FOUND, "NOT_FOUND")
                    }
                    IngestError::Common(frogbase_common::Error::InvalidInput(_)) => {
                        (StatusCode::BAD_REQUEST, "BAD_REQUEST")
                    }
                    IngestError::IndexCorrupt(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "INDEX_CORRUPT")
                    }
                    _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
                };
                (status, code, err.to_string())
            }
            ApiError::Common(ref err) => {
                let (status, code) = match err {
                    frogbase_common::Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    frogbase_common::Error::InvalidInput(_) => {
                        (StatusCode::BAD_REQUEST, "BAD_REQUEST")
                    }
                    _ => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR"),
                };
                (status, code, err.to_string())
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(IngestError::invalid_source("x", "nope").kind(), "invalid_source");
        assert_eq!(IngestError::Fetch("x".into()).kind(), "fetch_error");
        assert_eq!(IngestError::Transcription("x".into()).kind(), "transcription_error");
        assert_eq!(IngestError::Embedding("x".into()).kind(), "embedding_error");
        assert_eq!(IngestError::IndexCorrupt("x".into()).kind(), "index_corrupt");
        assert_eq!(IngestError::EmptyIndex.kind(), "empty_index");
        assert_eq!(IngestError::Cancelled.kind(), "cancelled");
        assert_eq!(
            IngestError::Common(frogbase_common::Error::Config("bad".into())).kind(),
            "config_error"
        );
    }

    #[test]
    fn test_api_status_mapping() {
        let resp = ApiError::from(IngestError::EmptyIndex).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = ApiError::from(IngestError::invalid_source("ftp://x", "scheme")).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = ApiError::NotFound("media abc".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
