//! Error types for the caching core and the HTTP gateway
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Core Error Enum ==
/// Error type shared by the cache, coalescer, batcher and paginator.
///
/// Cloneable so that a single failure can be handed to every caller that
/// joined the same in-flight request.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// The underlying fetch failed
    #[error("Fetch failed: {0}")]
    Fetch(Arc<anyhow::Error>),

    /// The task running the fetch panicked or was aborted
    #[error("Fetch task failed: {0}")]
    TaskFailed(String),

    /// The batch flush went away before answering this waiter
    #[error("Batch was dropped before it resolved")]
    BatchDropped,

    /// Rejected key (empty or otherwise unusable)
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// TTL must be strictly positive
    #[error("TTL must be greater than zero")]
    InvalidTtl,
}

impl CoreError {
    /// Wraps a fetcher failure.
    pub fn fetch(err: impl Into<anyhow::Error>) -> Self {
        CoreError::Fetch(Arc::new(err.into()))
    }

    /// Returns true when two errors carry the very same fetch failure.
    pub fn same_failure(&self, other: &CoreError) -> bool {
        match (self, other) {
            (CoreError::Fetch(a), CoreError::Fetch(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Convenience Result type for the caching core.
pub type Result<T> = std::result::Result<T, CoreError>;

// == API Error Enum ==
/// Errors surfaced by the HTTP gateway.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Backend failure that was not absorbed by a fail-open fetcher
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidKey(msg) => ApiError::InvalidRequest(msg),
            CoreError::InvalidTtl => ApiError::InvalidRequest(err.to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

/// Result type for HTTP handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
