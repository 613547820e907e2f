// Store error kinds. Query/aggregation paths return StoreError; startup code uses anyhow.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Caller contract violation, raised before any statement is prepared.
    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    /// Connection or query failure from the storage engine.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        StoreError::InvalidCondition(msg.into())
    }

    pub fn is_invalid_condition(&self) -> bool {
        matches!(self, StoreError::InvalidCondition(_))
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match self {
            StoreError::InvalidCondition(_) => StatusCode::BAD_REQUEST,
            StoreError::Storage(_) | StoreError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(json!({
            "error": self.to_string()
        }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
