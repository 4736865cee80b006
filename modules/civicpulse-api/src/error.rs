use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use civicpulse_store::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Unauthenticated(String),

    /// Request could not be decoded (bad JSON, bad query string, bad path).
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Store(e) => e.kind(),
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::BadRequest(_) => "invalid_argument",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Store(e) => match e {
                StoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                StoreError::Forbidden(_) => StatusCode::FORBIDDEN,
                StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
                StoreError::InvalidTransition { .. }
                | StoreError::AlreadyUpvoted { .. }
                | StoreError::Conflict(_) => StatusCode::CONFLICT,
                StoreError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Store(e) if !e.is_recoverable() => {
                warn!(error = %e, "Store unavailable");
                "storage is temporarily unavailable".to_string()
            }
            other => other.to_string(),
        };
        (
            status,
            Json(json!({"error": {"kind": self.kind(), "message": message}})),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
