use thiserror::Error;
use uuid::Uuid;

use civicpulse_common::{DomainError, ReportStatus};

/// Rejection of an inbound write before anything is persisted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("invalid location: {0}")]
    Location(String),

    #[error("invalid status: {0}")]
    Status(String),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<DomainError> for ValidationError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidCoordinates(msg) => ValidationError::Location(msg),
            DomainError::UnknownStatus(s) => ValidationError::Status(s),
            DomainError::UnknownRole(r) => ValidationError::Invalid {
                field: "role",
                reason: format!("unknown role {r}"),
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("cannot move report from {from} to {to}")]
    InvalidTransition { from: ReportStatus, to: ReportStatus },

    #[error("user {user_id} has already upvoted report {report_id}")]
    AlreadyUpvoted { report_id: Uuid, user_id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    pub fn report_not_found(id: Uuid) -> Self {
        StoreError::NotFound {
            entity: "report",
            id: id.to_string(),
        }
    }

    pub fn user_not_found(id: &str) -> Self {
        StoreError::NotFound {
            entity: "user",
            id: id.to_string(),
        }
    }

    /// Machine-readable kind, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::InvalidArgument(_) => "invalid_argument",
            StoreError::NotFound { .. } => "not_found",
            StoreError::Forbidden(_) => "forbidden",
            StoreError::InvalidTransition { .. } => "invalid_transition",
            StoreError::AlreadyUpvoted { .. } => "already_upvoted",
            StoreError::Conflict(_) => "conflict",
            StoreError::Database(_) => "unavailable",
        }
    }

    /// Everything except an infrastructure failure is the caller's to handle.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, StoreError::Database(_))
    }
}

impl From<ValidationError> for StoreError {
    fn from(err: ValidationError) -> Self {
        StoreError::InvalidArgument(err.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}
