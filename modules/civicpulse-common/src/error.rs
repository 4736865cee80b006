use thiserror::Error;

/// Failures constructing domain values from untrusted input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("unknown report status: {0}")]
    UnknownStatus(String),

    #[error("unknown role: {0}")]
    UnknownRole(String),
}
