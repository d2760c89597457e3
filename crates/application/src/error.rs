//! Application error types

use scoreload_domain::DomainError;
use thiserror::Error;

use crate::auth::TokenError;
use crate::ports::HttpClientError;

/// Application-level errors.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// A domain validation error occurred.
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    /// An HTTP request failed at the transport level.
    #[error("HTTP error: {0}")]
    Http(#[from] HttpClientError),

    /// Authentication against the token endpoint failed.
    #[error("authentication error: {0}")]
    Auth(#[from] TokenError),

    /// The run options are unusable.
    #[error("invalid run options: {0}")]
    InvalidOptions(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for application operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
