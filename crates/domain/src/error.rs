//! Domain error types

use thiserror::Error;

/// Domain-level errors that can occur while parsing or validating input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The HTTP method is not supported.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// The resource name does not match any known API resource.
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// The task tag is not one of read, create, update or delete.
    #[error("unknown task tag: {0}")]
    UnknownTag(String),

    /// No built-in scenario has the given name.
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    /// A scenario has no task left to run.
    #[error("scenario '{0}' has no runnable tasks")]
    EmptyScenario(String),
}

/// Result type alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
