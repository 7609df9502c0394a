//! Query client error types.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors that can occur while querying a server.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("invalid bind address: {0}")]
    InvalidBind(String),
}
