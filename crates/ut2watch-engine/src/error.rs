//! Engine error types.

use thiserror::Error;
use ut2watch_query::QueryError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Why [`QueryEngine::run`](crate::QueryEngine::run) returned early.
///
/// A plain `stop()` is not an error; `run` returns `Ok(())` for it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to create query client: {0}")]
    Init(#[source] QueryError),

    #[error("engine cancelled")]
    Cancelled,

    #[error("engine deadline exceeded")]
    DeadlineExceeded,
}

impl EngineError {
    /// True for orderly terminations triggered from outside.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

/// Failure of a single poll. Never leaves the worker.
#[derive(Debug, Error)]
pub(crate) enum PollError {
    #[error("cannot resolve address: {0}")]
    Resolve(#[source] std::io::Error),

    #[error("address resolved to nothing")]
    NoAddress,

    #[error("game port {0} has no query port")]
    NoQueryPort(u16),

    #[error(transparent)]
    Query(#[from] QueryError),
}
