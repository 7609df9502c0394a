//! Error types for the ut2watch state store.

use thiserror::Error;

use crate::types::ServerId;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// The id never went through `get_or_add`, or was removed since.
    #[error("unknown server id: {0}")]
    UnknownId(ServerId),
}
