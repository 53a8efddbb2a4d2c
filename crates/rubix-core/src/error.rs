use thiserror::Error;

/// Errors raised by an [`EntityStore`](crate::domain::store::EntityStore) backend.
///
/// Any of these aborts the operation that hit it; backends guarantee that a
/// failed commit leaves no partial state behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached or refused the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A write would break referential integrity
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// A write targeted a record that does not exist
    #[error("Missing record: {0}")]
    MissingRecord(String),

    /// A continuation token could not be decoded for the requested index
    #[error("Invalid continuation token: {0}")]
    InvalidToken(String),

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Core error type for the Rubix graph store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller supplied an argument the operation cannot accept
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An overlapping cascade is already running; safe to retry
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The operation was cancelled before it committed anything
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Stored data breaks a structural invariant (e.g. a parent cycle)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Underlying storage failure, propagated verbatim
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl CoreError {
    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Conflict(_) | CoreError::Storage(StoreError::Unavailable(_))
        )
    }

    pub(crate) fn node_not_found(id: impl std::fmt::Display) -> Self {
        CoreError::NotFound(format!("node {}", id))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(format!("Serialization error: {}", err))
    }
}
