//! Engine error taxonomy.
//!
//! Every failure in the admission path falls into one of four buckets that
//! decide what happens to the queue item: transient failures go back to
//! pending within the retry budget, permanent failures terminate the item,
//! quota exhaustion is an expected recoverable condition, and conflicts
//! mean another worker won a race and this one just moves on.

use thiserror::Error;
use upcast_store::StoreError;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Retryable: analyzer/publisher timeout or rate limit, store contention.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Not retryable: unreadable file, no channel for the category, and
    /// similar conditions a retry cannot fix.
    #[error("Permanent failure: {0}")]
    Permanent(String),

    /// Every eligible channel is at its daily quota. Not an error for the
    /// item; it waits for a later scheduling pass.
    #[error("All eligible channels are at their daily quota")]
    QuotaExhausted,

    /// A state-transition precondition was not met; another worker already
    /// acted on the item. The loser abandons it without side effects.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store failures that are neither contention nor a lost race.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        if e.is_conflict() {
            EngineError::Conflict(e.to_string())
        } else if e.is_retryable() {
            EngineError::Transient(e.to_string())
        } else {
            EngineError::Store(e)
        }
    }
}

impl EngineError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Check if the item should be retried on a later pass.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }

    /// Check if the item should move to the terminal failed state.
    pub fn is_permanent(&self) -> bool {
        matches!(self, EngineError::Permanent(_) | EngineError::Store(_))
    }

    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, EngineError::QuotaExhausted)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_conflict_maps_to_conflict() {
        let err: EngineError = StoreError::conflict("raced").into();
        assert!(err.is_conflict());
        assert!(!err.is_permanent());
    }

    #[test]
    fn test_store_unavailable_maps_to_transient() {
        let err: EngineError = StoreError::unavailable("connection pool dry").into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_not_found_is_permanent() {
        let err: EngineError = StoreError::not_found("queue item x").into();
        assert!(err.is_permanent());
    }
}
