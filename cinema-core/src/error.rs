use std::time::Duration;

use crate::booking::BookingStatus;

/// Failures reported by an external store (lock store, record store, bus).
///
/// None of these may be read as "absent": a lookup that cannot be answered is
/// an error, never `None`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("duplicate record: {0}")]
    Duplicate(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        StoreError::Unavailable(err.to_string())
    }

    pub fn corrupt(err: impl std::fmt::Display) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcomes of the reserve/confirm entry points other than success.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookingError {
    #[error("seat already locked or booked")]
    Conflict,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("booking already {status}")]
    AlreadyFinalized { status: BookingStatus },
    #[error("lock expired")]
    LockExpired,
    #[error("transient failure: {0}")]
    Transient(StoreError),
}

impl BookingError {
    /// Routine outcomes the caller is expected to handle (pick another seat,
    /// restart from reservation). Not worth an error-level log.
    pub fn is_routine(&self) -> bool {
        matches!(self, BookingError::Conflict | BookingError::LockExpired)
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        BookingError::Transient(err)
    }
}

pub type BookingResult<T> = Result<T, BookingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_become_transient() {
        let err: BookingError = StoreError::Timeout(Duration::from_millis(50)).into();
        assert!(matches!(err, BookingError::Transient(StoreError::Timeout(_))));
        assert!(!err.is_routine());
    }

    #[test]
    fn test_routine_outcomes() {
        assert!(BookingError::Conflict.is_routine());
        assert!(BookingError::LockExpired.is_routine());
        assert!(!BookingError::Forbidden("x".into()).is_routine());
    }

    #[test]
    fn test_already_finalized_message() {
        let err = BookingError::AlreadyFinalized { status: BookingStatus::Confirmed };
        assert_eq!(err.to_string(), "booking already CONFIRMED");
    }
}
