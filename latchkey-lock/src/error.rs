//! Lock and store error types.

use thiserror::Error;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Failure talking to a backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Redis transport or command failure.
    #[error("Redis error: {0}")]
    Redis(#[from] latchkey_redis::RedisError),

    /// Store is unreachable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Store call did not complete in time.
    #[error("Store operation timed out")]
    Timeout,
}

/// Distributed lock errors.
#[derive(Debug, Error)]
pub enum LockError {
    /// The resource is held under another token, or quorum was not reached.
    #[error("Failed to acquire lock")]
    LockFailed,

    /// The deadline or cancellation fired before the lock was acquired.
    #[error("Lock timeout")]
    Timeout,

    /// A store call failed. Never treated as contention.
    #[error("Backend error: {0}")]
    Backend(#[from] StoreError),

    /// Release of a lock that was never acquired.
    #[error("Lock not held")]
    NotHeld,

    /// Acquisition attempted on a lock that is already held.
    #[error("Lock already held")]
    AlreadyHeld,

    /// Acquisition attempted on a lock that was already released.
    #[error("Lock already released")]
    Released,

    /// Invalid lock configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LockError {
    /// Expected under contention; the caller may retry.
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::LockFailed)
    }

    /// Programming error on the caller's side.
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::NotHeld | Self::AlreadyHeld | Self::Released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(LockError::LockFailed.is_contention());
        assert!(!LockError::Timeout.is_contention());
        assert!(!LockError::Backend(StoreError::Timeout).is_contention());

        assert!(LockError::NotHeld.is_misuse());
        assert!(LockError::AlreadyHeld.is_misuse());
        assert!(LockError::Released.is_misuse());
        assert!(!LockError::LockFailed.is_misuse());
    }

    #[test]
    fn test_backend_display_keeps_cause() {
        let err = LockError::from(StoreError::Unavailable("10.0.0.7:6379".into()));
        assert_eq!(
            err.to_string(),
            "Backend error: Store unavailable: 10.0.0.7:6379"
        );
    }
}
