//! Redis connection error types.

use thiserror::Error;

/// Result type for Redis connection operations.
pub type Result<T> = std::result::Result<T, RedisError>;

/// Errors raised while talking to a Redis endpoint.
#[derive(Debug, Error)]
pub enum RedisError {
    /// Connection could not be established or was lost.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Pool could not hand out a connection.
    #[error("Pool error: {0}")]
    Pool(String),

    /// Server rejected a command.
    #[error("Command error: {0}")]
    Command(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation exceeded the configured command timeout.
    #[error("Operation timed out")]
    Timeout,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl RedisError {
    /// Check if this error is worth retrying on a fresh connection.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout | Self::Pool(_) | Self::Io(_) => true,
            Self::Redis(e) => e.is_io_error() || e.is_timeout() || e.is_connection_dropped(),
            Self::Command(_) | Self::Config(_) => false,
        }
    }
}

impl<E> From<bb8::RunError<E>> for RedisError
where
    E: std::error::Error + 'static,
{
    fn from(err: bb8::RunError<E>) -> Self {
        match err {
            bb8::RunError::TimedOut => Self::Timeout,
            bb8::RunError::User(e) => Self::Pool(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(RedisError::Timeout.is_retryable());
        assert!(RedisError::Connection("reset".into()).is_retryable());
        assert!(!RedisError::Config("bad url".into()).is_retryable());
        assert!(!RedisError::Command("WRONGTYPE".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = RedisError::Pool("exhausted".to_string());
        assert_eq!(err.to_string(), "Pool error: exhausted");
    }
}
