//! Fencing token generation.

use uuid::Uuid;

/// Source of fencing tokens.
///
/// Called once per acquisition attempt; every value must be unique with
/// overwhelming probability across all processes sharing a store.
pub trait TokenGenerator: Send + Sync {
    /// Produce a fresh token.
    fn generate(&self) -> String;
}

/// Random UUID v4 tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidTokens;

impl TokenGenerator for UuidTokens {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

impl<F> TokenGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn generate(&self) -> String {
        self()
    }
}
