//! Store contract consumed by the lock protocol.
//!
//! Three primitives are all a lock needs: atomic set-if-absent with expiry,
//! expiry extension, and token-checked delete. Any backend offering them
//! atomically per key can host single or quorum locks.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

#[cfg(test)]
pub(crate) mod delayed;
mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Lua script deleting a key only while it still holds the caller's token.
pub const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Key-value store able to host a lease.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Write `token` under `key` with a `ttl` expiry, only if `key` is absent.
    ///
    /// Returns `true` if the write happened.
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool>;

    /// Reset the expiry of `key` to `ttl`.
    ///
    /// Returns `false` if the key no longer exists.
    async fn extend(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Delete `key` only if it currently holds `token`, atomically.
    ///
    /// Returns `true` if a key was deleted.
    async fn compare_and_delete(&self, key: &str, token: &str) -> StoreResult<bool>;

    /// Short label identifying the store in logs.
    fn describe(&self) -> String;
}

/// TTL as Redis `PX` milliseconds, never below 1.
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}
