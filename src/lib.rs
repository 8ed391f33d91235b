// Latchkey - distributed locks over Redis
//
// This library provides leased single-instance locks with automatic renewal
// and Redlock-style quorum locks across independent Redis instances.

// Re-export lock functionality
pub use latchkey_lock::*;

// Re-export the Redis connection layer
pub use latchkey_redis;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Lock,
        LockContext,
        LockError,
        LockOptions,
        LockResult,
        LockState,
        LockStore,
        Locker,
        MemoryStore,
        QuorumLock,
        RedisConfig,
        RedisStore,
    };
}
