//! Distributed Locks for Latchkey
//!
//! Mutual exclusion between independent processes that share one or more
//! key-value stores, with no lock-manager process in between.
//!
//! ## Features
//!
//! - **Single-instance locks** - atomic `SET NX PX` acquisition, token-checked release
//! - **Lease renewal** - a watchdog task re-extends the TTL while a lock is held
//! - **Blocking acquisition** - polling retry bounded by a deadline or cancellation
//! - **Quorum locks** - Redlock-style majority acquisition over independent instances
//!
//! ## Quick Start
//!
//! ### Single-instance lock
//!
//! ```rust,ignore
//! use latchkey_lock::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let locker = Locker::redis(
//!         RedisConfig::new("redis://127.0.0.1:6379"),
//!         LockOptions::default(),
//!     )
//!     .await?;
//!
//!     let mut lock = locker.get_lock("reports:nightly");
//!     lock.lock(&LockContext::with_timeout(Duration::from_secs(10))).await?;
//!
//!     println!("Lock acquired, doing work...");
//!
//!     lock.unlock(&LockContext::background()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ### Quorum lock
//!
//! ```rust,ignore
//! use latchkey_lock::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut lock = QuorumLock::connect(
//!         ["redis://10.0.0.1:6379", "redis://10.0.0.2:6379", "redis://10.0.0.3:6379"],
//!         "reports:nightly",
//!         LockOptions::default(),
//!     )
//!     .await?;
//!
//!     match lock.try_lock(&LockContext::background()).await {
//!         Ok(()) => println!("held on {} of {} instances", lock.held_count(), lock.store_count()),
//!         Err(e) if e.is_contention() => println!("someone else has it"),
//!         Err(e) => return Err(e.into()),
//!     }
//!
//!     lock.unlock(&LockContext::background()).await?;
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod error;
pub mod lock;
pub mod options;
pub mod quorum;
pub mod store;
pub mod token;
mod watchdog;

pub use context::LockContext;
pub use error::{LockError, LockResult, StoreError};
pub use latchkey_redis::RedisConfig;
pub use lock::{Lock, LockState, Locker};
pub use options::{DEFAULT_RETRY_INTERVAL, DEFAULT_TTL, LockOptions, LockOptionsBuilder, MAX_TTL};
pub use quorum::{QuorumLock, quorum};
pub use store::{LockStore, MemoryStore, RELEASE_SCRIPT, RedisStore, StoreResult};
pub use token::{TokenGenerator, UuidTokens};
