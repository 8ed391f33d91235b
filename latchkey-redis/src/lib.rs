//! # Latchkey Redis
//!
//! Redis connection layer used by the latchkey lock stores.
//!
//! ## Features
//!
//! - **Connection Pooling**: pooled multiplexed connections via bb8
//! - **Timed Commands**: every command is bounded by the configured command timeout
//! - **Environment Config**: `REDIS_URL`, `REDIS_DATABASE` and friends
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use latchkey_redis::{RedisConfig, RedisService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::builder()
//!         .url("redis://localhost:6379")
//!         .pool_size(10)
//!         .build();
//!
//!     let redis = RedisService::new(config).await?;
//!     redis.health_check().await?;
//!
//!     let exists: bool = redis.query(redis::cmd("EXISTS").arg("orders:42")).await?;
//!     println!("held: {exists}");
//!
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod pool;
mod service;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{RedisError, Result};
pub use pool::{PooledRedis, RedisPool};
pub use service::{PoolStats, RedisService};

// Re-export redis crate for convenience
pub use redis;
