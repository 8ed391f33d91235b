//! Pooled Redis service.

use redis::{Cmd, FromRedisValue, ScriptInvocation};
use std::future::Future;
use tracing::info;

use crate::{
    RedisConfig, RedisError, Result,
    pool::{PooledRedis, RedisPool, build_pool},
};

/// Redis service providing a connection pool and timed command execution.
///
/// Cheap to share behind an `Arc`; every lock talking to the same endpoint
/// can reuse one service, the server serializes conflicting writes.
pub struct RedisService {
    config: RedisConfig,
    pool: RedisPool,
}

impl RedisService {
    /// Create a service and verify the endpoint answers `PING`.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let pool = build_pool(&config).await?;
        let service = Self { config, pool };
        service.health_check().await?;

        info!(
            pool_size = service.config.pool_size,
            endpoint = %service.config.endpoint(),
            "Redis connection pool created"
        );
        Ok(service)
    }

    /// Get the configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Check a connection out of the pool.
    pub async fn get(&self) -> Result<PooledRedis<'_>> {
        Ok(self.pool.get().await?)
    }

    /// Run a command on a pooled connection, bounded by the command timeout.
    pub async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T> {
        self.timed(async {
            let mut conn = self.get().await?;
            let value = cmd.query_async(&mut *conn).await?;
            Ok(value)
        })
        .await
    }

    /// Run a Lua script invocation, bounded by the command timeout.
    ///
    /// `EVALSHA` is tried first and the script body is loaded on a cache miss.
    pub async fn invoke<T: FromRedisValue>(&self, invocation: &ScriptInvocation<'_>) -> Result<T> {
        self.timed(async {
            let mut conn = self.get().await?;
            let value = invocation.invoke_async(&mut *conn).await?;
            Ok(value)
        })
        .await
    }

    /// Check if the connection is healthy.
    pub async fn health_check(&self) -> Result<()> {
        let pong: String = self.query(&redis::cmd("PING")).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(RedisError::Command(format!("unexpected PING reply: {pong}")))
        }
    }

    /// Get pool statistics.
    pub fn pool_stats(&self) -> PoolStats {
        let state = self.pool.state();
        PoolStats {
            connections: state.connections,
            idle_connections: state.idle_connections,
        }
    }

    async fn timed<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.command_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RedisError::Timeout),
        }
    }
}

/// Connection pool statistics.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Total connections.
    pub connections: u32,
    /// Idle connections.
    pub idle_connections: u32,
}
