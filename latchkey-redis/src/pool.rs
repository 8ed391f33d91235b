//! Redis connection pool.

use bb8::{CustomizeConnection, Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use redis::aio::MultiplexedConnection;
use std::future::Future;
use std::pin::Pin;

use crate::{RedisConfig, RedisError, Result};

/// Type alias for the connection pool.
pub type RedisPool = Pool<RedisConnectionManager>;

/// A connection checked out of a [`RedisPool`].
pub type PooledRedis<'a> = PooledConnection<'a, RedisConnectionManager>;

/// Tags each new pooled connection with `CLIENT SETNAME`.
#[derive(Debug)]
struct ConnectionNamer {
    name: String,
}

impl CustomizeConnection<MultiplexedConnection, redis::RedisError> for ConnectionNamer {
    fn on_acquire<'a>(
        &'a self,
        conn: &'a mut MultiplexedConnection,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<(), redis::RedisError>> + Send + 'a>>
    {
        Box::pin(async move {
            let cmd = client_setname(&self.name);
            cmd.query_async::<()>(conn).await
        })
    }
}

fn client_setname(name: &str) -> redis::Cmd {
    let mut cmd = redis::cmd("CLIENT");
    cmd.arg("SETNAME").arg(name);
    cmd
}

/// Build a pool for `config`.
///
/// Nothing is sent to the server beyond what `min_idle` opens; callers
/// check the endpoint themselves.
pub(crate) async fn build_pool(config: &RedisConfig) -> Result<RedisPool> {
    let manager = RedisConnectionManager::new(config.connection_url()?)
        .map_err(|e| RedisError::Connection(e.to_string()))?;

    let mut builder = RedisPool::builder()
        .max_size(config.pool_size)
        .min_idle(config.min_idle)
        .connection_timeout(config.connection_timeout);

    if let Some(name) = &config.connection_name {
        builder = builder.connection_customizer(Box::new(ConnectionNamer { name: name.clone() }));
    }

    builder
        .build(manager)
        .await
        .map_err(|e| RedisError::Pool(e.to_string()))
}
