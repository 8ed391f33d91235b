//! Redis-backed lock store.

use async_trait::async_trait;
use latchkey_redis::{RedisConfig, RedisService};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{LockStore, RELEASE_SCRIPT, StoreResult, ttl_millis};

/// Lock store talking to one Redis instance.
///
/// Quorum locks use one `RedisStore` per independent instance. Cloning is
/// cheap and shares the underlying pool.
#[derive(Clone)]
pub struct RedisStore {
    service: Arc<RedisService>,
    release: Arc<redis::Script>,
    label: String,
}

impl RedisStore {
    /// Wrap an existing service.
    pub fn new(service: Arc<RedisService>) -> Self {
        let label = service.config().endpoint();
        Self {
            service,
            release: Arc::new(redis::Script::new(RELEASE_SCRIPT)),
            label,
        }
    }

    /// Open a pool against the configured endpoint.
    pub async fn connect(config: RedisConfig) -> StoreResult<Self> {
        let service = RedisService::new(config).await?;
        Ok(Self::new(Arc::new(service)))
    }

    /// The underlying service.
    pub fn service(&self) -> &RedisService {
        &self.service
    }
}

#[async_trait]
impl LockStore for RedisStore {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        // SET key token NX PX ttl replies OK on write, nil otherwise
        let reply: Option<String> = self
            .service
            .query(
                redis::cmd("SET")
                    .arg(key)
                    .arg(token)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_millis(ttl)),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn extend(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let updated: i64 = self
            .service
            .query(redis::cmd("PEXPIRE").arg(key).arg(ttl_millis(ttl)))
            .await?;
        Ok(updated == 1)
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> StoreResult<bool> {
        let deleted: i64 = self
            .service
            .invoke(self.release.key(key).arg(token))
            .await?;
        if deleted == 0 {
            debug!(resource = key, store = %self.label, "release skipped, token no longer matches");
        }
        Ok(deleted == 1)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
