//! Store answering slowly, for exercising calls a context cuts short.

use async_trait::async_trait;
use std::time::Duration;

use super::{LockStore, MemoryStore, StoreResult};

/// Wraps a [`MemoryStore`]. Writes land at once but the reply is held back,
/// as with a server that applied a command before the connection stalled.
pub(crate) struct DelayedStore {
    inner: MemoryStore,
    claim_delay: Duration,
    extend_delay: Duration,
}

impl DelayedStore {
    pub(crate) fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            claim_delay: Duration::ZERO,
            extend_delay: Duration::ZERO,
        }
    }

    pub(crate) fn claim_delay(mut self, delay: Duration) -> Self {
        self.claim_delay = delay;
        self
    }

    pub(crate) fn extend_delay(mut self, delay: Duration) -> Self {
        self.extend_delay = delay;
        self
    }
}

#[async_trait]
impl LockStore for DelayedStore {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        let accepted = self.inner.set_if_absent(key, token, ttl).await?;
        tokio::time::sleep(self.claim_delay).await;
        Ok(accepted)
    }

    async fn extend(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let extended = self.inner.extend(key, ttl).await?;
        tokio::time::sleep(self.extend_delay).await;
        Ok(extended)
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> StoreResult<bool> {
        self.inner.compare_and_delete(key, token).await
    }

    fn describe(&self) -> String {
        format!("delayed:{}", self.inner.describe())
    }
}
