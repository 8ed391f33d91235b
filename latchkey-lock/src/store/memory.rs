//! In-process lock store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use super::{LockStore, StoreResult};
use crate::error::StoreError;
use crate::options::MAX_TTL;

/// Map size at which a claim also sweeps out expired entries.
const PRUNE_THRESHOLD: usize = 1024;

fn expiry(now: Instant, ttl: Duration) -> Instant {
    now + ttl.min(MAX_TTL)
}

#[derive(Debug)]
struct Entry {
    token: String,
    expires_at: Instant,
}

/// Lock store kept in process memory.
///
/// Each operation runs under one mutex, so it is atomic per key just like a
/// Redis command. Expiry follows the tokio clock, which lets tests pause
/// and advance time. Clones share the same map.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    entries: Mutex<HashMap<String, Entry>>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Create an empty store with a label used in logs.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                entries: Mutex::new(HashMap::new()),
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Make every subsequent operation fail with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::Release);
    }

    /// Token currently stored under `key`, ignoring expired entries.
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.token.clone())
    }

    /// Whether `key` is present and unexpired.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remaining time to live of `key`.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.expires_at - now)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// Whether the store holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write `token` under `key` unconditionally, as a third party would.
    pub fn insert(&self, key: impl Into<String>, token: impl Into<String>, ttl: Duration) {
        self.inner.entries.lock().insert(
            key.into(),
            Entry {
                token: token.into(),
                expires_at: expiry(Instant::now(), ttl),
            },
        );
    }

    /// Drop `key` regardless of its token, simulating lost state.
    pub fn remove(&self, key: &str) -> bool {
        self.inner.entries.lock().remove(key).is_some()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.inner.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(self.inner.name.clone()))
        }
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();
        if entries.get(key).is_some_and(|e| e.expires_at > now) {
            return Ok(false);
        }
        if entries.len() >= PRUNE_THRESHOLD {
            entries.retain(|_, e| e.expires_at > now);
        }
        entries.insert(
            key.to_string(),
            Entry {
                token: token.to_string(),
                expires_at: expiry(now, ttl),
            },
        );
        Ok(true)
    }

    async fn extend(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = expiry(now, ttl);
                Ok(true)
            }
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> StoreResult<bool> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.inner.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now && entry.token == token => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn describe(&self) -> String {
        self.inner.name.clone()
    }
}
