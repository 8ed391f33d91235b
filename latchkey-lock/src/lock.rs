//! Single-instance distributed lock.

use latchkey_redis::RedisConfig;
use std::fmt;
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::context::LockContext;
use crate::error::{LockError, LockResult};
use crate::options::LockOptions;
use crate::store::{LockStore, RedisStore};
use crate::token::{TokenGenerator, UuidTokens};
use crate::watchdog::{Lease, Watchdog};

/// Lifecycle of a lock instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Not yet acquired.
    Idle,
    /// Acquired; the watchdog is renewing the lease.
    Held,
    /// Released. Terminal.
    Released,
}

/// Factory minting locks that share one store and one set of timings.
///
/// # Examples
///
/// ```rust,ignore
/// use latchkey_lock::*;
/// use std::time::Duration;
///
/// let locker = Locker::redis(RedisConfig::new("redis://127.0.0.1/"), LockOptions::default()).await?;
///
/// let mut lock = locker.get_lock("invoices:2024-06");
/// lock.lock(&LockContext::with_timeout(Duration::from_secs(5))).await?;
/// // critical section
/// lock.unlock(&LockContext::background()).await?;
/// ```
#[derive(Clone)]
pub struct Locker {
    store: Arc<dyn LockStore>,
    options: LockOptions,
    tokens: Arc<dyn TokenGenerator>,
}

impl Locker {
    /// Create a factory over `store`.
    pub fn new(store: Arc<dyn LockStore>, options: LockOptions) -> LockResult<Self> {
        options.validate()?;
        Ok(Self {
            store,
            options,
            tokens: Arc::new(UuidTokens),
        })
    }

    /// Create a factory over a pooled Redis connection.
    pub async fn redis(config: RedisConfig, options: LockOptions) -> LockResult<Self> {
        let store = RedisStore::connect(config).await?;
        Self::new(Arc::new(store), options)
    }

    /// Replace the fencing token source.
    pub fn with_tokens(mut self, tokens: impl TokenGenerator + 'static) -> Self {
        self.tokens = Arc::new(tokens);
        self
    }

    /// The timings handed to every lock.
    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<dyn LockStore> {
        &self.store
    }

    /// A fresh, idle lock on `resource`.
    ///
    /// No token is minted here; each acquisition attempt draws its own.
    pub fn get_lock(&self, resource: impl Into<String>) -> Lock {
        Lock {
            store: Arc::clone(&self.store),
            tokens: Arc::clone(&self.tokens),
            resource: resource.into(),
            options: self.options,
            token: None,
            state: LockState::Idle,
            watchdog: None,
        }
    }
}

impl fmt::Debug for Locker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locker")
            .field("store", &self.store.describe())
            .field("options", &self.options)
            .finish()
    }
}

/// Lock on one resource in one store.
///
/// Single use: acquire once, release once. `unlock` consumes the lock.
/// Dropping a held lock stops renewal and leaves the entry to expire after
/// one TTL.
pub struct Lock {
    store: Arc<dyn LockStore>,
    tokens: Arc<dyn TokenGenerator>,
    resource: String,
    options: LockOptions,
    token: Option<String>,
    state: LockState,
    watchdog: Option<Watchdog>,
}

impl Lock {
    /// The locked resource key.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Fencing token of the current holding.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Whether the lock was acquired and not yet released.
    pub fn is_held(&self) -> bool {
        self.state == LockState::Held
    }

    /// Whether the watchdog is still renewing the lease.
    ///
    /// Turns `false` once a renewal fails; the store entry may then expire
    /// while this lock still reports itself held.
    pub fn is_renewing(&self) -> bool {
        self.watchdog.as_ref().is_some_and(Watchdog::is_running)
    }

    /// Make a single acquisition attempt.
    ///
    /// Fails with [`LockError::LockFailed`] if another token holds the key and
    /// with [`LockError::Backend`] if the store call fails.
    pub async fn try_lock(&mut self, ctx: &LockContext) -> LockResult<()> {
        match self.state {
            LockState::Idle => {}
            LockState::Held => return Err(LockError::AlreadyHeld),
            LockState::Released => return Err(LockError::Released),
        }

        let token = self.tokens.generate();
        let ttl = self.options.ttl;
        let attempt = ctx
            .run(async {
                self.store
                    .set_if_absent(&self.resource, &token, ttl)
                    .await
                    .map_err(LockError::from)
            })
            .await;

        match attempt {
            Ok(true) => {}
            Ok(false) => {
                debug!(resource = %self.resource, "lock held elsewhere");
                return Err(LockError::LockFailed);
            }
            Err(LockError::Timeout) => {
                // the abandoned SET may still have landed
                self.spawn_cleanup(token);
                return Err(LockError::Timeout);
            }
            Err(e) => return Err(e),
        }

        self.watchdog = Some(Watchdog::spawn(
            Lease::Single(Arc::clone(&self.store)),
            self.resource.clone(),
            ttl,
            self.options.renewal_interval(),
        ));
        self.token = Some(token);
        self.state = LockState::Held;

        info!(resource = %self.resource, store = %self.store.describe(), "Acquired lock");
        Ok(())
    }

    /// Acquire, polling every retry interval until the context fires.
    ///
    /// Only contention is retried. A backend error ends the wait at once and
    /// is returned as is; a fired context yields [`LockError::Timeout`].
    pub async fn lock(&mut self, ctx: &LockContext) -> LockResult<()> {
        match self.try_lock(ctx).await {
            Err(LockError::LockFailed) => {}
            other => return other,
        }

        let retry = self.options.retry_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + retry, retry);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = ctx.done() => {
                    debug!(resource = %self.resource, "gave up waiting for lock");
                    return Err(LockError::Timeout);
                }
                _ = ticker.tick() => match self.try_lock(ctx).await {
                    Err(LockError::LockFailed) => {}
                    other => return other,
                },
            }
        }
    }

    /// Release the lock.
    ///
    /// The entry is deleted only if it still carries this lock's token, so a
    /// holder whose lease already expired cannot remove a successor's entry.
    /// The watchdog is stopped whether or not the delete succeeds.
    pub async fn unlock(mut self, ctx: &LockContext) -> LockResult<()> {
        let token = match (self.state, self.token.take()) {
            (LockState::Held, Some(token)) => token,
            _ => return Err(LockError::NotHeld),
        };

        let result = ctx
            .run(async {
                self.store
                    .compare_and_delete(&self.resource, &token)
                    .await
                    .map_err(LockError::from)
            })
            .await;

        if let Some(watchdog) = self.watchdog.take() {
            watchdog.stop();
        }
        self.state = LockState::Released;

        match result? {
            true => debug!(resource = %self.resource, "Released lock"),
            false => warn!(resource = %self.resource, "Lock already expired or taken over at release"),
        }
        Ok(())
    }

    fn spawn_cleanup(&self, token: String) {
        let store = Arc::clone(&self.store);
        let resource = self.resource.clone();
        tokio::spawn(async move {
            match store.compare_and_delete(&resource, &token).await {
                Ok(true) => debug!(resource = %resource, "abandoned claim removed"),
                Ok(false) => {}
                Err(e) => debug!(resource = %resource, error = %e, "cleanup of abandoned claim failed"),
            }
        });
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("resource", &self.resource)
            .field("state", &self.state)
            .field("token", &self.token)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use crate::store::delayed::DelayedStore;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    const TTL: Duration = Duration::from_secs(3);
    const RETRY: Duration = Duration::from_millis(100);

    fn locker(store: &MemoryStore) -> Locker {
        Locker::new(Arc::new(store.clone()), LockOptions::new(TTL, RETRY)).unwrap()
    }

    #[tokio::test]
    async fn test_try_lock_then_unlock() {
        let store = MemoryStore::new();
        let mut lock = locker(&store).get_lock("orders");
        let ctx = LockContext::background();

        assert_eq!(lock.state(), LockState::Idle);
        assert!(lock.token().is_none());

        assert_ok!(lock.try_lock(&ctx).await);
        assert!(lock.is_held());
        assert!(lock.is_renewing());
        assert_eq!(store.get("orders").as_deref(), lock.token());

        assert_ok!(lock.unlock(&ctx).await);
        assert!(!store.contains("orders"));
    }

    #[tokio::test]
    async fn test_second_try_lock_fails_with_contention() {
        let store = MemoryStore::new();
        let locker = locker(&store);
        let ctx = LockContext::background();

        let mut first = locker.get_lock("orders");
        let mut second = locker.get_lock("orders");
        assert_ok!(first.try_lock(&ctx).await);

        let err = second.try_lock(&ctx).await.unwrap_err();
        assert!(err.is_contention());
        assert_eq!(second.state(), LockState::Idle);
        assert!(!second.is_renewing());
    }

    #[tokio::test]
    async fn test_fresh_token_per_attempt() {
        let store = MemoryStore::new();
        let counter = Arc::new(AtomicU64::new(0));
        let minted = Arc::clone(&counter);
        let locker = locker(&store)
            .with_tokens(move || format!("tok-{}", minted.fetch_add(1, Ordering::SeqCst)));
        let ctx = LockContext::background();

        store.insert("orders", "other", TTL);
        let mut lock = locker.get_lock("orders");
        assert_err!(lock.try_lock(&ctx).await);
        assert_err!(lock.try_lock(&ctx).await);

        store.remove("orders");
        assert_ok!(lock.try_lock(&ctx).await);
        assert_eq!(lock.token(), Some("tok-2"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_try_lock_while_held_is_misuse() {
        let store = MemoryStore::new();
        let mut lock = locker(&store).get_lock("orders");
        let ctx = LockContext::background();

        assert_ok!(lock.try_lock(&ctx).await);
        let err = lock.try_lock(&ctx).await.unwrap_err();
        assert!(matches!(err, LockError::AlreadyHeld));
        assert!(err.is_misuse());
    }

    #[tokio::test]
    async fn test_unlock_idle_is_misuse() {
        let store = MemoryStore::new();
        let lock = locker(&store).get_lock("orders");

        let err = lock.unlock(&LockContext::background()).await.unwrap_err();
        assert!(matches!(err, LockError::NotHeld));
    }

    #[tokio::test]
    async fn test_backend_error_does_not_start_watchdog() {
        let store = MemoryStore::new();
        store.set_available(false);
        let mut lock = locker(&store).get_lock("orders");

        let err = lock.try_lock(&LockContext::background()).await.unwrap_err();
        assert!(matches!(err, LockError::Backend(StoreError::Unavailable(_))));
        assert!(!lock.is_renewing());
        assert_eq!(lock.state(), LockState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_waits_for_release() {
        let store = MemoryStore::new();
        let locker = locker(&store);
        let ctx = LockContext::background();

        let mut holder = locker.get_lock("orders");
        assert_ok!(holder.try_lock(&ctx).await);

        let waiter = {
            let locker = locker.clone();
            tokio::spawn(async move {
                let mut lock = locker.get_lock("orders");
                lock.lock(&LockContext::background()).await.map(|_| lock)
            })
        };

        tokio::time::sleep(RETRY * 5 + RETRY / 2).await;
        assert!(!waiter.is_finished());
        assert_ok!(holder.unlock(&ctx).await);

        let lock = waiter.await.unwrap().unwrap();
        assert!(lock.is_held());
        assert_eq!(store.get("orders").as_deref(), lock.token());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_times_out_at_deadline() {
        let store = MemoryStore::new();
        store.insert("orders", "other", Duration::from_secs(60));
        let mut lock = locker(&store).get_lock("orders");

        let start = Instant::now();
        let err = lock
            .lock(&LockContext::with_timeout(Duration::from_secs(2)))
            .await
            .unwrap_err();

        assert!(matches!(err, LockError::Timeout));
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(lock.state(), LockState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_propagates_backend_error_without_retry() {
        let store = MemoryStore::new();
        store.insert("orders", "other", Duration::from_secs(60));
        let mut lock = locker(&store).get_lock("orders");

        let outage = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(RETRY * 3 + RETRY / 2).await;
                store.set_available(false);
            })
        };

        let start = Instant::now();
        let err = lock.lock(&LockContext::background()).await.unwrap_err();
        outage.await.unwrap();

        assert!(matches!(err, LockError::Backend(_)));
        assert_eq!(start.elapsed(), RETRY * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_survives_past_ttl() {
        let store = MemoryStore::new();
        let mut lock = locker(&store).get_lock("orders");
        let ctx = LockContext::background();

        assert_ok!(lock.try_lock(&ctx).await);
        tokio::time::sleep(TTL * 3).await;

        assert!(store.contains("orders"));
        assert!(lock.is_renewing());
        assert_ok!(lock.unlock(&ctx).await);
        assert!(!store.contains("orders"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_unlock_leaves_successor() {
        let store = MemoryStore::new();
        let locker = locker(&store);
        let ctx = LockContext::background();

        let mut stale = locker.get_lock("orders");
        assert_ok!(stale.try_lock(&ctx).await);

        // entry vanishes behind the holder's back; renewal then gives up
        store.remove("orders");
        tokio::time::sleep(TTL).await;
        assert!(!stale.is_renewing());
        assert!(stale.is_held());

        let mut successor = locker.get_lock("orders");
        assert_ok!(successor.try_lock(&ctx).await);

        assert_ok!(stale.unlock(&ctx).await);
        assert_eq!(store.get("orders").as_deref(), successor.token());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_lock_expires() {
        let store = MemoryStore::new();
        {
            let mut lock = locker(&store).get_lock("orders");
            assert_ok!(lock.try_lock(&LockContext::background()).await);
        }
        tokio::time::sleep(TTL + Duration::from_millis(1)).await;
        assert!(!store.contains("orders"));
    }

    #[test]
    fn test_locker_rejects_bad_options() {
        let store = MemoryStore::new();
        let err = Locker::new(Arc::new(store), LockOptions::new(Duration::ZERO, RETRY)).unwrap_err();
        assert!(matches!(err, LockError::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_cut_short_by_deadline_is_removed() {
        let store = MemoryStore::new();
        let slow = DelayedStore::new(store.clone()).claim_delay(Duration::from_secs(5));
        let locker = Locker::new(Arc::new(slow), LockOptions::new(TTL, RETRY)).unwrap();

        let mut lock = locker.get_lock("orders");
        let start = Instant::now();
        let err = lock
            .try_lock(&LockContext::with_timeout(Duration::from_secs(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, LockError::Timeout));
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        assert_eq!(lock.state(), LockState::Idle);
        assert!(!lock.is_renewing());

        // the claim landed before the reply stalled; cleanup runs in the background
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!store.contains("orders"));
    }

    #[test]
    fn test_rejects_unbounded_ttl() {
        let options = LockOptions::new(Duration::MAX, RETRY);
        let err = Locker::new(Arc::new(MemoryStore::new()), options).unwrap_err();
        assert!(matches!(err, LockError::Config(_)));
    }
}
