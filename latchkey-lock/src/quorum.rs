//! Quorum lock across independent store instances (Redlock).
//!
//! The same key is claimed with the same token on every instance and the
//! lock is held once a majority accepted. Two concurrent claimants cannot
//! both reach a majority, so the lock tolerates a minority of failed
//! instances. Like every Redlock variant it assumes bounded clock drift and
//! process pauses shorter than the TTL; it is not a consensus protocol.

use futures::future::join_all;
use latchkey_redis::RedisConfig;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::LockContext;
use crate::error::{LockError, LockResult};
use crate::lock::LockState;
use crate::options::LockOptions;
use crate::store::{LockStore, RedisStore};
use crate::token::{TokenGenerator, UuidTokens};
use crate::watchdog::{Lease, Watchdog};

/// Majority of `n` instances.
pub fn quorum(n: usize) -> usize {
    n / 2 + 1
}

/// Lock held on a majority of independent stores.
///
/// Attempts take `&mut self`, so one instance can never run two attempts at
/// once. A failed attempt leaves the lock idle and it may be tried again;
/// after `unlock` it is spent.
///
/// # Examples
///
/// ```rust,ignore
/// use latchkey_lock::*;
///
/// let mut lock = QuorumLock::connect(
///     ["redis://10.0.0.1:6379", "redis://10.0.0.2:6379", "redis://10.0.0.3:6379"],
///     "ledger",
///     LockOptions::default(),
/// )
/// .await?;
///
/// lock.try_lock(&LockContext::background()).await?;
/// // critical section
/// lock.unlock(&LockContext::background()).await?;
/// ```
pub struct QuorumLock {
    stores: Vec<Arc<dyn LockStore>>,
    held: Vec<Arc<dyn LockStore>>,
    tokens: Arc<dyn TokenGenerator>,
    resource: String,
    options: LockOptions,
    token: Option<String>,
    state: LockState,
    watchdog: Option<Watchdog>,
}

impl QuorumLock {
    /// Create a quorum lock on `resource` over `stores`.
    pub fn new(
        stores: Vec<Arc<dyn LockStore>>,
        resource: impl Into<String>,
        options: LockOptions,
    ) -> LockResult<Self> {
        if stores.is_empty() {
            return Err(LockError::Config("quorum lock needs at least one store".into()));
        }
        options.validate()?;

        Ok(Self {
            stores,
            held: Vec::new(),
            tokens: Arc::new(UuidTokens),
            resource: resource.into(),
            options,
            token: None,
            state: LockState::Idle,
            watchdog: None,
        })
    }

    /// Connect one pooled store per endpoint URL.
    ///
    /// Every endpoint must be reachable at construction time.
    pub async fn connect<I, S>(
        urls: I,
        resource: impl Into<String>,
        options: LockOptions,
    ) -> LockResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut stores: Vec<Arc<dyn LockStore>> = Vec::new();
        for url in urls {
            let store = RedisStore::connect(RedisConfig::new(url)).await?;
            stores.push(Arc::new(store));
        }
        Self::new(stores, resource, options)
    }

    /// Replace the fencing token source.
    pub fn with_tokens(mut self, tokens: impl TokenGenerator + 'static) -> Self {
        self.tokens = Arc::new(tokens);
        self
    }

    /// The locked resource key.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Acceptances needed to hold the lock.
    pub fn quorum(&self) -> usize {
        quorum(self.stores.len())
    }

    /// Number of configured stores.
    pub fn store_count(&self) -> usize {
        self.stores.len()
    }

    /// Stores won in the current holding; zero unless held.
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Fencing token of the current holding.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Whether the lock is held.
    pub fn is_held(&self) -> bool {
        self.state == LockState::Held
    }

    /// Claim the key on every store and keep it if a majority accepted.
    ///
    /// Waits for every store to answer before deciding. On failure, claims
    /// that did land are rolled back and [`LockError::LockFailed`] is returned,
    /// or [`LockError::Timeout`] if the context cut some claims short. Store
    /// errors count as refusals. There is no retry at this level.
    pub async fn try_lock(&mut self, ctx: &LockContext) -> LockResult<()> {
        match self.state {
            LockState::Idle => {}
            LockState::Held => return Err(LockError::AlreadyHeld),
            LockState::Released => return Err(LockError::Released),
        }

        let token = self.tokens.generate();
        let ttl = self.options.ttl;
        let resource = self.resource.as_str();

        let attempts = self.stores.iter().map(|store| {
            let token = token.as_str();
            async move {
                let accepted = ctx
                    .run(async {
                        store
                            .set_if_absent(resource, token, ttl)
                            .await
                            .map_err(LockError::from)
                    })
                    .await;
                (store, accepted)
            }
        });

        let mut won = Vec::new();
        let mut abandoned = Vec::new();
        for (store, accepted) in join_all(attempts).await {
            match accepted {
                Ok(true) => won.push(Arc::clone(store)),
                Ok(false) => debug!(resource, store = %store.describe(), "claim refused"),
                // the SET may still land after being abandoned
                Err(LockError::Timeout) => abandoned.push(Arc::clone(store)),
                Err(e) => warn!(resource, store = %store.describe(), error = %e, "claim failed"),
            }
        }

        if !abandoned.is_empty() {
            release_all(&abandoned, resource, &token).await;
        }

        let needed = self.quorum();
        if won.len() < needed {
            debug!(resource, acquired = won.len(), quorum = needed, "quorum not reached, rolling back");
            release_all(&won, resource, &token).await;
            return if abandoned.is_empty() {
                Err(LockError::LockFailed)
            } else {
                Err(LockError::Timeout)
            };
        }

        info!(resource, acquired = won.len(), quorum = needed, "Acquired quorum lock");
        self.watchdog = Some(Watchdog::spawn(
            Lease::Quorum(won.clone()),
            self.resource.clone(),
            ttl,
            self.options.renewal_interval(),
        ));
        self.held = won;
        self.token = Some(token);
        self.state = LockState::Held;
        Ok(())
    }

    /// Release the key on every store won, then stop renewal.
    ///
    /// Individual delete failures are logged, not returned; the lock is spent
    /// afterwards either way.
    pub async fn unlock(&mut self, ctx: &LockContext) -> LockResult<()> {
        let token = match (self.state, self.token.take()) {
            (LockState::Held, Some(token)) => token,
            (LockState::Released, _) => return Err(LockError::Released),
            _ => return Err(LockError::NotHeld),
        };

        let held = std::mem::take(&mut self.held);
        let released = ctx.run(async {
            release_all(&held, &self.resource, &token).await;
            Ok(())
        });
        if released.await.is_err() {
            warn!(resource = %self.resource, "release abandoned, remaining entries expire with their TTL");
        }

        if let Some(watchdog) = self.watchdog.take() {
            watchdog.stop();
        }
        self.state = LockState::Released;
        Ok(())
    }
}

/// Token-checked delete on every store in parallel; failures are only logged.
async fn release_all(stores: &[Arc<dyn LockStore>], resource: &str, token: &str) {
    let results = join_all(
        stores
            .iter()
            .map(|store| store.compare_and_delete(resource, token)),
    )
    .await;

    for (store, result) in stores.iter().zip(results) {
        match result {
            Ok(true) => {}
            Ok(false) => debug!(resource, store = %store.describe(), "entry already gone"),
            Err(e) => warn!(resource, store = %store.describe(), error = %e, "release failed"),
        }
    }
}

impl fmt::Debug for QuorumLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuorumLock")
            .field("resource", &self.resource)
            .field("state", &self.state)
            .field("stores", &self.stores.len())
            .field("held", &self.held.len())
            .finish()
    }
}
