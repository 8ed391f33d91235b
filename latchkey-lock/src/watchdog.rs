//! Background lease renewal.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::store::LockStore;

/// What a watchdog keeps alive.
pub(crate) enum Lease {
    /// One store; the first failed renewal ends the watchdog.
    Single(Arc<dyn LockStore>),
    /// Quorum members won in the current attempt, renewed independently.
    Quorum(Vec<Arc<dyn LockStore>>),
}

/// Handle to a running renewal task.
///
/// Stopping consumes the handle, so the stop signal is sent at most once.
/// Dropping the handle without stopping also ends the task.
pub(crate) struct Watchdog {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Watchdog {
    /// Spawn a task renewing `key` to `ttl` every `interval`.
    ///
    /// The first renewal happens one interval after spawning. Each renewal
    /// call is bounded by `interval` so a slow store never overlaps the next tick.
    pub(crate) fn spawn(lease: Lease, key: String, ttl: Duration, interval: Duration) -> Self {
        let (stop, mut stopped) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stopped => {
                        debug!(resource = %key, "watchdog stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        if !lease.renew(&key, ttl, interval).await {
                            return;
                        }
                    }
                }
            }
        });

        Self { stop, task }
    }

    /// Whether the renewal task is still alive.
    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the task to exit.
    pub(crate) fn stop(self) {
        // the task may already have exited after losing the lease
        let _ = self.stop.send(());
    }
}

impl Lease {
    /// Renew once. Returns `false` when the watchdog should exit.
    async fn renew(&self, key: &str, ttl: Duration, limit: Duration) -> bool {
        match self {
            Lease::Single(store) => match extend(store.as_ref(), key, ttl, limit).await {
                Ok(()) => true,
                Err(reason) => {
                    warn!(resource = key, store = %store.describe(), reason, "lease lost, renewal stopped");
                    false
                }
            },
            Lease::Quorum(stores) => {
                let results = join_all(
                    stores
                        .iter()
                        .map(|store| extend(store.as_ref(), key, ttl, limit)),
                )
                .await;

                for (store, result) in stores.iter().zip(results) {
                    if let Err(reason) = result {
                        warn!(resource = key, store = %store.describe(), reason, "quorum member renewal failed");
                    }
                }
                true
            }
        }
    }
}

async fn extend(
    store: &dyn LockStore,
    key: &str,
    ttl: Duration,
    limit: Duration,
) -> Result<(), &'static str> {
    match tokio::time::timeout(limit, store.extend(key, ttl)).await {
        Ok(Ok(true)) => {
            debug!(resource = key, store = %store.describe(), "lease renewed");
            Ok(())
        }
        Ok(Ok(false)) => Err("key expired or deleted"),
        Ok(Err(e)) => {
            debug!(resource = key, error = %e, "renewal call failed");
            Err("store error")
        }
        Err(_) => Err("renewal timed out"),
    }
}
