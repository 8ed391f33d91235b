//! Cancellation and deadlines for acquisition.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{LockError, LockResult};

/// Governs how long an acquisition may wait.
///
/// Fires at the earlier of its deadline (if any) or cancellation of its
/// token. Once a lock is held the context has no further effect.
#[derive(Debug, Clone, Default)]
pub struct LockContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl LockContext {
    /// A context that never fires on its own.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that fires `timeout` from now.
    ///
    /// A timeout too large for the clock gives a context with no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::background(),
        }
    }

    /// A context that fires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A context driven by an external cancellation token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Add or tighten the deadline, keeping the cancellation token.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    /// The deadline, if any.
    pub fn get_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Child context that is cancelled with this one and can be cancelled alone.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel the context.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the deadline has passed or the token was cancelled.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the context fires.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Race `fut` against the context; the future is dropped if the context fires first.
    pub async fn run<T, F>(&self, fut: F) -> LockResult<T>
    where
        F: Future<Output = LockResult<T>>,
    {
        if self.is_done() {
            return Err(LockError::Timeout);
        }
        tokio::select! {
            biased;
            result = fut => result,
            _ = self.done() => Err(LockError::Timeout),
        }
    }
}
