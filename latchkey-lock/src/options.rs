//! Lock timing configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{LockError, LockResult};

/// Default lease TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Default pause between blocking acquisition attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Longest accepted TTL or retry interval: one year.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Immutable timing settings shared by every lock minted from one factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOptions {
    /// Lease TTL attached to the store entry.
    #[serde(with = "millis_serde", default = "default_ttl")]
    pub ttl: Duration,
    /// Pause between attempts in a blocking `lock`.
    #[serde(with = "millis_serde", default = "default_retry_interval")]
    pub retry_interval: Duration,
}

fn default_ttl() -> Duration {
    DEFAULT_TTL
}

fn default_retry_interval() -> Duration {
    DEFAULT_RETRY_INTERVAL
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl LockOptions {
    /// Create options with the given TTL and retry interval.
    pub fn new(ttl: Duration, retry_interval: Duration) -> Self {
        Self {
            ttl,
            retry_interval,
        }
    }

    /// Create a builder.
    pub fn builder() -> LockOptionsBuilder {
        LockOptionsBuilder::new()
    }

    /// Load options from `LATCHKEY_LOCK_TTL_MS` and `LATCHKEY_RETRY_INTERVAL_MS`.
    pub fn from_env() -> LockOptionsBuilder {
        let mut builder = LockOptionsBuilder::new();

        if let Ok(ttl) = std::env::var("LATCHKEY_LOCK_TTL_MS")
            && let Ok(ms) = ttl.parse()
        {
            builder = builder.ttl(Duration::from_millis(ms));
        }

        if let Ok(interval) = std::env::var("LATCHKEY_RETRY_INTERVAL_MS")
            && let Ok(ms) = interval.parse()
        {
            builder = builder.retry_interval(Duration::from_millis(ms));
        }

        builder
    }

    /// Interval at which a held lease is re-extended: a third of the TTL.
    pub fn renewal_interval(&self) -> Duration {
        self.ttl / 3
    }

    /// Reject settings under which the watchdog could not keep a lease alive
    /// or that no clock can represent.
    pub fn validate(&self) -> LockResult<()> {
        if self.renewal_interval() < Duration::from_millis(1) {
            return Err(LockError::Config(format!(
                "ttl {:?} is too short to schedule renewals",
                self.ttl
            )));
        }
        if self.ttl > MAX_TTL {
            return Err(LockError::Config(format!(
                "ttl {:?} exceeds the maximum of {:?}",
                self.ttl, MAX_TTL
            )));
        }
        if self.retry_interval.is_zero() {
            return Err(LockError::Config("retry interval must be non-zero".into()));
        }
        if self.retry_interval > MAX_TTL {
            return Err(LockError::Config(format!(
                "retry interval {:?} exceeds the maximum of {:?}",
                self.retry_interval, MAX_TTL
            )));
        }
        Ok(())
    }
}

/// Builder for [`LockOptions`].
#[derive(Debug, Default)]
pub struct LockOptionsBuilder {
    options: LockOptions,
}

impl LockOptionsBuilder {
    /// Create a builder starting from the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lease TTL.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.options.ttl = ttl;
        self
    }

    /// Set the retry interval.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.options.retry_interval = interval;
        self
    }

    /// Build the options.
    pub fn build(self) -> LockOptions {
        self.options
    }
}

mod millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
