//! Redis endpoint configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::{RedisError, Result};

/// Configuration for one Redis endpoint.
///
/// A quorum lock builds one of these per independent instance; a single
/// lock needs exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL (redis://host:port or rediss://host:port for TLS).
    pub url: String,
    /// Connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Minimum idle connections.
    #[serde(default)]
    pub min_idle: Option<u32>,
    /// Connection timeout.
    #[serde(with = "millis_serde", default = "default_connection_timeout")]
    pub connection_timeout: Duration,
    /// Command timeout.
    #[serde(with = "millis_serde", default = "default_command_timeout")]
    pub command_timeout: Duration,
    /// Database number (0-15).
    #[serde(default)]
    pub database: Option<u8>,
    /// Username for Redis 6+ ACL.
    #[serde(default)]
    pub username: Option<String>,
    /// Password.
    #[serde(default)]
    pub password: Option<String>,
    /// Use TLS.
    #[serde(default)]
    pub tls: bool,
    /// Name given to each pooled connection via `CLIENT SETNAME`.
    #[serde(default)]
    pub connection_name: Option<String>,
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: default_pool_size(),
            min_idle: Some(1),
            connection_timeout: default_connection_timeout(),
            command_timeout: default_command_timeout(),
            database: None,
            username: None,
            password: None,
            tls: false,
            connection_name: None,
        }
    }
}

impl RedisConfig {
    /// Create a new configuration.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Create a builder.
    pub fn builder() -> RedisConfigBuilder {
        RedisConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> RedisConfigBuilder {
        let mut builder = RedisConfigBuilder::new();

        if let Ok(url) = std::env::var("REDIS_URL") {
            builder = builder.url(url);
        }

        if let Ok(pool_size) = std::env::var("REDIS_POOL_SIZE")
            && let Ok(size) = pool_size.parse()
        {
            builder = builder.pool_size(size);
        }

        if let Ok(db) = std::env::var("REDIS_DATABASE")
            && let Ok(db_num) = db.parse()
        {
            builder = builder.database(db_num);
        }

        if let Ok(username) = std::env::var("REDIS_USERNAME") {
            builder = builder.username(username);
        }

        if let Ok(password) = std::env::var("REDIS_PASSWORD") {
            builder = builder.password(password);
        }

        if std::env::var("REDIS_TLS").is_ok() {
            builder = builder.tls(true);
        }

        if let Ok(name) = std::env::var("REDIS_CONNECTION_NAME") {
            builder = builder.connection_name(name);
        }

        builder
    }

    /// Full connection URL with credentials and database applied.
    ///
    /// Credentials and database set on the config override any already
    /// embedded in `url`.
    pub fn connection_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| RedisError::Config(format!("invalid redis url {}: {}", self.url, e)))?;

        match url.scheme() {
            "redis" | "rediss" => {}
            other => {
                return Err(RedisError::Config(format!(
                    "unsupported scheme {other}, expected redis or rediss"
                )));
            }
        }

        if self.tls && url.scheme() == "redis" {
            url.set_scheme("rediss")
                .map_err(|_| RedisError::Config("cannot switch url to rediss".into()))?;
        }

        if let Some(password) = &self.password {
            let username = self.username.as_deref().unwrap_or("");
            url.set_username(username)
                .and_then(|_| url.set_password(Some(password)))
                .map_err(|_| RedisError::Config("url cannot carry credentials".into()))?;
        }

        if let Some(db) = self.database {
            url.set_path(&format!("/{db}"));
        }

        Ok(url.to_string())
    }

    /// Endpoint label safe for logs (no credentials).
    pub fn endpoint(&self) -> String {
        match Url::parse(&self.url) {
            Ok(url) => {
                let host = url.host_str().unwrap_or("localhost");
                let port = url.port().unwrap_or(6379);
                match self.database {
                    Some(db) => format!("{host}:{port}/{db}"),
                    None => format!("{host}:{port}"),
                }
            }
            Err(_) => self.url.clone(),
        }
    }
}

/// Builder for Redis configuration.
#[derive(Default)]
pub struct RedisConfigBuilder {
    config: RedisConfig,
}

impl RedisConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: RedisConfig::default(),
        }
    }

    /// Set the Redis URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Set the pool size.
    pub fn pool_size(mut self, size: u32) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set the minimum idle connections.
    pub fn min_idle(mut self, min_idle: u32) -> Self {
        self.config.min_idle = Some(min_idle);
        self
    }

    /// Set the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Set the command timeout.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set the database number.
    pub fn database(mut self, db: u8) -> Self {
        self.config.database = Some(db);
        self
    }

    /// Set the username (Redis 6+ ACL).
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    /// Enable TLS.
    pub fn tls(mut self, enabled: bool) -> Self {
        self.config.tls = enabled;
        self
    }

    /// Set the name reported by `CLIENT LIST` for pooled connections.
    pub fn connection_name(mut self, name: impl Into<String>) -> Self {
        self.config.connection_name = Some(name.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RedisConfig {
        self.config
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
