//! Integration tests for latchkey-redis

use latchkey_redis::*;
use std::time::Duration;

#[test]
fn test_config_from_json_uses_defaults() {
    let config: RedisConfig =
        serde_json::from_str(r#"{ "url": "redis://10.0.0.5:6379", "command_timeout": 250 }"#)
            .unwrap();

    assert_eq!(config.url, "redis://10.0.0.5:6379");
    assert_eq!(config.pool_size, 10);
    assert_eq!(config.command_timeout, Duration::from_millis(250));
    assert_eq!(config.connection_timeout, Duration::from_secs(5));
    assert!(!config.tls);
    assert!(config.connection_name.is_none());
}

#[test]
fn test_config_json_roundtrip_keeps_durations() {
    let config = RedisConfig::builder()
        .url("redis://127.0.0.1:6379")
        .connection_timeout(Duration::from_millis(1500))
        .database(4)
        .build();

    let json = serde_json::to_string(&config).unwrap();
    let parsed: RedisConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
}

#[tokio::test]
async fn test_service_rejects_invalid_url() {
    let config = RedisConfig::new("memcached://127.0.0.1:11211");
    let err = RedisService::new(config).await.err().unwrap();
    assert!(matches!(err, RedisError::Config(_)));
    assert!(!err.is_retryable());
}

// Note: These tests require Redis running on localhost:6379
// They are disabled by default but can be run with: cargo test -- --ignored

#[tokio::test]
#[ignore]
async fn test_health_check() {
    let redis = RedisService::new(RedisConfig::default()).await.unwrap();
    redis.health_check().await.unwrap();

    let stats = redis.pool_stats();
    assert!(stats.connections >= 1);
}

#[tokio::test]
#[ignore]
async fn test_query_and_script() {
    let redis = RedisService::new(RedisConfig::default()).await.unwrap();

    let _: () = redis
        .query(redis::cmd("SET").arg("latchkey:redis:test").arg("v"))
        .await
        .unwrap();

    let script = redis::Script::new("return redis.call('get', KEYS[1])");
    let value: Option<String> = redis
        .invoke(&script.key("latchkey:redis:test"))
        .await
        .unwrap();
    assert_eq!(value.as_deref(), Some("v"));

    let _: i64 = redis
        .query(redis::cmd("DEL").arg("latchkey:redis:test"))
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn test_connection_name_applied_to_pooled_connections() {
    let config = RedisConfig::builder()
        .url("redis://127.0.0.1:6379")
        .connection_name("latchkey-it")
        .build();
    let redis = RedisService::new(config).await.unwrap();

    let name: Option<String> = redis
        .query(redis::cmd("CLIENT").arg("GETNAME"))
        .await
        .unwrap();
    assert_eq!(name.as_deref(), Some("latchkey-it"));
}
