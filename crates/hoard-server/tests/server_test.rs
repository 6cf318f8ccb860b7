//! Server lifecycle against disabled and unreachable caches.

use hoard_cache::ConnectionState;
use hoard_config::{AppConfig, CacheConfig};
use hoard_server::{run, start_cache};

#[tokio::test]
async fn test_run_with_disabled_cache_stops_cleanly() {
    let config = AppConfig {
        cache: CacheConfig::disabled(),
        ..Default::default()
    };

    run(config, async {}).await.unwrap();
}

#[tokio::test]
async fn test_unreachable_store_starts_degraded() {
    let config = AppConfig {
        cache: CacheConfig {
            url: "redis://127.0.0.1:1".to_string(),
            connect_timeout_secs: 1,
            ..Default::default()
        },
        ..Default::default()
    };

    let cache = start_cache(&config).await.unwrap();
    assert_eq!(cache.state(), ConnectionState::Degraded);
    assert_eq!(cache.get::<u32>("hoard:anything").await, None);

    cache.stop().await;
    assert_eq!(cache.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_invalid_url_fails_startup() {
    let config = AppConfig {
        cache: CacheConfig {
            url: "not a url".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    let err = start_cache(&config).await.unwrap_err();
    assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
}
