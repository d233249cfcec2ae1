//! Integration tests for the Redis store backend
//!
//! These tests require a running Redis instance on localhost:6379

#[cfg(feature = "redis")]
mod redis_tests {
    use queuewatch_core::MetricsStore;
    use queuewatch_store::{RedisStore, RedisStoreConfig};
    use std::time::Duration;

    async fn setup_store() -> Option<RedisStore> {
        let prefix = format!("qwtest{}", std::process::id());
        let config = RedisStoreConfig::new("redis://localhost:6379")
            .with_key_prefix(prefix)
            .with_command_timeout(Duration::from_secs(2));
        RedisStore::with_config(config).await.ok()
    }

    #[tokio::test]
    async fn test_bounded_list() {
        let Some(store) = setup_store().await else {
            eprintln!("Redis not available, skipping test");
            return;
        };

        store.delete("metrics:orders").await.unwrap();
        for i in 0..5 {
            store
                .push_front("metrics:orders", i.to_string(), 3)
                .await
                .unwrap();
        }

        let items = store.range("metrics:orders", 0, -1).await.unwrap();
        assert_eq!(items, vec!["4", "3", "2"]);

        store.trim("metrics:orders", 0).await.unwrap();
        assert!(store.range("metrics:orders", 0, -1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ttl_value() {
        let Some(store) = setup_store().await else {
            eprintln!("Redis not available, skipping test");
            return;
        };

        store
            .set_with_ttl("summary:test", "{\"totalQueues\":0}".into(), Duration::from_secs(30))
            .await
            .unwrap();
        let value = store.get("summary:test").await.unwrap();
        assert_eq!(value.as_deref(), Some("{\"totalQueues\":0}"));

        store.delete("summary:test").await.unwrap();
        assert_eq!(store.get("summary:test").await.unwrap(), None);
    }
}
