#![allow(dead_code)]

use idempotency_redis::config::RedisConnectionConfig;
use idempotency_redis::{IdempotencyStore, RedisIdempotencyStore, RedisStoreOptions};
use redis::aio::MultiplexedConnection;
use uuid::Uuid;

pub fn redis_url() -> String {
    dotenvy::dotenv().ok();
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

pub fn redis_config() -> RedisConnectionConfig {
    RedisConnectionConfig {
        url: redis_url(),
        ..Default::default()
    }
}

/// Returns a connected store, or `None` when no Redis server is reachable.
pub async fn connected_store(ttl: Option<u64>) -> Option<RedisIdempotencyStore> {
    let mut options = RedisStoreOptions::with_config(redis_config());
    options.ttl = ttl;

    let store = RedisIdempotencyStore::new(options).expect("Failed to build store");
    match store.connect().await {
        Ok(()) => Some(store),
        Err(e) => {
            eprintln!("skipping: Redis unavailable at {}: {}", redis_url(), e);
            None
        }
    }
}

/// Plain client connection for inspecting what the store wrote.
pub async fn raw_connection() -> MultiplexedConnection {
    redis::Client::open(redis_url())
        .expect("Invalid REDIS_URL")
        .get_multiplexed_async_connection()
        .await
        .expect("Failed to connect to Redis")
}

pub fn unique_key() -> String {
    format!("idem_test_{}", Uuid::new_v4())
}
