use crate::config::RedisConnectionConfig;
use crate::connection::{KeyValueConnection, RedisConnection};
use crate::error::{Result, StoreError};
use crate::model::IdempotencyResource;
use crate::observability::mask_sensitive;
use async_trait::async_trait;
use std::sync::Arc;

/// Expiry applied to every write when none is configured (24 hours).
pub const DEFAULT_TTL_SECS: u64 = 86_400;

/// Storage contract consumed by the idempotency middleware.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    fn is_open(&self) -> bool;

    fn is_ready(&self) -> bool;

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    /// Returns `None` when nothing (or nothing unexpired) is stored under `key`.
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<IdempotencyResource>>;

    async fn create(&self, resource: &IdempotencyResource) -> Result<()>;

    async fn update(&self, resource: &IdempotencyResource) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Where the store gets its Redis connection from.
pub enum ConnectionSource {
    /// Share a handle the caller already owns.
    Instance(Arc<RedisConnection>),
    /// Build a dedicated handle from these parameters.
    Config(RedisConnectionConfig),
}

pub struct RedisStoreOptions {
    pub connection: ConnectionSource,
    /// Expiry in seconds. Must be positive; defaults to [`DEFAULT_TTL_SECS`].
    pub ttl: Option<u64>,
}

impl RedisStoreOptions {
    pub fn with_instance(connection: Arc<RedisConnection>) -> Self {
        Self {
            connection: ConnectionSource::Instance(connection),
            ttl: None,
        }
    }

    pub fn with_config(config: RedisConnectionConfig) -> Self {
        Self {
            connection: ConnectionSource::Config(config),
            ttl: None,
        }
    }

    pub fn ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl = Some(ttl_secs);
        self
    }
}

fn resolve_ttl(ttl: Option<u64>) -> Result<u64> {
    match ttl {
        Some(0) => Err(StoreError::Config("ttl must be a positive number of seconds".to_string())),
        Some(ttl) => Ok(ttl),
        None => Ok(DEFAULT_TTL_SECS),
    }
}

/// Persists idempotency resources in Redis, one key per resource.
///
/// The value is the JSON object of every field except the key, written
/// with `EX ttl`. `create` and `update` are the same unconditional
/// overwrite: neither checks whether the key already exists.
pub struct RedisIdempotencyStore<C: KeyValueConnection = RedisConnection> {
    connection: Arc<C>,
    ttl: u64,
}

impl RedisIdempotencyStore<RedisConnection> {
    /// Builds the store without touching the network.
    pub fn new(options: RedisStoreOptions) -> Result<Self> {
        let ttl = resolve_ttl(options.ttl)?;
        let connection = match options.connection {
            ConnectionSource::Instance(connection) => connection,
            ConnectionSource::Config(config) => Arc::new(RedisConnection::from_config(&config)?),
        };

        Ok(Self { connection, ttl })
    }
}

impl<C: KeyValueConnection> RedisIdempotencyStore<C> {
    pub fn with_connection(connection: Arc<C>, ttl: Option<u64>) -> Result<Self> {
        Ok(Self {
            connection,
            ttl: resolve_ttl(ttl)?,
        })
    }

    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    async fn write(&self, resource: &IdempotencyResource) -> Result<()> {
        let payload = resource.encode_payload().map_err(StoreError::Encode)?;

        self.connection
            .set_ex(&resource.idempotency_key, &payload, self.ttl)
            .await?;

        tracing::debug!(
            key = %mask_sensitive(&resource.idempotency_key, 4),
            ttl_secs = self.ttl,
            "Stored idempotency resource"
        );
        Ok(())
    }
}

#[async_trait]
impl<C: KeyValueConnection + 'static> IdempotencyStore for RedisIdempotencyStore<C> {
    fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    fn is_ready(&self) -> bool {
        self.connection.is_ready()
    }

    async fn connect(&self) -> Result<()> {
        self.connection.connect().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.connection.disconnect().await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<IdempotencyResource>> {
        let payload = match self.connection.get(key).await? {
            Some(payload) if !payload.is_empty() => payload,
            _ => {
                tracing::debug!(key = %mask_sensitive(key, 4), "Idempotency resource not found");
                return Ok(None);
            }
        };

        match IdempotencyResource::decode_payload(key, &payload) {
            Ok(resource) => {
                tracing::debug!(key = %mask_sensitive(key, 4), "Idempotency resource found");
                Ok(Some(resource))
            }
            Err(e) => {
                tracing::warn!(key = %mask_sensitive(key, 4), "Failed to decode stored idempotency resource: {}", e);
                Err(StoreError::Decode {
                    key: key.to_string(),
                    source: e,
                })
            }
        }
    }

    async fn create(&self, resource: &IdempotencyResource) -> Result<()> {
        self.write(resource).await
    }

    async fn update(&self, resource: &IdempotencyResource) -> Result<()> {
        self.write(resource).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.connection.del(key).await?;
        tracing::debug!(key = %mask_sensitive(key, 4), "Deleted idempotency resource");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MockKeyValueConnection;
    use mockall::predicate::eq;
    use serde_json::{json, Value};

    fn store(mock: MockKeyValueConnection, ttl: Option<u64>) -> RedisIdempotencyStore<MockKeyValueConnection> {
        RedisIdempotencyStore::with_connection(Arc::new(mock), ttl).unwrap()
    }

    fn sample() -> IdempotencyResource {
        IdempotencyResource::new("abc")
            .with_field("status", 200)
            .with_field("body", "ok")
    }

    #[test]
    fn test_default_ttl() {
        let store = store(MockKeyValueConnection::new(), None);
        assert_eq!(store.ttl(), DEFAULT_TTL_SECS);
        assert_eq!(store.ttl(), 86_400);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let result = RedisIdempotencyStore::with_connection(Arc::new(MockKeyValueConnection::new()), Some(0));
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn test_new_from_config_does_not_connect() {
        let options = RedisStoreOptions::with_config(RedisConnectionConfig::default()).ttl(5);
        let store = RedisIdempotencyStore::new(options).unwrap();
        assert_eq!(store.ttl(), 5);
        assert!(!store.is_open());
        assert!(!store.is_ready());
    }

    #[test]
    fn test_new_rejects_bad_url_and_zero_ttl() {
        let bad_url = RedisConnectionConfig {
            url: "definitely not redis".to_string(),
            ..Default::default()
        };
        assert!(RedisIdempotencyStore::new(RedisStoreOptions::with_config(bad_url)).is_err());

        let zero = RedisStoreOptions::with_config(RedisConnectionConfig::default()).ttl(0);
        assert!(matches!(RedisIdempotencyStore::new(zero), Err(StoreError::Config(_))));
    }

    #[test]
    fn test_new_shares_instance() {
        let connection = Arc::new(RedisConnection::from_config(&RedisConnectionConfig::default()).unwrap());
        let store = RedisIdempotencyStore::new(RedisStoreOptions::with_instance(connection.clone())).unwrap();
        assert!(Arc::ptr_eq(store.connection(), &connection));
    }

    #[tokio::test]
    async fn test_create_writes_payload_without_key() {
        let mut mock = MockKeyValueConnection::new();
        mock.expect_set_ex()
            .withf(|key: &str, value: &str, ttl: &u64| {
                let stored: Value = serde_json::from_str(value).unwrap();
                key == "abc" && stored == json!({"status": 200, "body": "ok"}) && *ttl == 86_400
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        store(mock, None).create(&sample()).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_uses_configured_ttl() {
        let mut mock = MockKeyValueConnection::new();
        mock.expect_set_ex()
            .withf(|key: &str, _value: &str, ttl: &u64| key == "abc" && *ttl == 5)
            .times(2)
            .returning(|_, _, _| Ok(()));

        let store = store(mock, Some(5));
        store.create(&sample()).await.unwrap();
        store.update(&sample()).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_reattaches_key() {
        let mut mock = MockKeyValueConnection::new();
        mock.expect_get()
            .with(eq("abc"))
            .times(1)
            .returning(|_| Ok(Some(r#"{"status":200,"body":"ok"}"#.to_string())));

        let found = store(mock, None).find_by_idempotency_key("abc").await.unwrap();
        assert_eq!(found, Some(sample()));
    }

    #[tokio::test]
    async fn test_find_missing_and_empty_return_none() {
        let mut mock = MockKeyValueConnection::new();
        mock.expect_get().with(eq("missing")).returning(|_| Ok(None));
        mock.expect_get().with(eq("empty")).returning(|_| Ok(Some(String::new())));

        let store = store(mock, None);
        assert!(store.find_by_idempotency_key("missing").await.unwrap().is_none());
        assert!(store.find_by_idempotency_key("empty").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_corrupt_payload_is_error() {
        let mut mock = MockKeyValueConnection::new();
        mock.expect_get()
            .returning(|_| Ok(Some("<html>not json</html>".to_string())));

        let err = store(mock, None).find_by_idempotency_key("abc").await.unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref key, .. } if key == "abc"));
    }

    #[tokio::test]
    async fn test_backend_errors_propagate() {
        let mut mock = MockKeyValueConnection::new();
        mock.expect_get().returning(|_| {
            Err(redis::RedisError::from((redis::ErrorKind::IoError, "connection reset")).into())
        });
        mock.expect_del().returning(|_| {
            Err(redis::RedisError::from((redis::ErrorKind::ClientError, "The client is closed")).into())
        });

        let store = store(mock, None);
        let err = store.find_by_idempotency_key("abc").await.unwrap_err();
        assert!(matches!(err, StoreError::Redis(_)));
        assert!(err.to_string().contains("connection reset"));

        let err = store.delete("abc").await.unwrap_err();
        assert!(err.is_connection_error());
    }

    #[tokio::test]
    async fn test_delete_is_unconditional() {
        let mut mock = MockKeyValueConnection::new();
        mock.expect_del().with(eq("never-written")).times(1).returning(|_| Ok(()));

        store(mock, None).delete("never-written").await.unwrap();
    }

    #[tokio::test]
    async fn test_lifecycle_delegates() {
        let mut mock = MockKeyValueConnection::new();
        mock.expect_connect().times(1).returning(|| Ok(()));
        mock.expect_disconnect().times(1).returning(|| Ok(()));
        mock.expect_is_open().return_const(true);
        mock.expect_is_ready().return_const(false);

        let store = store(mock, None);
        store.connect().await.unwrap();
        assert!(store.is_open());
        assert!(!store.is_ready());
        store.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_usable_as_trait_object() {
        let mut mock = MockKeyValueConnection::new();
        mock.expect_del().returning(|_| Ok(()));

        let store: Arc<dyn IdempotencyStore> = Arc::new(store(mock, None));
        store.delete("abc").await.unwrap();
    }
}
