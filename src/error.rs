use thiserror::Error;

/// Errors surfaced by the idempotency store.
///
/// Backend failures are passed through untouched so callers see exactly
/// what the Redis client reported.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("Failed to encode idempotency resource: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode stored payload for key '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// True when the underlying connection was lost or never opened.
    pub fn is_connection_error(&self) -> bool {
        match self {
            StoreError::Redis(e) => {
                e.is_io_error()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
                    || e.kind() == redis::ErrorKind::ClientError
            }
            _ => false,
        }
    }
}

impl From<config::ConfigError> for StoreError {
    fn from(e: config::ConfigError) -> Self {
        StoreError::Config(e.to_string())
    }
}

impl From<validator::ValidationErrors> for StoreError {
    fn from(e: validator::ValidationErrors) -> Self {
        StoreError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
