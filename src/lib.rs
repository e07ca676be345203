pub mod config;
pub mod connection;
pub mod error;
pub mod model;
pub mod observability;
pub mod store;

pub use connection::{KeyValueConnection, RedisConnection};
pub use error::{Result, StoreError};
pub use model::IdempotencyResource;
pub use store::{
    ConnectionSource, IdempotencyStore, RedisIdempotencyStore, RedisStoreOptions, DEFAULT_TTL_SECS,
};
