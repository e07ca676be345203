use crate::error::Result;
use crate::observability::{LogConfig, LogFormat};
use crate::store::{ConnectionSource, RedisStoreOptions};
use config::builder::{ConfigBuilder, DefaultState};
use serde::Deserialize;
use validator::Validate;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct Settings {
    #[serde(default)]
    pub redis: RedisConnectionConfig,
    #[serde(default)]
    #[validate]
    pub idempotency: IdempotencySettings,
    #[serde(default)]
    pub log: LogSettings,
}

/// Parameters used to build a new Redis connection handle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConnectionConfig {
    pub url: String,
    pub database: Option<i64>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sent with `CLIENT SETNAME` after connecting.
    pub client_name: Option<String>,
}

impl Default for RedisConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            database: None,
            username: None,
            password: None,
            client_name: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct IdempotencySettings {
    /// Expiry applied to every write, in seconds. Unset means the store default.
    #[validate(range(min = 1))]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Settings {
    /// Loads `config/default`, `config/local` and `APP__*` environment overrides.
    pub fn new() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        Self::from_builder(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Store options that build a fresh connection from the `redis` section.
    pub fn store_options(&self) -> RedisStoreOptions {
        RedisStoreOptions {
            connection: ConnectionSource::Config(self.redis.clone()),
            ttl: self.idempotency.ttl_secs,
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log.level.clone(),
            format: LogFormat::from(self.log.format.as_str()),
            ..LogConfig::default()
        }
    }
}
