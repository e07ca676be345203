use crate::config::RedisConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ErrorKind, IntoConnectionInfo, RedisError, RedisResult};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// The handful of key-value operations the idempotency store needs,
/// plus the connection lifecycle it exposes to callers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueConnection: Send + Sync {
    /// True once `connect` has been called and until `disconnect`.
    fn is_open(&self) -> bool;

    /// True when the connection is open and able to serve commands.
    fn is_ready(&self) -> bool;

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes `value` under `key`, replacing any previous value and expiry.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    async fn del(&self, key: &str) -> Result<()>;
}

enum LinkState {
    Closed,
    Connecting,
    Open {
        conn: MultiplexedConnection,
        ready: bool,
    },
}

fn client_closed() -> RedisError {
    RedisError::from((ErrorKind::ClientError, "The client is closed"))
}

fn already_open() -> RedisError {
    RedisError::from((ErrorKind::ClientError, "Socket already opened"))
}

/// Redis connection handle with an explicit connect/disconnect lifecycle.
///
/// Construction never touches the network. `connect` opens a single
/// multiplexed connection that every clone of the handle's callers share;
/// requests issued concurrently are pipelined over it.
pub struct RedisConnection {
    client: redis::Client,
    client_name: Option<String>,
    state: RwLock<LinkState>,
}

impl RedisConnection {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            client_name: None,
            state: RwLock::new(LinkState::Closed),
        }
    }

    /// Builds a closed handle from connection parameters. The URL is parsed
    /// eagerly so malformed settings fail here rather than on `connect`.
    pub fn from_config(config: &RedisConnectionConfig) -> Result<Self> {
        let mut info = config.url.as_str().into_connection_info()?;
        if let Some(db) = config.database {
            info.redis.db = db;
        }
        if config.username.is_some() {
            info.redis.username = config.username.clone();
        }
        if config.password.is_some() {
            info.redis.password = config.password.clone();
        }

        let client = redis::Client::open(info)?;
        Ok(Self {
            client,
            client_name: config.client_name.clone(),
            state: RwLock::new(LinkState::Closed),
        })
    }

    fn read_state(&self) -> RwLockReadGuard<'_, LinkState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, LinkState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_open(&self) -> bool {
        !matches!(*self.read_state(), LinkState::Closed)
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.read_state(), LinkState::Open { ready: true, .. })
    }

    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.write_state();
            if !matches!(*state, LinkState::Closed) {
                return Err(already_open().into());
            }
            *state = LinkState::Connecting;
        }

        let addr = self.client.get_connection_info().addr.to_string();
        info!(addr = %addr, "Connecting to Redis");

        match self.handshake().await {
            Ok(conn) => {
                let mut state = self.write_state();
                // disconnect() may have run while the handshake was in flight
                if !matches!(*state, LinkState::Connecting) {
                    return Err(client_closed().into());
                }
                *state = LinkState::Open { conn, ready: true };
                info!(addr = %addr, "Redis connection established");
                Ok(())
            }
            Err(e) => {
                *self.write_state() = LinkState::Closed;
                Err(e.into())
            }
        }
    }

    async fn handshake(&self) -> RedisResult<MultiplexedConnection> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        if let Some(name) = &self.client_name {
            let _: () = redis::cmd("CLIENT")
                .arg("SETNAME")
                .arg(name)
                .query_async(&mut conn)
                .await?;
        }

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(conn)
    }

    /// Drops the shared connection. The driver task stops once in-flight
    /// requests holding a clone have finished.
    pub async fn disconnect(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.write_state(), LinkState::Closed);
        match previous {
            LinkState::Closed => Err(client_closed().into()),
            _ => {
                info!("Redis connection closed");
                Ok(())
            }
        }
    }

    /// Round-trips a PING over the open connection.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection()?;
        let result: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        self.track(result).map(|_| ())
    }

    fn connection(&self) -> RedisResult<MultiplexedConnection> {
        match &*self.read_state() {
            LinkState::Open { conn, .. } => Ok(conn.clone()),
            _ => Err(client_closed()),
        }
    }

    /// Updates readiness from the outcome of a round trip and converts the error.
    fn track<T>(&self, result: RedisResult<T>) -> Result<T> {
        let ready = match &result {
            Ok(_) => Some(true),
            Err(e) if e.is_io_error() || e.is_connection_dropped() => Some(false),
            Err(_) => None,
        };

        if let Some(ready) = ready {
            if let LinkState::Open { ready: current, .. } = &mut *self.write_state() {
                if *current != ready {
                    debug!(ready, "Redis readiness changed");
                    *current = ready;
                }
            }
        }

        result.map_err(Into::into)
    }
}

#[async_trait]
impl KeyValueConnection for RedisConnection {
    fn is_open(&self) -> bool {
        RedisConnection::is_open(self)
    }

    fn is_ready(&self) -> bool {
        RedisConnection::is_ready(self)
    }

    async fn connect(&self) -> Result<()> {
        RedisConnection::connect(self).await
    }

    async fn disconnect(&self) -> Result<()> {
        RedisConnection::disconnect(self).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection()?;
        let result: RedisResult<Option<String>> = conn.get(key).await;
        self.track(result)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.connection()?;
        let result: RedisResult<()> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await;
        self.track(result)
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.connection()?;
        let result: RedisResult<i64> = conn.del(key).await;
        self.track(result).map(|_| ())
    }
}
