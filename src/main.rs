use idempotency_redis::config::Settings;
use idempotency_redis::observability::init_logging;
use idempotency_redis::{IdempotencyStore, RedisIdempotencyStore};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;
    init_logging(&settings.log_config());
    info!("Configuration loaded");

    let store = RedisIdempotencyStore::new(settings.store_options())?;
    store.connect().await?;
    store.connection().ping().await?;

    info!(
        ttl_secs = store.ttl(),
        ready = store.is_ready(),
        "Idempotency store verified"
    );

    store.disconnect().await?;
    Ok(())
}
