use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::{info, warn};
use vigil_core::config::Settings;
use vigil_core::ports::{RateLimiter, RecordStore};
use vigil_core::rate_limit::MemoryRateLimiter;
use vigil_core::webpush::WebPushTransport;
use vigil_core::Dispatcher;

mod error;
mod limiter;
mod middleware;
mod routes;
mod state;

use crate::limiter::RedisRateLimiter;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Settings::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&settings.database_url)
        .await?;
    db::migrate(&pool).await?;
    let store: Arc<dyn RecordStore> = Arc::new(db::PgRecordStore::new(pool));

    let transport = Arc::new(WebPushTransport::from_settings(&settings)?);

    let limiter: Arc<dyn RateLimiter> = match &settings.redis_url {
        Some(redis_url) => {
            info!("using redis rate limiter");
            Arc::new(RedisRateLimiter::new(redis::Client::open(redis_url.as_str())?))
        }
        None => {
            warn!("VIGIL_REDIS_URL not set; send intervals are tracked per process");
            Arc::new(MemoryRateLimiter::default())
        }
    };

    let dispatcher = Dispatcher::new(
        store.clone(),
        transport,
        limiter,
        settings.dispatch_settings(),
    );
    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        store,
    };

    let app = routes::app(state);

    let addr: SocketAddr = settings.api_bind.parse()?;

    info!(%addr, "starting api");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
