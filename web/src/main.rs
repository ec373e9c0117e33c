//! Storefront HTTP server.

use storefront_core::{
    CachedUserDirectory, CheckoutService, SystemClock, UserCacheConfig,
};
use storefront_payments::{SimulatedGateway, SimulatedGatewayConfig};
use storefront_postgres::{PgUserDirectory, PostgresStore};
use storefront_web::{storefront_router, AppState, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let store = PostgresStore::connect(&config.database_url).await?;
    let users = CachedUserDirectory::with_config(
        PgUserDirectory::new(store.clone()),
        UserCacheConfig::default().with_ttl(config.user_cache_ttl),
    );
    let gateway = SimulatedGateway::with_config(
        SimulatedGatewayConfig::default()
            .with_failure_rate(config.payment_failure_rate)
            .with_latency(config.payment_min_latency, config.payment_max_latency),
    );
    let service = CheckoutService::new(store, gateway, users, SystemClock);
    let app = storefront_router(AppState::new(service));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "storefront listening");
    axum::serve(listener, app).await?;
    Ok(())
}
