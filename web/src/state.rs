//! Application state and server configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use storefront_core::{
    CartStore, CheckoutService, Clock, OrderStore, PaymentGateway, ProductStore, UserDirectory,
};

/// Shared state for the HTTP handlers: the checkout service behind an `Arc`.
///
/// Generic over the same providers as [`CheckoutService`], so the production
/// router (Postgres, simulated gateway) and the test router (in-memory
/// store) are the same code.
pub struct AppState<S, G, D, C> {
    service: Arc<CheckoutService<S, G, D, C>>,
}

impl<S, G, D, C> AppState<S, G, D, C>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    /// Wrap a service for sharing across handlers.
    pub fn new(service: CheckoutService<S, G, D, C>) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    /// The checkout service.
    pub fn service(&self) -> &CheckoutService<S, G, D, C> {
        &self.service
    }
}

// Derived Clone would demand Clone on every provider; the Arc is enough.
impl<S, G, D, C> Clone for AppState<S, G, D, C> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

/// Server configuration, read from the environment with sane defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub bind_addr: SocketAddr,
    /// Postgres connection string.
    pub database_url: String,
    /// Simulated gateway decline probability.
    pub payment_failure_rate: f64,
    /// Simulated gateway latency lower bound.
    pub payment_min_latency: Duration,
    /// Simulated gateway latency upper bound.
    pub payment_max_latency: Duration,
    /// Time-to-live for cached user directory lookups.
    pub user_cache_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_url: String::new(),
            payment_failure_rate: 0.1,
            payment_min_latency: Duration::from_millis(500),
            payment_max_latency: Duration::from_millis(1000),
            user_cache_ttl: Duration::from_secs(300),
        }
    }
}

impl ServerConfig {
    /// Read the configuration from the environment.
    ///
    /// `DATABASE_URL` is required; everything else falls back to the
    /// defaults. Recognized variables: `BIND_ADDR`,
    /// `PAYMENT_FAILURE_RATE`, `PAYMENT_MIN_LATENCY_MS`,
    /// `PAYMENT_MAX_LATENCY_MS`, `USER_CACHE_TTL_SECS`.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or `BIND_ADDR` does not
    /// parse.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
        let bind_addr = match std::env::var("BIND_ADDR") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid BIND_ADDR {raw:?}: {e}"))?,
            Err(_) => defaults.bind_addr,
        };
        Ok(Self {
            bind_addr,
            database_url,
            payment_failure_rate: env_parsed("PAYMENT_FAILURE_RATE")
                .unwrap_or(defaults.payment_failure_rate),
            payment_min_latency: env_parsed("PAYMENT_MIN_LATENCY_MS")
                .map_or(defaults.payment_min_latency, Duration::from_millis),
            payment_max_latency: env_parsed("PAYMENT_MAX_LATENCY_MS")
                .map_or(defaults.payment_max_latency, Duration::from_millis),
            user_cache_ttl: env_parsed("USER_CACHE_TTL_SECS")
                .map_or(defaults.user_cache_ttl, Duration::from_secs),
        })
    }

    /// Override the listen address.
    #[must_use]
    pub const fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Override the database URL.
    #[must_use]
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 3000);
        assert!(config.payment_min_latency <= config.payment_max_latency);
    }

    #[test]
    fn builders_override_fields() {
        let config = ServerConfig::default()
            .with_database_url("postgres://localhost/store")
            .with_bind_addr(SocketAddr::from(([127, 0, 0, 1], 8080)));
        assert_eq!(config.database_url, "postgres://localhost/store");
        assert_eq!(config.bind_addr.port(), 8080);
    }
}
