//! Axum HTTP layer for the storefront.
//!
//! Thin shell over `storefront_core::CheckoutService`: handlers parse the
//! request, call one service method, and map the result to a response.
//! Domain errors flow through [`AppError`]'s `From<StoreError>` impl, so the
//! status mapping lives in exactly one place.
//!
//! Authentication happens upstream; handlers read the injected
//! `x-user-id` / `x-user-role` headers through the [`extractors`].
//!
//! # Example
//!
//! ```no_run
//! use storefront_core::{CachedUserDirectory, CheckoutService, SystemClock};
//! use storefront_payments::SimulatedGateway;
//! use storefront_postgres::{PgUserDirectory, PostgresStore};
//! use storefront_web::{storefront_router, AppState};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = PostgresStore::connect("postgres://localhost/storefront").await?;
//! let users = CachedUserDirectory::new(PgUserDirectory::new(store.clone()));
//! let service = CheckoutService::new(store, SimulatedGateway::new(), users, SystemClock);
//! let app = storefront_router(AppState::new(service));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use extractors::{AdminUser, AuthUser};
pub use middleware::{correlation_id_layer, CORRELATION_ID_HEADER};
pub use routes::storefront_router;
pub use state::{AppState, ServerConfig};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
