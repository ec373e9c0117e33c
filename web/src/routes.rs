//! Route table.
//!
//! The router is generic over the providers so the production wiring
//! (Postgres store, simulated gateway) and the test wiring (in-memory
//! store) share it. Handlers are turbofished with the concrete provider
//! set at the call site.

use crate::handlers::{admin, cart, health, orders, products};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::routing::{get, patch, post};
use axum::Router;
use storefront_core::{
    CartStore, Clock, OrderStore, PaymentGateway, ProductStore, UserDirectory,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the full application router over the given providers.
pub fn storefront_router<S, G, D, C>(state: AppState<S, G, D, C>) -> Router
where
    S: ProductStore + CartStore + OrderStore + 'static,
    G: PaymentGateway + 'static,
    D: UserDirectory + 'static,
    C: Clock + 'static,
{
    Router::new()
        .route("/health", get(health::health_check))
        // Public catalog
        .route("/api/products", get(products::list_products::<S, G, D, C>))
        .route("/api/products/:id", get(products::get_product::<S, G, D, C>))
        // Cart
        .route(
            "/api/cart",
            get(cart::get_cart::<S, G, D, C>).delete(cart::clear_cart::<S, G, D, C>),
        )
        .route("/api/cart/items", post(cart::add_item::<S, G, D, C>))
        .route(
            "/api/cart/items/:id",
            patch(cart::update_item::<S, G, D, C>).delete(cart::remove_item::<S, G, D, C>),
        )
        // Orders
        .route(
            "/api/orders",
            get(orders::list_orders::<S, G, D, C>).post(orders::place_order::<S, G, D, C>),
        )
        .route("/api/checkout", post(orders::checkout::<S, G, D, C>))
        .route("/api/orders/:id", get(orders::get_order::<S, G, D, C>))
        .route("/api/orders/:id/pay", post(orders::pay::<S, G, D, C>))
        .route(
            "/api/orders/:id/cancel",
            post(orders::cancel_order::<S, G, D, C>),
        )
        // Admin
        .route("/api/admin/orders", get(admin::list_orders::<S, G, D, C>))
        .route(
            "/api/admin/orders/export",
            get(admin::export_orders::<S, G, D, C>),
        )
        .route(
            "/api/admin/orders/bulk-status",
            post(admin::bulk_update_status::<S, G, D, C>),
        )
        .route(
            "/api/admin/orders/:id",
            get(admin::get_order::<S, G, D, C>).patch(admin::update_order::<S, G, D, C>),
        )
        .route(
            "/api/admin/orders/:id/cancel",
            post(admin::cancel_order::<S, G, D, C>),
        )
        .route(
            "/api/admin/orders/:id/deliver",
            post(admin::confirm_delivery::<S, G, D, C>),
        )
        .route(
            "/api/admin/products",
            post(admin::create_product::<S, G, D, C>),
        )
        .layer(correlation_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
