//! Cart handlers. Every route requires an authenticated user; the cart is
//! scoped to that user.

use crate::error::AppError;
use crate::extractors::AuthUser;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use storefront_core::{
    CartLine, CartLineId, CartStore, CartView, Clock, OrderStore, PaymentGateway, ProductId,
    ProductStore, UserDirectory,
};

/// Body for `POST /api/cart/items`.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    /// Product to add.
    pub product_id: i64,
    /// Units to add. Must be at least 1.
    pub quantity: u32,
}

/// Body for `PATCH /api/cart/items/:id`.
#[derive(Debug, Deserialize)]
pub struct UpdateCartLineRequest {
    /// New quantity for the line. Must be at least 1.
    pub quantity: u32,
}

/// `GET /api/cart`
pub async fn get_cart<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<CartView>, AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let cart = state.service().cart(user_id).await?;
    Ok(Json(cart))
}

/// `POST /api/cart/items`
pub async fn add_item<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<AddToCartRequest>,
) -> Result<(StatusCode, Json<CartLine>), AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let line = state
        .service()
        .add_to_cart(user_id, ProductId(body.product_id), body.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(line)))
}

/// `PATCH /api/cart/items/:id`
pub async fn update_item<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AuthUser(user_id): AuthUser,
    Path(line_id): Path<i64>,
    Json(body): Json<UpdateCartLineRequest>,
) -> Result<Json<CartLine>, AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let line = state
        .service()
        .update_cart_line(user_id, CartLineId(line_id), body.quantity)
        .await?;
    Ok(Json(line))
}

/// `DELETE /api/cart/items/:id`
pub async fn remove_item<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AuthUser(user_id): AuthUser,
    Path(line_id): Path<i64>,
) -> Result<StatusCode, AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    state
        .service()
        .remove_cart_line(user_id, CartLineId(line_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/cart`
pub async fn clear_cart<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AuthUser(user_id): AuthUser,
) -> Result<StatusCode, AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    state.service().clear_cart(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
