//! Customer order handlers: placement, checkout, payment, cancellation, and
//! order history.

use crate::error::AppError;
use crate::extractors::AuthUser;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use storefront_core::{
    Address, CartStore, CheckoutRequest, Clock, Order, OrderDetail, OrderId, OrderItemRequest,
    OrderStore, Page, Paginated, PaymentConfirmation, PaymentDetails, PaymentGateway,
    PlaceOrderRequest, ProductStore, UserDirectory,
};

/// Body for `POST /api/orders` (pay on delivery, explicit items).
#[derive(Debug, Deserialize)]
pub struct PlaceOrderBody {
    /// Items to order.
    pub items: Vec<OrderItemRequest>,
    /// Shipping address, structured or free-form.
    pub shipping_address: Address,
    /// Billing address; defaults to the shipping address.
    pub billing_address: Option<Address>,
    /// Contact phone; required for structured addresses.
    pub phone: Option<String>,
    /// Free-form customer notes.
    pub notes: Option<String>,
}

/// Body for `POST /api/checkout` (order from cart, paid online).
#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    /// Shipping address, structured or free-form.
    pub shipping_address: Address,
    /// Billing address; defaults to the shipping address.
    pub billing_address: Option<Address>,
    /// Contact phone; required for structured addresses.
    pub phone: Option<String>,
    /// Payment method label, e.g. `"card"`.
    pub payment_method: String,
    /// Free-form customer notes.
    pub notes: Option<String>,
}

/// Query parameters for the order history listing.
#[derive(Debug, Default, Deserialize)]
pub struct OrdersQuery {
    /// 1-based page number.
    pub page: Option<u32>,
    /// Rows per page.
    pub per_page: Option<u32>,
}

impl OrdersQuery {
    pub(crate) fn page(&self) -> Page {
        let defaults = Page::default();
        Page::new(
            self.page.unwrap_or(defaults.number),
            self.per_page.unwrap_or(defaults.per_page),
        )
    }
}

/// Response body for a payment attempt. A decline is a normal response,
/// not an error; the order stays open for retry.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PaymentResponse {
    /// The charge was approved and the order settled.
    Paid {
        /// The settled order.
        order: OrderDetail,
    },
    /// The charge was declined.
    Declined {
        /// Gateway-supplied reason.
        reason: String,
    },
}

/// `POST /api/orders`
pub async fn place_order<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<PlaceOrderBody>,
) -> Result<(StatusCode, Json<OrderDetail>), AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let detail = state
        .service()
        .place_cod_order(
            user_id,
            PlaceOrderRequest {
                items: body.items,
                shipping_address: body.shipping_address,
                billing_address: body.billing_address,
                phone: body.phone,
                notes: body.notes,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// `POST /api/checkout`
pub async fn checkout<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<CheckoutBody>,
) -> Result<(StatusCode, Json<OrderDetail>), AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let detail = state
        .service()
        .checkout_cart(
            user_id,
            CheckoutRequest {
                shipping_address: body.shipping_address,
                billing_address: body.billing_address,
                phone: body.phone,
                payment_method: body.payment_method,
                notes: body.notes,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// `POST /api/orders/:id/pay`
pub async fn pay<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AuthUser(user_id): AuthUser,
    Path(order_id): Path<i64>,
    Json(details): Json<PaymentDetails>,
) -> Result<(StatusCode, Json<PaymentResponse>), AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let confirmation = state
        .service()
        .pay(user_id, OrderId(order_id), &details)
        .await?;
    Ok(match confirmation {
        PaymentConfirmation::Paid(order) => {
            (StatusCode::OK, Json(PaymentResponse::Paid { order }))
        }
        PaymentConfirmation::Declined { reason } => (
            StatusCode::PAYMENT_REQUIRED,
            Json(PaymentResponse::Declined { reason }),
        ),
    })
}

/// `POST /api/orders/:id/cancel`
pub async fn cancel_order<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AuthUser(user_id): AuthUser,
    Path(order_id): Path<i64>,
) -> Result<Json<Order>, AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let order = state
        .service()
        .cancel_my_order(user_id, OrderId(order_id))
        .await?;
    Ok(Json(order))
}

/// `GET /api/orders`
pub async fn list_orders<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<Paginated<OrderDetail>>, AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let page = state.service().my_orders(user_id, query.page()).await?;
    Ok(Json(page))
}

/// `GET /api/orders/:id`
pub async fn get_order<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AuthUser(user_id): AuthUser,
    Path(order_id): Path<i64>,
) -> Result<Json<OrderDetail>, AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let detail = state
        .service()
        .my_order(user_id, OrderId(order_id))
        .await?;
    Ok(Json(detail))
}
