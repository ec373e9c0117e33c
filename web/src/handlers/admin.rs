//! Admin handlers: order management, the CSV export, and product creation.
//! Every route requires the admin role.

use crate::error::AppError;
use crate::extractors::AdminUser;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Deserializer, Serialize};
use storefront_core::{
    CartStore, Clock, NewProduct, Order, OrderDetail, OrderFilter, OrderId, OrderStatus,
    OrderStore, OrderUpdate, Page, Paginated, PaymentGateway, PaymentStatus, Product,
    ProductStore, UserDirectory, UserId,
};

/// Query parameters for the admin order listing and export.
#[derive(Debug, Default, Deserialize)]
pub struct AdminOrdersQuery {
    /// Restrict to one fulfillment status.
    pub status: Option<OrderStatus>,
    /// Restrict to one settlement status.
    pub payment_status: Option<PaymentStatus>,
    /// Restrict to one user.
    pub user_id: Option<i64>,
    /// Case-insensitive match against the order number.
    pub search: Option<String>,
    /// 1-based page number (ignored by the export).
    pub page: Option<u32>,
    /// Rows per page (ignored by the export).
    pub per_page: Option<u32>,
}

impl AdminOrdersQuery {
    fn into_filter(self) -> OrderFilter {
        let defaults = Page::default();
        OrderFilter {
            status: self.status,
            payment_status: self.payment_status,
            user_id: self.user_id.map(UserId),
            search: self.search.filter(|s| !s.trim().is_empty()),
            page: Page::new(
                self.page.unwrap_or(defaults.number),
                self.per_page.unwrap_or(defaults.per_page),
            ),
        }
    }
}

/// Body for `PATCH /api/admin/orders/:id`. Absent fields are left
/// untouched; an explicit `"notes": null` clears the notes.
#[derive(Debug, Default, Deserialize)]
pub struct AdminUpdateBody {
    /// Requested status, checked against the transition table.
    pub status: Option<OrderStatus>,
    /// Settlement state edit.
    pub payment_status: Option<PaymentStatus>,
    /// Notes edit.
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
}

// Distinguishes an absent field (outer None) from an explicit null
// (Some(None)).
fn double_option<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(de).map(Some)
}

/// Body for `POST /api/admin/orders/bulk-status`.
#[derive(Debug, Deserialize)]
pub struct BulkStatusBody {
    /// Orders to update.
    pub order_ids: Vec<i64>,
    /// Target status. `CANCELLED` is refused.
    pub status: OrderStatus,
}

/// Response for the bulk status update.
#[derive(Debug, Serialize)]
pub struct BulkStatusResponse {
    /// Number of orders actually transitioned.
    pub updated: u64,
}

/// Body for `POST /api/admin/orders/:id/deliver`.
#[derive(Debug, Deserialize)]
pub struct DeliverBody {
    /// Whether payment was received on the doorstep. Defaults to true.
    #[serde(default = "default_true")]
    pub payment_received: bool,
}

const fn default_true() -> bool {
    true
}

/// `GET /api/admin/orders`
pub async fn list_orders<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AdminUser(_): AdminUser,
    Query(query): Query<AdminOrdersQuery>,
) -> Result<Json<Paginated<Order>>, AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let page = state.service().orders(&query.into_filter()).await?;
    Ok(Json(page))
}

/// `GET /api/admin/orders/export`
///
/// Streams the matching order lines as a CSV attachment, one row per line.
pub async fn export_orders<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AdminUser(_): AdminUser,
    Query(query): Query<AdminOrdersQuery>,
) -> Result<Response, AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let rows = state.service().export_rows(&query.into_filter()).await?;
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in &rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::internal("Export failed").with_source(e.into()))?;
    }
    let body = writer
        .into_inner()
        .map_err(|e| AppError::internal("Export failed").with_source(e.into()))?;

    let filename = format!(
        "orders-export-{}.csv",
        chrono::Utc::now().format("%Y-%m-%d")
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}

/// `GET /api/admin/orders/:id`
pub async fn get_order<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AdminUser(_): AdminUser,
    Path(order_id): Path<i64>,
) -> Result<Json<OrderDetail>, AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let detail = state.service().order(OrderId(order_id)).await?;
    Ok(Json(detail))
}

/// `PATCH /api/admin/orders/:id`
pub async fn update_order<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AdminUser(_): AdminUser,
    Path(order_id): Path<i64>,
    Json(body): Json<AdminUpdateBody>,
) -> Result<Json<Order>, AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let update = OrderUpdate {
        status: body.status,
        payment_status: body.payment_status,
        notes: body.notes,
    };
    let order = state
        .service()
        .update_order(OrderId(order_id), &update)
        .await?;
    Ok(Json(order))
}

/// `POST /api/admin/orders/:id/cancel`
pub async fn cancel_order<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AdminUser(_): AdminUser,
    Path(order_id): Path<i64>,
) -> Result<Json<Order>, AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let order = state.service().cancel_order(OrderId(order_id)).await?;
    Ok(Json(order))
}

/// `POST /api/admin/orders/:id/deliver`
pub async fn confirm_delivery<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AdminUser(_): AdminUser,
    Path(order_id): Path<i64>,
    Json(body): Json<DeliverBody>,
) -> Result<Json<Order>, AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let order = state
        .service()
        .confirm_delivery(OrderId(order_id), body.payment_received)
        .await?;
    Ok(Json(order))
}

/// `POST /api/admin/orders/bulk-status`
pub async fn bulk_update_status<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AdminUser(_): AdminUser,
    Json(body): Json<BulkStatusBody>,
) -> Result<Json<BulkStatusResponse>, AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let ids: Vec<OrderId> = body.order_ids.iter().copied().map(OrderId).collect();
    let updated = state
        .service()
        .bulk_update_status(&ids, body.status)
        .await?;
    Ok(Json(BulkStatusResponse { updated }))
}

/// `POST /api/admin/products`
pub async fn create_product<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    AdminUser(_): AdminUser,
    Json(body): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let product = state.service().create_product(body).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn absent_notes_differ_from_explicit_null() {
        let body: AdminUpdateBody = serde_json::from_str("{}").unwrap();
        assert_eq!(body.notes, None);

        let body: AdminUpdateBody = serde_json::from_str(r#"{"notes": null}"#).unwrap();
        assert_eq!(body.notes, Some(None));

        let body: AdminUpdateBody = serde_json::from_str(r#"{"notes": "gift"}"#).unwrap();
        assert_eq!(body.notes, Some(Some("gift".to_string())));
    }

    #[test]
    fn status_strings_deserialize_uppercase() {
        let body: BulkStatusBody =
            serde_json::from_str(r#"{"order_ids": [1, 2], "status": "SHIPPED"}"#).unwrap();
        assert_eq!(body.status, OrderStatus::Shipped);
    }
}
