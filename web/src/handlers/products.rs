//! Public product catalog handlers.

use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use storefront_core::{
    CartStore, Clock, OrderStore, Page, Paginated, PaymentGateway, Product, ProductFilter,
    ProductId, ProductStore, UserDirectory,
};

/// Query parameters for the product listing.
#[derive(Debug, Default, Deserialize)]
pub struct ProductsQuery {
    /// Case-insensitive match against name, description, or SKU.
    pub search: Option<String>,
    /// When true, only products with positive stock are returned.
    #[serde(default)]
    pub in_stock: bool,
    /// Minimum price in cents, inclusive.
    pub min_price_cents: Option<i64>,
    /// Maximum price in cents, inclusive.
    pub max_price_cents: Option<i64>,
    /// 1-based page number.
    pub page: Option<u32>,
    /// Rows per page.
    pub per_page: Option<u32>,
}

impl ProductsQuery {
    fn into_filter(self) -> ProductFilter {
        let defaults = Page::default();
        ProductFilter {
            search: self.search.filter(|s| !s.trim().is_empty()),
            in_stock_only: self.in_stock,
            min_price_cents: self.min_price_cents,
            max_price_cents: self.max_price_cents,
            page: Page::new(
                self.page.unwrap_or(defaults.number),
                self.per_page.unwrap_or(defaults.per_page),
            ),
        }
    }
}

/// `GET /api/products`
pub async fn list_products<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    Query(query): Query<ProductsQuery>,
) -> Result<Json<Paginated<Product>>, AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let page = state.service().products(&query.into_filter()).await?;
    Ok(Json(page))
}

/// `GET /api/products/:id`
pub async fn get_product<S, G, D, C>(
    State(state): State<AppState<S, G, D, C>>,
    Path(id): Path<i64>,
) -> Result<Json<Product>, AppError>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    let product = state.service().product(ProductId(id)).await?;
    Ok(Json(product))
}
