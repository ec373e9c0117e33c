//! Product records and the stock-check rules shared by every store backend.

use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Product identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub i64);

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

/// A catalog product.
///
/// `stock` is mutated only by order placement and payment confirmation
/// (decrement) and by order cancellation (restock); never by direct user
/// action. The non-negativity invariant is enforced by the store backends
/// with a conditional decrement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Stock-keeping unit code.
    pub sku: String,
    /// Optional long description.
    pub description: Option<String>,
    /// Current unit price in cents.
    pub price_cents: i64,
    /// Previous price in cents, display-only.
    pub old_price_cents: Option<i64>,
    /// Units in stock. Never negative.
    pub stock: i32,
    /// Whether the product can currently be ordered.
    pub available: bool,
    /// Owning category, if any.
    pub category_id: Option<CategoryId>,
    /// Product image URL.
    pub image_url: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Check that `quantity` units of this product can be ordered right now.
    ///
    /// This is the single source of the availability and stock rules; both
    /// the Postgres and the in-memory backends call it inside their
    /// transactions so the two can never drift.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Unavailable`] if the product is flagged unavailable,
    ///   even when stock is positive.
    /// - [`StoreError::InsufficientStock`] if `stock < quantity`, naming the
    ///   quantity still available.
    pub fn ensure_orderable(&self, quantity: u32) -> Result<()> {
        if !self.available {
            return Err(StoreError::Unavailable {
                name: self.name.clone(),
            });
        }
        if i64::from(self.stock) < i64::from(quantity) {
            return Err(StoreError::InsufficientStock {
                name: self.name.clone(),
                available: self.stock,
            });
        }
        Ok(())
    }

    /// Compact projection of this product for cart and order views.
    #[must_use]
    pub fn summary(&self) -> ProductSummary {
        ProductSummary {
            id: self.id,
            name: self.name.clone(),
            sku: self.sku.clone(),
            price_cents: self.price_cents,
            old_price_cents: self.old_price_cents,
            image_url: self.image_url.clone(),
            stock: self.stock,
        }
    }
}

/// Product fields joined into cart and order views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    /// Product identifier.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Stock-keeping unit code.
    pub sku: String,
    /// Current unit price in cents.
    pub price_cents: i64,
    /// Previous price in cents, display-only.
    pub old_price_cents: Option<i64>,
    /// Product image URL.
    pub image_url: Option<String>,
    /// Units in stock at read time.
    pub stock: i32,
}

/// Fields for creating a product (admin/seed path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    /// Display name.
    pub name: String,
    /// Stock-keeping unit code.
    pub sku: String,
    /// Optional long description.
    pub description: Option<String>,
    /// Unit price in cents.
    pub price_cents: i64,
    /// Previous price in cents, display-only.
    pub old_price_cents: Option<i64>,
    /// Initial stock level.
    pub stock: i32,
    /// Whether the product can be ordered.
    pub available: bool,
    /// Owning category, if any.
    pub category_id: Option<CategoryId>,
    /// Product image URL.
    pub image_url: Option<String>,
}

/// Filter for the public product listing.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Case-insensitive match against name, description, or SKU.
    pub search: Option<String>,
    /// When set, only products with positive stock are returned.
    pub in_stock_only: bool,
    /// Minimum price in cents, inclusive.
    pub min_price_cents: Option<i64>,
    /// Maximum price in cents, inclusive.
    pub max_price_cents: Option<i64>,
    /// Page selection.
    pub page: Page,
}

/// Page selection with the caller-supplied values clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub number: u32,
    /// Rows per page, clamped to 1..=100.
    pub per_page: u32,
}

impl Page {
    /// Maximum rows per page.
    pub const MAX_PER_PAGE: u32 = 100;

    /// Create a page selection, clamping out-of-range values.
    #[must_use]
    pub fn new(number: u32, per_page: u32) -> Self {
        Self {
            number: number.max(1),
            per_page: per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    /// Row offset for this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.number as u64 - 1) * self.per_page as u64
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

/// A page of results plus pagination metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    /// Rows on this page.
    pub items: Vec<T>,
    /// 1-based page number.
    pub page: u32,
    /// Rows per page.
    pub per_page: u32,
    /// Total matching rows.
    pub total: u64,
}

impl<T> Paginated<T> {
    /// Number of pages needed for `total` rows.
    #[must_use]
    pub const fn total_pages(&self) -> u64 {
        self.total.div_ceil(self.per_page as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(stock: i32, available: bool) -> Product {
        Product {
            id: ProductId(1),
            name: "Widget".to_string(),
            sku: "WID-001".to_string(),
            description: None,
            price_cents: 1000,
            old_price_cents: None,
            stock,
            available,
            category_id: None,
            image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn unavailable_product_rejected_even_with_stock() {
        let p = product(10, false);
        assert_eq!(
            p.ensure_orderable(1),
            Err(StoreError::Unavailable {
                name: "Widget".to_string()
            })
        );
    }

    #[test]
    fn insufficient_stock_reports_available_quantity() {
        let p = product(2, true);
        assert_eq!(
            p.ensure_orderable(3),
            Err(StoreError::InsufficientStock {
                name: "Widget".to_string(),
                available: 2
            })
        );
        assert!(p.ensure_orderable(2).is_ok());
    }

    #[test]
    fn page_clamps_to_bounds() {
        let page = Page::new(0, 1000);
        assert_eq!(page.number, 1);
        assert_eq!(page.per_page, Page::MAX_PER_PAGE);
        assert_eq!(page.offset(), 0);

        let page = Page::new(3, 20);
        assert_eq!(page.offset(), 40);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Paginated::<u8> {
            items: vec![],
            page: 1,
            per_page: 20,
            total: 41,
        };
        assert_eq!(page.total_pages(), 3);
    }
}
