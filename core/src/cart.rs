//! Cart lines and cart views.
//!
//! A cart is not a first-class record; it is the set of cart lines owned by a
//! user. Lines carry no price: carts are always priced against the current
//! product price at read time, and prices are frozen only when a cart becomes
//! an order.

use crate::product::{ProductId, ProductSummary};
use crate::users::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cart line identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CartLineId(pub i64);

impl std::fmt::Display for CartLineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One product/quantity pair in a user's cart. Unique per (user, product);
/// adding an already-carted product increments the existing line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Line identifier.
    pub id: CartLineId,
    /// Owning user.
    pub user_id: UserId,
    /// Carted product.
    pub product_id: ProductId,
    /// Units in the cart. Always at least 1.
    pub quantity: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A cart line joined with its product and priced at the current price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartEntry {
    /// The underlying line.
    pub line: CartLine,
    /// Product fields at read time.
    pub product: ProductSummary,
    /// `quantity * product.price_cents` at read time.
    pub subtotal_cents: i64,
}

/// A user's cart: entries plus totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartView {
    /// Entries, newest first.
    pub entries: Vec<CartEntry>,
    /// Sum of entry subtotals in cents.
    pub total_cents: i64,
    /// Total units across all entries.
    pub item_count: u32,
}

impl CartView {
    /// Assemble a view from priced entries.
    #[must_use]
    pub fn from_entries(entries: Vec<CartEntry>) -> Self {
        let total_cents = entries.iter().map(|e| e.subtotal_cents).sum();
        let item_count = entries.iter().map(|e| e.line.quantity).sum();
        Self {
            entries,
            total_cents,
            item_count,
        }
    }

    /// Whether the cart holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
