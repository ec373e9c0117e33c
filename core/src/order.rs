//! Orders, order lines, and the order status state machine.

use crate::error::{Result, StoreError};
use crate::product::{Product, ProductId, ProductSummary};
use crate::users::UserId;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Order identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub i64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique human-readable order number.
///
/// Format: `ORD-{unix millis}-{6 uppercase alphanumerics}`. The timestamp
/// component makes numbers roughly sortable; the random suffix makes
/// same-millisecond collisions unlikely. Uniqueness is still enforced by the
/// store, which regenerates and retries on collision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderNumber(pub String);

impl OrderNumber {
    /// Length of the random suffix.
    const SUFFIX_LEN: usize = 6;

    /// Generate a fresh order number for the given creation time.
    #[must_use]
    pub fn generate(now: DateTime<Utc>) -> Self {
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..Self::SUFFIX_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(format!("ORD-{}-{suffix}", now.timestamp_millis()))
    }

    /// The order number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Settlement state of an order's payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Payment not yet received.
    Pending,
    /// Payment received.
    Paid,
}

impl PaymentStatus {
    /// Convert status to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }

    /// Parse status from its database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the string is not a known status.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            _ => Err(StoreError::Database(format!("Invalid payment status: {s}"))),
        }
    }
}

/// Fulfillment state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Placed, awaiting payment or processing.
    Pending,
    /// Payment confirmed.
    Paid,
    /// Being prepared for shipment.
    Processing,
    /// Handed to the carrier.
    Shipped,
    /// Received by the customer. Terminal.
    Delivered,
    /// Cancelled. Terminal.
    Cancelled,
}

impl OrderStatus {
    /// All statuses, for iteration in tests and admin tooling.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Paid,
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Convert status to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parse status from its database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the string is not a known status.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "PROCESSING" => Ok(Self::Processing),
            "SHIPPED" => Ok(Self::Shipped),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(StoreError::Database(format!("Invalid order status: {s}"))),
        }
    }

    /// Statuses reachable from this one. The transition table is the single
    /// source of truth; every status write goes through it.
    #[must_use]
    pub const fn allowed_targets(&self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Processing, Self::Paid, Self::Cancelled],
            Self::Paid => &[Self::Processing, Self::Cancelled],
            Self::Processing => &[Self::Shipped, Self::Cancelled],
            Self::Shipped => &[Self::Delivered, Self::Cancelled],
            Self::Delivered | Self::Cancelled => &[],
        }
    }

    /// Whether `to` is reachable from this status.
    #[must_use]
    pub fn can_transition_to(&self, to: Self) -> bool {
        self.allowed_targets().contains(&to)
    }

    /// Check a transition against the table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTransition`] naming the attempted pair.
    pub fn ensure_transition(&self, to: Self) -> Result<()> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(StoreError::InvalidTransition { from: *self, to })
        }
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.allowed_targets().is_empty()
    }

    /// Whether a customer (as opposed to an admin) may still cancel an order
    /// in this status. A stricter subset of the transition table.
    #[must_use]
    pub const fn user_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order header. Never physically deleted; mutated only through the
/// state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier.
    pub id: OrderId,
    /// Globally unique order number.
    pub order_number: OrderNumber,
    /// Owning user.
    pub user_id: UserId,
    /// Sum of line subtotals at creation time. Never recomputed.
    pub total_cents: i64,
    /// Stored shipping address column.
    pub shipping_address: String,
    /// Stored billing address column.
    pub billing_address: String,
    /// Payment method label, e.g. `"COD"` or `"card"`.
    pub payment_method: String,
    /// Settlement state.
    pub payment_status: PaymentStatus,
    /// Fulfillment state.
    pub status: OrderStatus,
    /// Whether this order's stock decrement has happened (immediately at
    /// creation, or at payment confirmation). Drives restock on cancel.
    pub stock_taken: bool,
    /// Free-form customer notes.
    pub notes: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Cancellation timestamp, set exactly once.
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// A price-frozen order line. Immutable once created; owned by its order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Line identifier.
    pub id: i64,
    /// Owning order.
    pub order_id: OrderId,
    /// Referenced product.
    pub product_id: ProductId,
    /// Units ordered.
    pub quantity: u32,
    /// Unit price in cents at order time.
    pub unit_price_cents: i64,
    /// `quantity * unit_price_cents`.
    pub subtotal_cents: i64,
}

/// An order line joined with its product summary for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderLineView {
    /// The frozen line.
    pub line: OrderLine,
    /// Product fields at read time (name, image, current price).
    pub product: ProductSummary,
}

/// An order with its lines, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderDetail {
    /// The order header.
    pub order: Order,
    /// Lines with joined product summaries.
    pub lines: Vec<OrderLineView>,
}

/// One requested item of a direct ("pay on delivery") order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemRequest {
    /// Product to order.
    pub product_id: ProductId,
    /// Units requested. Must be at least 1.
    pub quantity: u32,
}

/// A draft order line, priced from the product row read inside the placement
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderLine {
    /// Referenced product.
    pub product_id: ProductId,
    /// Units ordered.
    pub quantity: u32,
    /// Unit price in cents at order time.
    pub unit_price_cents: i64,
    /// `quantity * unit_price_cents`.
    pub subtotal_cents: i64,
}

impl NewOrderLine {
    /// Freeze a line against the product's current price.
    #[must_use]
    pub fn for_product(product: &Product, quantity: u32) -> Self {
        let subtotal_cents = product.price_cents * i64::from(quantity);
        Self {
            product_id: product.id,
            quantity,
            unit_price_cents: product.price_cents,
            subtotal_cents,
        }
    }
}

/// Sum the subtotals of a set of draft lines.
#[must_use]
pub fn total_of(lines: &[NewOrderLine]) -> i64 {
    lines.iter().map(|l| l.subtotal_cents).sum()
}

/// Address, payment, and note fields shared by both order-creation entry
/// points. Addresses are already frozen to their stored representation.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderMeta {
    /// Stored shipping address column.
    pub shipping_address: String,
    /// Stored billing address column. Defaults to the shipping address.
    pub billing_address: String,
    /// Payment method label.
    pub payment_method: String,
    /// Free-form customer notes.
    pub notes: Option<String>,
}

/// Admin-side order update: an optional transition plus field edits.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    /// Requested status, checked against the transition table.
    pub status: Option<OrderStatus>,
    /// Settlement state edit.
    pub payment_status: Option<PaymentStatus>,
    /// Notes edit; `Some(None)` clears the notes.
    pub notes: Option<Option<String>>,
}

/// Filter for the admin order listing.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Restrict to one fulfillment status.
    pub status: Option<OrderStatus>,
    /// Restrict to one settlement status.
    pub payment_status: Option<PaymentStatus>,
    /// Restrict to one user.
    pub user_id: Option<UserId>,
    /// Case-insensitive match against the order number.
    pub search: Option<String>,
    /// Page selection.
    pub page: crate::product::Page,
}

/// One flattened row of the admin CSV export: an order line joined with its
/// order header and owning user.
#[derive(Debug, Clone, Serialize)]
pub struct OrderExportRow {
    /// Order identifier.
    pub order_id: i64,
    /// Order number.
    pub order_number: String,
    /// Order creation time, RFC 3339.
    pub created_at: String,
    /// Fulfillment status.
    pub status: String,
    /// Settlement status.
    pub payment_status: String,
    /// Payment method label.
    pub payment_method: String,
    /// Order total in cents.
    pub total_cents: i64,
    /// Owning user id.
    pub user_id: i64,
    /// Owning user email, when the directory knows it.
    pub user_email: String,
    /// Product name at export time.
    pub product_name: String,
    /// Product SKU at export time.
    pub product_sku: String,
    /// Units ordered.
    pub quantity: u32,
    /// Unit price in cents at order time.
    pub unit_price_cents: i64,
    /// Line subtotal in cents.
    pub subtotal_cents: i64,
    /// Shipping address display line.
    pub shipping_address: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn status_string_roundtrip() {
        for status in OrderStatus::ALL {
            assert_eq!(OrderStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(OrderStatus::parse("SHIPPING").is_err());
    }

    #[test]
    fn payment_status_roundtrip() {
        for status in [PaymentStatus::Pending, PaymentStatus::Paid] {
            assert_eq!(PaymentStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(PaymentStatus::parse("refunded").is_err());
    }

    #[test]
    fn transition_table_matches_lifecycle() {
        use OrderStatus as S;
        assert!(S::Pending.can_transition_to(S::Paid));
        assert!(S::Pending.can_transition_to(S::Processing));
        assert!(S::Paid.can_transition_to(S::Processing));
        assert!(S::Processing.can_transition_to(S::Shipped));
        assert!(S::Shipped.can_transition_to(S::Delivered));
        for from in [S::Pending, S::Paid, S::Processing, S::Shipped] {
            assert!(from.can_transition_to(S::Cancelled), "{from} should cancel");
        }
        assert!(S::Delivered.is_terminal());
        assert!(S::Cancelled.is_terminal());
    }

    #[test]
    fn every_disallowed_pair_is_rejected() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                let expected = from.allowed_targets().contains(&to);
                match from.ensure_transition(to) {
                    Ok(()) => assert!(expected, "{from} -> {to} should be rejected"),
                    Err(StoreError::InvalidTransition { from: f, to: t }) => {
                        assert!(!expected, "{from} -> {to} should be allowed");
                        assert_eq!((f, t), (from, to));
                    }
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
        }
    }

    #[test]
    fn user_cancellation_is_stricter_than_admin() {
        use OrderStatus as S;
        assert!(S::Pending.user_cancellable());
        assert!(S::Processing.user_cancellable());
        for status in [S::Paid, S::Shipped, S::Delivered, S::Cancelled] {
            assert!(!status.user_cancellable(), "{status}");
        }
    }

    #[test]
    fn order_number_format() {
        let now = Utc::now();
        let number = OrderNumber::generate(now);
        let parts: Vec<&str> = number.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn line_freezes_current_price() {
        let product = crate::product::Product {
            id: ProductId(7),
            name: "Widget".to_string(),
            sku: "WID-001".to_string(),
            description: None,
            price_cents: 250,
            old_price_cents: None,
            stock: 10,
            available: true,
            category_id: None,
            image_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let line = NewOrderLine::for_product(&product, 3);
        assert_eq!(line.unit_price_cents, 250);
        assert_eq!(line.subtotal_cents, 750);
        assert_eq!(total_of(&[line.clone(), line]), 1500);
    }
}
