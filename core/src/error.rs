//! Error types for storefront operations.

use crate::order::OrderStatus;
use thiserror::Error;

/// Result type alias for storefront operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error taxonomy for the order/inventory core.
///
/// Business-rule errors always name the offending product, order, or
/// transition; callers never see a generic failure when a specific cause is
/// known. Every variant except `Database` is raised before any state change
/// is committed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    // ═══════════════════════════════════════════════════════════
    // Input validation
    // ═══════════════════════════════════════════════════════════

    /// Malformed input (missing address, zero quantity, short phone number).
    #[error("Validation failed: {0}")]
    Validation(String),

    // ═══════════════════════════════════════════════════════════
    // Lookups
    // ═══════════════════════════════════════════════════════════

    /// Referenced product does not exist.
    #[error("Product {0} not found")]
    ProductNotFound(i64),

    /// Referenced order does not exist or does not belong to the caller.
    #[error("Order not found")]
    OrderNotFound,

    /// Referenced cart line does not exist or does not belong to the caller.
    #[error("Cart item not found")]
    CartLineNotFound,

    /// Referenced user does not exist.
    #[error("User not found")]
    UserNotFound,

    // ═══════════════════════════════════════════════════════════
    // Business rules
    // ═══════════════════════════════════════════════════════════

    /// Product exists but is flagged unavailable for purchase.
    #[error("Product \"{name}\" is currently unavailable")]
    Unavailable {
        /// Product display name
        name: String,
    },

    /// Requested quantity exceeds current stock.
    #[error("Insufficient stock for \"{name}\". Available: {available}")]
    InsufficientStock {
        /// Product display name
        name: String,
        /// Units currently in stock
        available: i32,
    },

    /// Checkout attempted with no cart lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// Requested status change is not permitted from the current state.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current order status
        from: OrderStatus,
        /// Requested order status
        to: OrderStatus,
    },

    /// Payment confirmation attempted on an already-settled order.
    #[error("Order already paid")]
    AlreadyPaid,

    /// Payment confirmation attempted on a cancelled order.
    #[error("Cannot pay for cancelled order")]
    OrderCancelled,

    /// Order-number generation kept colliding after retries.
    #[error("Order number conflict: {0}")]
    Conflict(String),

    // ═══════════════════════════════════════════════════════════
    // Infrastructure
    // ═══════════════════════════════════════════════════════════

    /// Database operation failed. Distinct from business-rule rejections so
    /// callers can distinguish "your request was invalid" from "try again
    /// later".
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Returns `true` if this error is caused by the caller's request rather
    /// than by infrastructure.
    ///
    /// # Examples
    ///
    /// ```
    /// # use storefront_core::StoreError;
    /// assert!(StoreError::EmptyCart.is_user_error());
    /// assert!(!StoreError::Database("boom".into()).is_user_error());
    /// ```
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        !matches!(self, Self::Database(_) | Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_names_product_and_quantity() {
        let err = StoreError::InsufficientStock {
            name: "Widget".to_string(),
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for \"Widget\". Available: 2"
        );
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = StoreError::InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Pending,
        };
        assert_eq!(err.to_string(), "Invalid status transition: DELIVERED -> PENDING");
    }

    #[test]
    fn database_errors_are_not_user_errors() {
        assert!(!StoreError::Database("connection reset".into()).is_user_error());
        assert!(StoreError::AlreadyPaid.is_user_error());
    }
}
