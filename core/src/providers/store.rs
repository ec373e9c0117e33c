//! Storage traits for products, carts, and orders.
//!
//! Methods return named `Send` futures rather than bare `async fn`, so
//! generic callers can prove their own futures are `Send`. Implementations
//! still use `async fn`.

use crate::cart::{CartEntry, CartLine, CartLineId};
use crate::error::Result;
use crate::order::{
    Order, OrderDetail, OrderExportRow, OrderFilter, OrderId, OrderItemRequest, OrderMeta,
    OrderStatus, OrderUpdate,
};
use crate::product::{NewProduct, Page, Paginated, Product, ProductFilter, ProductId};
use crate::users::UserId;
use chrono::{DateTime, Utc};
use std::future::Future;

/// Product catalog reads and admin writes.
pub trait ProductStore: Send + Sync {
    /// List products matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Database`] on query failure.
    fn list_products(
        &self,
        filter: &ProductFilter,
    ) -> impl Future<Output = Result<Paginated<Product>>> + Send;

    /// Fetch one product by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::ProductNotFound`] if the id is unknown.
    fn find_product(&self, id: ProductId) -> impl Future<Output = Result<Product>> + Send;

    /// Insert a product (admin and seed path).
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Database`] on insert failure.
    fn create_product(
        &self,
        new: NewProduct,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Product>> + Send;
}

/// Cart line storage. All operations are scoped to one user; a line id
/// belonging to another user reads as absent.
pub trait CartStore: Send + Sync {
    /// The user's cart lines joined with product summaries and priced at the
    /// current product price, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Database`] on query failure.
    fn cart_entries(&self, user_id: UserId) -> impl Future<Output = Result<Vec<CartEntry>>> + Send;

    /// Add `quantity` units of a product to the user's cart. If the product
    /// is already carted the quantities merge into the existing line. The
    /// stock check runs against the merged quantity, atomically with the
    /// write.
    ///
    /// # Errors
    ///
    /// - [`crate::StoreError::ProductNotFound`] for an unknown product.
    /// - [`crate::StoreError::Unavailable`] for an unavailable product.
    /// - [`crate::StoreError::InsufficientStock`] if the merged quantity
    ///   exceeds stock.
    fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<CartLine>> + Send;

    /// Replace a cart line's quantity, re-checking stock.
    ///
    /// # Errors
    ///
    /// - [`crate::StoreError::CartLineNotFound`] if the line is absent or
    ///   owned by another user.
    /// - [`crate::StoreError::InsufficientStock`] if the new quantity exceeds
    ///   stock.
    fn set_cart_quantity(
        &self,
        user_id: UserId,
        line_id: CartLineId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<CartLine>> + Send;

    /// Remove one cart line.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::CartLineNotFound`] if the line is absent
    /// or owned by another user.
    fn remove_cart_line(
        &self,
        user_id: UserId,
        line_id: CartLineId,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove every cart line of the user. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Database`] on delete failure.
    fn clear_cart(&self, user_id: UserId) -> impl Future<Output = Result<()>> + Send;
}

/// Order storage. Every method that touches more than one row is a single
/// transaction: either all of its effects are visible or none are.
pub trait OrderStore: Send + Sync {
    /// Place an order from explicit items, decrementing stock immediately
    /// (the pay-on-delivery path). For each item the product must exist, be
    /// available, and have sufficient stock; the decrement is conditional so
    /// concurrent orders cannot drive stock negative. Any failing line
    /// aborts the whole placement. The order is created with
    /// `stock_taken = true`. The user's cart is not touched.
    ///
    /// The order number is generated from `now` and regenerated on
    /// collision, up to three attempts.
    ///
    /// # Errors
    ///
    /// - [`crate::StoreError::ProductNotFound`], [`crate::StoreError::Unavailable`],
    ///   or [`crate::StoreError::InsufficientStock`] for a failing line.
    /// - [`crate::StoreError::Conflict`] if order-number generation kept
    ///   colliding.
    fn place_order_taking_stock(
        &self,
        user_id: UserId,
        items: &[OrderItemRequest],
        meta: &OrderMeta,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<OrderDetail>> + Send;

    /// Place an order from the user's cart without decrementing stock (the
    /// online-payment path; stock is taken at payment confirmation). Stock
    /// is still validated so obviously unfillable orders are rejected early.
    /// The order is created with `stock_taken = false` and the cart is left
    /// in place until payment succeeds.
    ///
    /// # Errors
    ///
    /// - [`crate::StoreError::EmptyCart`] if the user has no cart lines.
    /// - [`crate::StoreError::Unavailable`] or
    ///   [`crate::StoreError::InsufficientStock`] for a failing line.
    /// - [`crate::StoreError::Conflict`] if order-number generation kept
    ///   colliding.
    fn place_order_from_cart(
        &self,
        user_id: UserId,
        meta: &OrderMeta,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<OrderDetail>> + Send;

    /// Settle an order after a successful payment: re-check preconditions,
    /// decrement stock for every line (conditional, full rollback on any
    /// shortfall), set `payment_status = paid` and `status = PAID`, mark the
    /// stock as taken, and clear the owner's cart. One transaction.
    ///
    /// Orders that already took their stock at placement only flip the
    /// payment fields.
    ///
    /// # Errors
    ///
    /// - [`crate::StoreError::OrderNotFound`] for an unknown order.
    /// - [`crate::StoreError::AlreadyPaid`] if `payment_status` is already
    ///   `paid`.
    /// - [`crate::StoreError::OrderCancelled`] if the order was cancelled.
    /// - [`crate::StoreError::InsufficientStock`] if any line can no longer
    ///   be filled; no stock is taken in that case.
    fn mark_order_paid(
        &self,
        id: OrderId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<OrderDetail>> + Send;

    /// Cancel an order: check the transition table, stamp `cancelled_at`,
    /// and restock every line iff the order's stock was taken. One
    /// transaction; concurrent conflicting transitions lose with
    /// [`crate::StoreError::InvalidTransition`].
    ///
    /// # Errors
    ///
    /// - [`crate::StoreError::OrderNotFound`] for an unknown order.
    /// - [`crate::StoreError::InvalidTransition`] from a terminal status.
    fn cancel_order(
        &self,
        id: OrderId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Order>> + Send;

    /// Apply an admin update: an optional status transition (checked against
    /// the table, guarded against concurrent writers) plus payment-status
    /// and notes edits. A transition to `CANCELLED` routes through the same
    /// restock logic as [`Self::cancel_order`].
    ///
    /// # Errors
    ///
    /// - [`crate::StoreError::OrderNotFound`] for an unknown order.
    /// - [`crate::StoreError::InvalidTransition`] for a disallowed status
    ///   change.
    fn update_order(
        &self,
        id: OrderId,
        update: &OrderUpdate,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Order>> + Send;

    /// Transition `SHIPPED -> DELIVERED`, recording whether payment was
    /// received on the doorstep (the pay-on-delivery flow).
    ///
    /// # Errors
    ///
    /// - [`crate::StoreError::OrderNotFound`] for an unknown order.
    /// - [`crate::StoreError::InvalidTransition`] if the order is not
    ///   `SHIPPED`.
    fn confirm_delivery(
        &self,
        id: OrderId,
        payment_received: bool,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Order>> + Send;

    /// Move every listed order to `to`, skipping orders whose current status
    /// does not allow the transition (terminal orders included). Returns the
    /// number of orders updated. `to` must not be `CANCELLED`; cancellation
    /// carries a restock side effect and goes through [`Self::cancel_order`]
    /// one order at a time.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Database`] on update failure.
    fn bulk_update_status(
        &self,
        ids: &[OrderId],
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Fetch one order with lines, regardless of owner (admin path).
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::OrderNotFound`] for an unknown order.
    fn find_order(&self, id: OrderId) -> impl Future<Output = Result<OrderDetail>> + Send;

    /// Fetch one order with lines, enforcing ownership. A foreign order
    /// reads as absent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::OrderNotFound`] if the order is unknown
    /// or owned by another user.
    fn find_order_of_user(
        &self,
        user_id: UserId,
        id: OrderId,
    ) -> impl Future<Output = Result<OrderDetail>> + Send;

    /// The user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Database`] on query failure.
    fn orders_of_user(
        &self,
        user_id: UserId,
        page: Page,
    ) -> impl Future<Output = Result<Paginated<OrderDetail>>> + Send;

    /// Admin order listing, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Database`] on query failure.
    fn list_orders(
        &self,
        filter: &OrderFilter,
    ) -> impl Future<Output = Result<Paginated<Order>>> + Send;

    /// Flattened order lines for the CSV export, one row per line, matching
    /// `filter` (pagination ignored). `user_email` is left empty; the
    /// service fills it from the user directory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Database`] on query failure.
    fn export_rows(
        &self,
        filter: &OrderFilter,
    ) -> impl Future<Output = Result<Vec<OrderExportRow>>> + Send;
}
