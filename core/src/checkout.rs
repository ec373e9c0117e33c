//! Checkout orchestration.
//!
//! `CheckoutService` owns the order lifecycle: validation up front, then one
//! store call per transactional operation. It is generic over the provider
//! traits so the same logic runs against Postgres in production and the
//! in-memory store in tests.
//!
//! Stock is decremented under exactly one of two policies, fixed per entry
//! point:
//!
//! - [`CheckoutService::place_cod_order`] takes stock immediately (the order
//!   is binding the moment it is placed);
//! - [`CheckoutService::checkout_cart`] defers the decrement to
//!   [`CheckoutService::pay`], so an abandoned unpaid order never holds
//!   inventory.
//!
//! No entry point can reach both decrement paths.

use crate::address::Address;
use crate::cart::{CartLine, CartLineId, CartView};
use crate::clock::Clock;
use crate::error::{Result, StoreError};
use crate::order::{
    Order, OrderDetail, OrderExportRow, OrderFilter, OrderId, OrderItemRequest, OrderMeta,
    OrderStatus, OrderUpdate,
};
use crate::product::{NewProduct, Page, Paginated, Product, ProductFilter, ProductId};
use crate::providers::{
    CartStore, OrderStore, PaymentDetails, PaymentGateway, PaymentOutcome, ProductStore,
};
use crate::users::{UserDirectory, UserId};
use std::collections::HashMap;

/// Payment method label for pay-on-delivery orders.
pub const COD_METHOD: &str = "COD";

/// A direct order request: explicit items, paid on delivery.
#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    /// Items to order. Must be non-empty.
    pub items: Vec<OrderItemRequest>,
    /// Shipping address.
    pub shipping_address: Address,
    /// Billing address; defaults to the shipping address.
    pub billing_address: Option<Address>,
    /// Contact phone; required for structured addresses.
    pub phone: Option<String>,
    /// Free-form customer notes.
    pub notes: Option<String>,
}

/// A cart checkout request: the items come from the user's cart.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Shipping address.
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

/// Result of a payment attempt against an order.
#[derive(Debug, Clone)]
pub enum PaymentConfirmation {
    /// The charge was approved and the order settled.
    Paid(OrderDetail),
    /// The charge was declined; the order is untouched and may be retried.
    Declined {
        /// Gateway-supplied reason.
        reason: String,
    },
}

/// The order lifecycle service.
pub struct CheckoutService<S, G, D, C> {
    store: S,
    gateway: G,
    users: D,
    clock: C,
}

impl<S, G, D, C> CheckoutService<S, G, D, C>
where
    S: ProductStore + CartStore + OrderStore,
    G: PaymentGateway,
    D: UserDirectory,
    C: Clock,
{
    /// Assemble the service from its providers.
    pub fn new(store: S, gateway: G, users: D, clock: C) -> Self {
        Self {
            store,
            gateway,
            users,
            clock,
        }
    }

    /// The underlying store, for callers that need read access outside the
    /// lifecycle operations.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The underlying payment gateway.
    pub const fn gateway(&self) -> &G {
        &self.gateway
    }

    // ═══════════════════════════════════════════════════════════
    // Products
    // ═══════════════════════════════════════════════════════════

    /// Public product listing.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn products(&self, filter: &ProductFilter) -> Result<Paginated<Product>> {
        self.store.list_products(filter).await
    }

    /// One product by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProductNotFound`] for an unknown id.
    pub async fn product(&self, id: ProductId) -> Result<Product> {
        self.store.find_product(id).await
    }

    /// Create a product (admin path).
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn create_product(&self, new: NewProduct) -> Result<Product> {
        let product = self.store.create_product(new, self.clock.now()).await?;
        tracing::info!(product_id = %product.id, sku = %product.sku, "product created");
        Ok(product)
    }

    // ═══════════════════════════════════════════════════════════
    // Cart
    // ═══════════════════════════════════════════════════════════

    /// The user's cart, priced at current product prices.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn cart(&self, user_id: UserId) -> Result<CartView> {
        let entries = self.store.cart_entries(user_id).await?;
        Ok(CartView::from_entries(entries))
    }

    /// Add a product to the cart, merging with an existing line.
    ///
    /// # Errors
    ///
    /// Rejects a zero quantity with [`StoreError::Validation`]; otherwise
    /// per [`CartStore::add_to_cart`].
    pub async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine> {
        ensure_quantity(quantity)?;
        let line = self
            .store
            .add_to_cart(user_id, product_id, quantity, self.clock.now())
            .await?;
        tracing::debug!(user_id = %user_id, product_id = %product_id, quantity, "added to cart");
        Ok(line)
    }

    /// Replace a cart line's quantity.
    ///
    /// # Errors
    ///
    /// Rejects a zero quantity with [`StoreError::Validation`]; otherwise
    /// per [`CartStore::set_cart_quantity`].
    pub async fn update_cart_line(
        &self,
        user_id: UserId,
        line_id: CartLineId,
        quantity: u32,
    ) -> Result<CartLine> {
        ensure_quantity(quantity)?;
        self.store
            .set_cart_quantity(user_id, line_id, quantity, self.clock.now())
            .await
    }

    /// Remove one cart line.
    ///
    /// # Errors
    ///
    /// Per [`CartStore::remove_cart_line`].
    pub async fn remove_cart_line(&self, user_id: UserId, line_id: CartLineId) -> Result<()> {
        self.store.remove_cart_line(user_id, line_id).await
    }

    /// Empty the user's cart.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        self.store.clear_cart(user_id).await
    }

    // ═══════════════════════════════════════════════════════════
    // Order placement
    // ═══════════════════════════════════════════════════════════

    /// Place a pay-on-delivery order from explicit items. Stock is
    /// decremented immediately, atomically with the order insert; the user's
    /// cart is not involved.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Validation`] for empty items, a zero quantity, or a
    ///   bad address/phone.
    /// - Per [`OrderStore::place_order_taking_stock`] otherwise.
    pub async fn place_cod_order(
        &self,
        user_id: UserId,
        request: PlaceOrderRequest,
    ) -> Result<OrderDetail> {
        if request.items.is_empty() {
            return Err(StoreError::Validation(
                "Order must contain at least one item".to_string(),
            ));
        }
        for item in &request.items {
            ensure_quantity(item.quantity)?;
        }
        let meta = freeze_meta(
            request.shipping_address,
            request.billing_address,
            request.phone.as_deref(),
            COD_METHOD.to_string(),
            request.notes,
        )?;
        let detail = self
            .store
            .place_order_taking_stock(user_id, &request.items, &meta, self.clock.now())
            .await?;
        metrics::counter!("orders_placed_total", "policy" => "immediate").increment(1);
        tracing::info!(
            order_number = %detail.order.order_number,
            user_id = %user_id,
            total_cents = detail.order.total_cents,
            "placed pay-on-delivery order"
        );
        Ok(detail)
    }

    /// Place an order from the user's cart. Stock is validated but not
    /// decremented; the decrement and the cart clear happen when the order
    /// is paid.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Validation`] for a bad address/phone or an empty
    ///   payment method.
    /// - Per [`OrderStore::place_order_from_cart`] otherwise.
    pub async fn checkout_cart(
        &self,
        user_id: UserId,
        request: CheckoutRequest,
    ) -> Result<OrderDetail> {
        if request.payment_method.trim().is_empty() {
            return Err(StoreError::Validation(
                "Payment method is required".to_string(),
            ));
        }
        let meta = freeze_meta(
            request.shipping_address,
            request.billing_address,
            request.phone.as_deref(),
            request.payment_method,
            request.notes,
        )?;
        let detail = self
            .store
            .place_order_from_cart(user_id, &meta, self.clock.now())
            .await?;
        metrics::counter!("orders_placed_total", "policy" => "deferred").increment(1);
        tracing::info!(
            order_number = %detail.order.order_number,
            user_id = %user_id,
            total_cents = detail.order.total_cents,
            "placed order from cart"
        );
        Ok(detail)
    }

    // ═══════════════════════════════════════════════════════════
    // Payment
    // ═══════════════════════════════════════════════════════════

    /// Charge an order through the gateway and, on approval, settle it:
    /// decrement stock (if not already taken), mark it paid, and clear the
    /// owner's cart. A declined charge leaves the order untouched.
    ///
    /// # Errors
    ///
    /// - [`StoreError::OrderNotFound`] if the order is unknown or foreign.
    /// - [`StoreError::AlreadyPaid`] / [`StoreError::OrderCancelled`] before
    ///   the gateway is ever contacted.
    /// - [`StoreError::Validation`] for bad payment details.
    /// - [`StoreError::InsufficientStock`] if stock ran out between checkout
    ///   and payment; nothing is charged to the order in that case.
    pub async fn pay(
        &self,
        user_id: UserId,
        order_id: OrderId,
        details: &PaymentDetails,
    ) -> Result<PaymentConfirmation> {
        let detail = self.store.find_order_of_user(user_id, order_id).await?;
        ensure_payable(&detail.order)?;
        self.gateway.validate(details)?;

        let outcome = self
            .gateway
            .process(&detail.order.order_number, detail.order.total_cents, details)
            .await?;
        match outcome {
            PaymentOutcome::Approved(receipt) => {
                let settled = self.store.mark_order_paid(order_id, self.clock.now()).await;
                match settled {
                    Ok(settled) => {
                        metrics::counter!("payments_confirmed_total").increment(1);
                        tracing::info!(
                            order_number = %settled.order.order_number,
                            transaction_id = %receipt.transaction_id,
                            amount_cents = receipt.amount_cents,
                            "payment confirmed"
                        );
                        Ok(PaymentConfirmation::Paid(settled))
                    }
                    Err(err) => {
                        // The charge went through but the order could not be
                        // settled (stock raced out, or a concurrent cancel).
                        // Return the money before surfacing the error.
                        if let StoreError::InsufficientStock { .. } = err {
                            metrics::counter!("stock_conflicts_total").increment(1);
                        }
                        tracing::warn!(
                            order_number = %detail.order.order_number,
                            transaction_id = %receipt.transaction_id,
                            error = %err,
                            "settlement failed after approval, refunding"
                        );
                        if let Err(refund_err) = self
                            .gateway
                            .refund(&receipt.transaction_id, receipt.amount_cents)
                            .await
                        {
                            // The settlement error is the one the caller
                            // needs; the stuck refund is an ops problem.
                            tracing::error!(
                                order_number = %detail.order.order_number,
                                transaction_id = %receipt.transaction_id,
                                error = %refund_err,
                                "refund failed, manual reconciliation required"
                            );
                        }
                        Err(err)
                    }
                }
            }
            PaymentOutcome::Declined { reason } => {
                metrics::counter!("payments_declined_total").increment(1);
                tracing::info!(
                    order_number = %detail.order.order_number,
                    reason = %reason,
                    "payment declined"
                );
                Ok(PaymentConfirmation::Declined { reason })
            }
        }
    }

    // ═══════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════

    /// Customer-initiated cancellation. Allowed only while the order is
    /// `PENDING` or `PROCESSING`; restocks iff the order's stock was taken.
    ///
    /// # Errors
    ///
    /// - [`StoreError::OrderNotFound`] if the order is unknown or foreign.
    /// - [`StoreError::InvalidTransition`] outside the cancellable window.
    pub async fn cancel_my_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        let detail = self.store.find_order_of_user(user_id, order_id).await?;
        if !detail.order.status.user_cancellable() {
            return Err(StoreError::InvalidTransition {
                from: detail.order.status,
                to: OrderStatus::Cancelled,
            });
        }
        let order = self.store.cancel_order(order_id, self.clock.now()).await?;
        metrics::counter!("orders_cancelled_total", "by" => "user").increment(1);
        tracing::info!(order_number = %order.order_number, user_id = %user_id, "order cancelled by user");
        Ok(order)
    }

    /// Admin cancellation: any non-terminal order.
    ///
    /// # Errors
    ///
    /// Per [`OrderStore::cancel_order`].
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<Order> {
        let order = self.store.cancel_order(order_id, self.clock.now()).await?;
        metrics::counter!("orders_cancelled_total", "by" => "admin").increment(1);
        tracing::info!(order_number = %order.order_number, "order cancelled by admin");
        Ok(order)
    }

    /// Admin order update: status transition and/or field edits.
    ///
    /// # Errors
    ///
    /// Per [`OrderStore::update_order`].
    pub async fn update_order(&self, order_id: OrderId, update: &OrderUpdate) -> Result<Order> {
        self.store
            .update_order(order_id, update, self.clock.now())
            .await
    }

    /// Confirm delivery of a shipped order, recording whether payment was
    /// received on the doorstep.
    ///
    /// # Errors
    ///
    /// Per [`OrderStore::confirm_delivery`].
    pub async fn confirm_delivery(
        &self,
        order_id: OrderId,
        payment_received: bool,
    ) -> Result<Order> {
        let order = self
            .store
            .confirm_delivery(order_id, payment_received, self.clock.now())
            .await?;
        tracing::info!(
            order_number = %order.order_number,
            payment_received,
            "delivery confirmed"
        );
        Ok(order)
    }

    /// Bulk status update, skipping orders the transition table rejects.
    /// `CANCELLED` is refused: cancellation restocks and must go through the
    /// single-order path.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Validation`] for an empty id list or a `CANCELLED`
    ///   target.
    /// - Per [`OrderStore::bulk_update_status`] otherwise.
    pub async fn bulk_update_status(&self, ids: &[OrderId], to: OrderStatus) -> Result<u64> {
        if ids.is_empty() {
            return Err(StoreError::Validation(
                "No order ids supplied".to_string(),
            ));
        }
        if to == OrderStatus::Cancelled {
            return Err(StoreError::Validation(
                "Bulk cancellation is not supported; cancel orders individually".to_string(),
            ));
        }
        let updated = self
            .store
            .bulk_update_status(ids, to, self.clock.now())
            .await?;
        tracing::info!(requested = ids.len(), updated, status = %to, "bulk status update");
        Ok(updated)
    }

    // ═══════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════

    /// The user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn my_orders(&self, user_id: UserId, page: Page) -> Result<Paginated<OrderDetail>> {
        self.store.orders_of_user(user_id, page).await
    }

    /// One of the user's orders; foreign orders read as absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OrderNotFound`] if unknown or foreign.
    pub async fn my_order(&self, user_id: UserId, order_id: OrderId) -> Result<OrderDetail> {
        self.store.find_order_of_user(user_id, order_id).await
    }

    /// Admin order listing.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn orders(&self, filter: &OrderFilter) -> Result<Paginated<Order>> {
        self.store.list_orders(filter).await
    }

    /// One order with lines, any owner (admin path).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::OrderNotFound`] for an unknown id.
    pub async fn order(&self, order_id: OrderId) -> Result<OrderDetail> {
        self.store.find_order(order_id).await
    }

    /// Flattened order lines for the CSV export, with user emails resolved
    /// through the directory. Users the directory no longer knows export
    /// with an empty email rather than failing the whole export.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn export_rows(&self, filter: &OrderFilter) -> Result<Vec<OrderExportRow>> {
        let mut rows = self.store.export_rows(filter).await?;
        let mut emails: HashMap<i64, String> = HashMap::new();
        for row in &mut rows {
            if let Some(email) = emails.get(&row.user_id) {
                row.user_email.clone_from(email);
                continue;
            }
            let email = match self.users.find_user(UserId(row.user_id)).await {
                Ok(user) => user.email,
                Err(StoreError::UserNotFound) => String::new(),
                Err(err) => return Err(err),
            };
            emails.insert(row.user_id, email.clone());
            row.user_email = email;
        }
        Ok(rows)
    }
}

/// Reject a zero quantity.
fn ensure_quantity(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(StoreError::Validation(
            "Quantity must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Check that an order can still be paid for.
fn ensure_payable(order: &Order) -> Result<()> {
    if order.status == OrderStatus::Cancelled {
        return Err(StoreError::OrderCancelled);
    }
    if order.payment_status == crate::order::PaymentStatus::Paid {
        return Err(StoreError::AlreadyPaid);
    }
    Ok(())
}

/// Validate and freeze the shared address/payment fields. The billing
/// address defaults to the shipping address.
fn freeze_meta(
    shipping: Address,
    billing: Option<Address>,
    phone: Option<&str>,
    payment_method: String,
    notes: Option<String>,
) -> Result<OrderMeta> {
    let shipping = shipping.freeze(phone)?;
    let billing = match billing {
        Some(billing) => billing.freeze(phone)?,
        None => shipping.clone(),
    };
    Ok(OrderMeta {
        shipping_address: shipping.to_column(),
        billing_address: billing.to_column(),
        payment_method,
        notes,
    })
}
