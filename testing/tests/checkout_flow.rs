//! Order lifecycle tests: the full checkout orchestration running against
//! the in-memory store with a pinned clock and a deterministic gateway.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use chrono::{DateTime, TimeZone, Utc};
use storefront_core::{
    Address, CheckoutRequest, CheckoutService, NewProduct, OrderId, OrderItemRequest, OrderStatus,
    OrderUpdate, Page, PaymentConfirmation, PaymentDetails, PaymentStatus, PlaceOrderRequest,
    ProductId, ProductStore, StoreError, UserId, COD_METHOD,
};
use storefront_testing::{FixedClock, InstantGateway, MemoryStore, StaticUserDirectory};

type Service = CheckoutService<MemoryStore, InstantGateway, StaticUserDirectory, FixedClock>;

const ALICE: UserId = UserId(1);
const BOB: UserId = UserId(2);

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
}

fn service_with(gateway: InstantGateway) -> Service {
    CheckoutService::new(
        MemoryStore::new(),
        gateway,
        StaticUserDirectory::new()
            .with_plain_user(1, "alice@example.com")
            .with_plain_user(2, "bob@example.com"),
        FixedClock::new(t0()),
    )
}

fn service() -> Service {
    service_with(InstantGateway::approving())
}

async fn seed(service: &Service, name: &str, price_cents: i64, stock: i32) -> ProductId {
    seed_with(service, name, price_cents, stock, true).await
}

async fn seed_with(
    service: &Service,
    name: &str,
    price_cents: i64,
    stock: i32,
    available: bool,
) -> ProductId {
    service
        .store()
        .create_product(
            NewProduct {
                name: name.to_string(),
                sku: format!("SKU-{}", name.to_uppercase()),
                description: None,
                price_cents,
                old_price_cents: None,
                stock,
                available,
                category_id: None,
                image_url: None,
            },
            t0(),
        )
        .await
        .unwrap()
        .id
}

fn address() -> Address {
    Address::Raw("1 Main St, Springfield".to_string())
}

fn cod_request(items: Vec<OrderItemRequest>) -> PlaceOrderRequest {
    PlaceOrderRequest {
        items,
        shipping_address: address(),
        billing_address: None,
        phone: None,
        notes: None,
    }
}

fn checkout_request() -> CheckoutRequest {
    CheckoutRequest {
        shipping_address: address(),
        billing_address: None,
        phone: None,
        payment_method: "card".to_string(),
        notes: None,
    }
}

fn card() -> PaymentDetails {
    PaymentDetails {
        method: "card".to_string(),
        ..PaymentDetails::default()
    }
}

fn item(product_id: ProductId, quantity: u32) -> OrderItemRequest {
    OrderItemRequest {
        product_id,
        quantity,
    }
}

// ═══════════════════════════════════════════════════════════
// Pay-on-delivery: immediate stock decrement
// ═══════════════════════════════════════════════════════════

#[tokio::test]
async fn cod_order_decrements_stock_immediately() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 5).await;

    let detail = service
        .place_cod_order(ALICE, cod_request(vec![item(widget, 3)]))
        .await
        .unwrap();

    assert_eq!(detail.order.total_cents, 3000);
    assert_eq!(detail.order.status, OrderStatus::Pending);
    assert_eq!(detail.order.payment_status, PaymentStatus::Pending);
    assert_eq!(detail.order.payment_method, COD_METHOD);
    assert!(detail.order.stock_taken);
    assert!(detail.order.order_number.as_str().starts_with("ORD-"));
    assert_eq!(service.store().stock_of(widget).unwrap(), 2);
}

#[tokio::test]
async fn order_exceeding_stock_rejected() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 5).await;
    service
        .place_cod_order(ALICE, cod_request(vec![item(widget, 3)]))
        .await
        .unwrap();

    let err = service
        .place_cod_order(BOB, cod_request(vec![item(widget, 3)]))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::InsufficientStock {
            name: "Widget".to_string(),
            available: 2,
        }
    );
    assert_eq!(service.store().stock_of(widget).unwrap(), 2);
}

#[tokio::test]
async fn multi_line_shortfall_aborts_whole_order() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 10).await;
    let gadget = seed(&service, "Gadget", 2000, 1).await;

    let err = service
        .place_cod_order(ALICE, cod_request(vec![item(widget, 2), item(gadget, 2)]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InsufficientStock { available: 1, .. }));

    // Neither line took stock.
    assert_eq!(service.store().stock_of(widget).unwrap(), 10);
    assert_eq!(service.store().stock_of(gadget).unwrap(), 1);
    assert!(service
        .my_orders(ALICE, Page::default())
        .await
        .unwrap()
        .items
        .is_empty());
}

#[tokio::test]
async fn unavailable_product_rejected_even_with_stock() {
    let service = service();
    let relic = seed_with(&service, "Relic", 1000, 10, false).await;
    let err = service
        .place_cod_order(ALICE, cod_request(vec![item(relic, 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unavailable { .. }));
}

#[tokio::test]
async fn empty_items_and_zero_quantity_rejected() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 5).await;

    assert!(matches!(
        service.place_cod_order(ALICE, cod_request(vec![])).await,
        Err(StoreError::Validation(_))
    ));
    assert!(matches!(
        service
            .place_cod_order(ALICE, cod_request(vec![item(widget, 0)]))
            .await,
        Err(StoreError::Validation(_))
    ));
}

// ═══════════════════════════════════════════════════════════
// Cancellation and restock
// ═══════════════════════════════════════════════════════════

#[tokio::test]
async fn cancel_restores_stock_exactly_once() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 5).await;
    let detail = service
        .place_cod_order(ALICE, cod_request(vec![item(widget, 3)]))
        .await
        .unwrap();
    assert_eq!(service.store().stock_of(widget).unwrap(), 2);

    let cancelled = service.cancel_my_order(ALICE, detail.order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.cancelled_at, Some(t0()));
    assert_eq!(service.store().stock_of(widget).unwrap(), 5);

    // Cancelling again is rejected and must not restock a second time.
    let err = service
        .cancel_my_order(ALICE, detail.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
    assert_eq!(service.store().stock_of(widget).unwrap(), 5);
}

#[tokio::test]
async fn unpaid_cart_order_cancel_does_not_restock() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 5).await;
    service.add_to_cart(ALICE, widget, 3).await.unwrap();
    let detail = service.checkout_cart(ALICE, checkout_request()).await.unwrap();

    // Stock was never taken, so cancellation must not inflate it.
    service.cancel_my_order(ALICE, detail.order.id).await.unwrap();
    assert_eq!(service.store().stock_of(widget).unwrap(), 5);
}

#[tokio::test]
async fn cancel_restores_stock_at_quantity_bounds() {
    let service = service();
    let bolt = seed(&service, "Bolt", 1, i32::MAX).await;
    let detail = service
        .place_cod_order(ALICE, cod_request(vec![item(bolt, u32::try_from(i32::MAX).unwrap())]))
        .await
        .unwrap();
    assert_eq!(service.store().stock_of(bolt).unwrap(), 0);

    service.cancel_order(detail.order.id).await.unwrap();
    assert_eq!(service.store().stock_of(bolt).unwrap(), i32::MAX);
}

#[tokio::test]
async fn shipped_order_cannot_be_user_cancelled() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 5).await;
    let detail = service
        .place_cod_order(ALICE, cod_request(vec![item(widget, 1)]))
        .await
        .unwrap();
    step(&service, detail.order.id, OrderStatus::Processing).await;
    step(&service, detail.order.id, OrderStatus::Shipped).await;

    let err = service
        .cancel_my_order(ALICE, detail.order.id)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::InvalidTransition {
            from: OrderStatus::Shipped,
            to: OrderStatus::Cancelled,
        }
    );

    // An admin still can, and the stock comes back.
    service.cancel_order(detail.order.id).await.unwrap();
    assert_eq!(service.store().stock_of(widget).unwrap(), 5);
}

// ═══════════════════════════════════════════════════════════
// Cart checkout: deferred stock decrement
// ═══════════════════════════════════════════════════════════

#[tokio::test]
async fn cart_checkout_defers_decrement_until_payment() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 5).await;
    service.add_to_cart(ALICE, widget, 2).await.unwrap();

    let detail = service.checkout_cart(ALICE, checkout_request()).await.unwrap();
    assert!(!detail.order.stock_taken);
    assert_eq!(detail.order.total_cents, 2000);
    // Checkout validated but did not take stock, and the cart survives
    // until payment succeeds.
    assert_eq!(service.store().stock_of(widget).unwrap(), 5);
    assert!(!service.cart(ALICE).await.unwrap().is_empty());

    let confirmation = service.pay(ALICE, detail.order.id, &card()).await.unwrap();
    let settled = match confirmation {
        PaymentConfirmation::Paid(settled) => settled,
        PaymentConfirmation::Declined { reason } => panic!("declined: {reason}"),
    };
    assert_eq!(settled.order.status, OrderStatus::Paid);
    assert_eq!(settled.order.payment_status, PaymentStatus::Paid);
    assert!(settled.order.stock_taken);
    assert_eq!(service.store().stock_of(widget).unwrap(), 3);
    assert!(service.cart(ALICE).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_cart_checkout_rejected() {
    let service = service();
    let err = service
        .checkout_cart(ALICE, checkout_request())
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::EmptyCart);
}

#[tokio::test]
async fn payment_on_cancelled_order_rejected() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 5).await;
    service.add_to_cart(ALICE, widget, 2).await.unwrap();
    let detail = service.checkout_cart(ALICE, checkout_request()).await.unwrap();
    service.cancel_my_order(ALICE, detail.order.id).await.unwrap();

    let err = service.pay(ALICE, detail.order.id, &card()).await.unwrap_err();
    assert_eq!(err, StoreError::OrderCancelled);
    assert!(service.gateway().charges().is_empty());
}

#[tokio::test]
async fn second_payment_rejected() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 5).await;
    service.add_to_cart(ALICE, widget, 1).await.unwrap();
    let detail = service.checkout_cart(ALICE, checkout_request()).await.unwrap();
    service.pay(ALICE, detail.order.id, &card()).await.unwrap();

    let err = service.pay(ALICE, detail.order.id, &card()).await.unwrap_err();
    assert_eq!(err, StoreError::AlreadyPaid);
    assert_eq!(service.gateway().charges().len(), 1);
}

#[tokio::test]
async fn declined_payment_leaves_order_untouched() {
    let service = service_with(InstantGateway::declining("insufficient funds"));
    let widget = seed(&service, "Widget", 1000, 5).await;
    service.add_to_cart(ALICE, widget, 2).await.unwrap();
    let detail = service.checkout_cart(ALICE, checkout_request()).await.unwrap();

    let confirmation = service.pay(ALICE, detail.order.id, &card()).await.unwrap();
    assert!(matches!(
        confirmation,
        PaymentConfirmation::Declined { reason } if reason == "insufficient funds"
    ));

    let after = service.my_order(ALICE, detail.order.id).await.unwrap();
    assert_eq!(after.order.payment_status, PaymentStatus::Pending);
    assert_eq!(after.order.status, OrderStatus::Pending);
    assert_eq!(service.store().stock_of(widget).unwrap(), 5);
    assert!(!service.cart(ALICE).await.unwrap().is_empty());
}

#[tokio::test]
async fn settlement_failure_after_approval_is_refunded() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 5).await;
    service.add_to_cart(ALICE, widget, 3).await.unwrap();
    let detail = service.checkout_cart(ALICE, checkout_request()).await.unwrap();

    // Someone else drains the stock between checkout and payment.
    service
        .place_cod_order(BOB, cod_request(vec![item(widget, 4)]))
        .await
        .unwrap();
    assert_eq!(service.store().stock_of(widget).unwrap(), 1);

    let err = service.pay(ALICE, detail.order.id, &card()).await.unwrap_err();
    assert!(matches!(err, StoreError::InsufficientStock { available: 1, .. }));

    // The charge went through and was returned.
    assert_eq!(service.gateway().charges().len(), 1);
    assert_eq!(service.gateway().refunds().len(), 1);
    let after = service.my_order(ALICE, detail.order.id).await.unwrap();
    assert_eq!(after.order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn failed_refund_does_not_mask_the_settlement_error() {
    let service = service_with(InstantGateway::approving().with_failing_refunds());
    let widget = seed(&service, "Widget", 1000, 5).await;
    service.add_to_cart(ALICE, widget, 3).await.unwrap();
    let detail = service.checkout_cart(ALICE, checkout_request()).await.unwrap();

    service
        .place_cod_order(BOB, cod_request(vec![item(widget, 4)]))
        .await
        .unwrap();

    // Settlement fails on stock; the refund attempt also fails, but the
    // caller must still see the stock shortfall, not the refund error.
    let err = service.pay(ALICE, detail.order.id, &card()).await.unwrap_err();
    assert!(matches!(err, StoreError::InsufficientStock { available: 1, .. }));
    assert_eq!(service.gateway().charges().len(), 1);
    assert!(service.gateway().refunds().is_empty());
}

// ═══════════════════════════════════════════════════════════
// Price freezing
// ═══════════════════════════════════════════════════════════

#[tokio::test]
async fn price_change_after_order_does_not_affect_total() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 5).await;
    let detail = service
        .place_cod_order(ALICE, cod_request(vec![item(widget, 2)]))
        .await
        .unwrap();

    service.store().set_price(widget, 9999).unwrap();

    let after = service.my_order(ALICE, detail.order.id).await.unwrap();
    assert_eq!(after.order.total_cents, 2000);
    assert_eq!(after.lines[0].line.unit_price_cents, 1000);
    // The joined product summary shows the new price; the line does not.
    assert_eq!(after.lines[0].product.price_cents, 9999);
}

// ═══════════════════════════════════════════════════════════
// Cart behaviour
// ═══════════════════════════════════════════════════════════

#[tokio::test]
async fn add_to_cart_merges_and_checks_merged_quantity() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 5).await;
    service.add_to_cart(ALICE, widget, 3).await.unwrap();

    let err = service.add_to_cart(ALICE, widget, 3).await.unwrap_err();
    assert!(matches!(err, StoreError::InsufficientStock { available: 5, .. }));

    service.add_to_cart(ALICE, widget, 2).await.unwrap();
    let cart = service.cart(ALICE).await.unwrap();
    assert_eq!(cart.entries.len(), 1);
    assert_eq!(cart.entries[0].line.quantity, 5);
    assert_eq!(cart.total_cents, 5000);
    assert_eq!(cart.item_count, 5);
}

#[tokio::test]
async fn cart_lines_are_scoped_to_their_owner() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 5).await;
    let line = service.add_to_cart(ALICE, widget, 1).await.unwrap();

    assert_eq!(
        service.update_cart_line(BOB, line.id, 2).await.unwrap_err(),
        StoreError::CartLineNotFound
    );
    assert_eq!(
        service.remove_cart_line(BOB, line.id).await.unwrap_err(),
        StoreError::CartLineNotFound
    );

    let updated = service.update_cart_line(ALICE, line.id, 4).await.unwrap();
    assert_eq!(updated.quantity, 4);
    service.remove_cart_line(ALICE, line.id).await.unwrap();
    assert!(service.cart(ALICE).await.unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════
// Queries, fulfillment, and admin operations
// ═══════════════════════════════════════════════════════════

async fn step(service: &Service, id: OrderId, to: OrderStatus) {
    service
        .update_order(
            id,
            &OrderUpdate {
                status: Some(to),
                ..OrderUpdate::default()
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn foreign_orders_read_as_absent() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 5).await;
    let detail = service
        .place_cod_order(ALICE, cod_request(vec![item(widget, 1)]))
        .await
        .unwrap();

    assert_eq!(
        service.my_order(BOB, detail.order.id).await.unwrap_err(),
        StoreError::OrderNotFound
    );
    assert_eq!(
        service.cancel_my_order(BOB, detail.order.id).await.unwrap_err(),
        StoreError::OrderNotFound
    );
}

#[tokio::test]
async fn confirm_delivery_records_cod_payment() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 5).await;
    let detail = service
        .place_cod_order(ALICE, cod_request(vec![item(widget, 1)]))
        .await
        .unwrap();
    step(&service, detail.order.id, OrderStatus::Processing).await;
    step(&service, detail.order.id, OrderStatus::Shipped).await;

    let delivered = service.confirm_delivery(detail.order.id, true).await.unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert_eq!(delivered.payment_status, PaymentStatus::Paid);

    // Delivered is terminal.
    let err = service.cancel_order(detail.order.id).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));
}

#[tokio::test]
async fn delivery_confirmation_requires_shipped() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 5).await;
    let detail = service
        .place_cod_order(ALICE, cod_request(vec![item(widget, 1)]))
        .await
        .unwrap();
    let err = service.confirm_delivery(detail.order.id, true).await.unwrap_err();
    assert_eq!(
        err,
        StoreError::InvalidTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Delivered,
        }
    );
}

#[tokio::test]
async fn bulk_update_skips_untransitionable_orders() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 10).await;
    let mut ids = Vec::new();
    for _ in 0..3 {
        let detail = service
            .place_cod_order(ALICE, cod_request(vec![item(widget, 1)]))
            .await
            .unwrap();
        ids.push(detail.order.id);
    }
    service.cancel_order(ids[1]).await.unwrap();
    step(&service, ids[2], OrderStatus::Processing).await;
    step(&service, ids[2], OrderStatus::Shipped).await;
    service.confirm_delivery(ids[2], true).await.unwrap();

    let updated = service
        .bulk_update_status(&ids, OrderStatus::Processing)
        .await
        .unwrap();
    assert_eq!(updated, 1);
    assert_eq!(
        service.order(ids[0]).await.unwrap().order.status,
        OrderStatus::Processing
    );
    assert_eq!(
        service.order(ids[1]).await.unwrap().order.status,
        OrderStatus::Cancelled
    );
}

#[tokio::test]
async fn bulk_cancel_refused() {
    let service = service();
    let err = service
        .bulk_update_status(&[OrderId(1)], OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn admin_listing_filters_by_status_and_search() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 10).await;
    let first = service
        .place_cod_order(ALICE, cod_request(vec![item(widget, 1)]))
        .await
        .unwrap();
    let second = service
        .place_cod_order(BOB, cod_request(vec![item(widget, 1)]))
        .await
        .unwrap();
    service.cancel_order(second.order.id).await.unwrap();

    let pending = service
        .orders(&storefront_core::OrderFilter {
            status: Some(OrderStatus::Pending),
            ..storefront_core::OrderFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(pending.total, 1);
    assert_eq!(pending.items[0].id, first.order.id);

    let by_number = service
        .orders(&storefront_core::OrderFilter {
            search: Some(second.order.order_number.as_str().to_lowercase()),
            ..storefront_core::OrderFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(by_number.total, 1);
    assert_eq!(by_number.items[0].id, second.order.id);
}

#[tokio::test]
async fn export_rows_resolve_user_emails() {
    let service = service();
    let widget = seed(&service, "Widget", 1000, 10).await;
    let gadget = seed(&service, "Gadget", 2000, 10).await;
    service
        .place_cod_order(ALICE, cod_request(vec![item(widget, 2), item(gadget, 1)]))
        .await
        .unwrap();

    let rows = service
        .export_rows(&storefront_core::OrderFilter::default())
        .await
        .unwrap();
    // One row per order line.
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.user_email, "alice@example.com");
        assert_eq!(row.shipping_address, "1 Main St, Springfield");
        assert_eq!(row.payment_method, COD_METHOD);
    }
    assert_eq!(
        rows.iter().map(|r| r.subtotal_cents).sum::<i64>(),
        4000
    );
}
