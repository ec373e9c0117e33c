//! End-to-end handler tests over the in-memory store.
//!
//! The router is exactly the production router; only the providers differ
//! (in-memory store, instant gateway, static user directory, fixed clock).

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use axum_test::TestServer;
use chrono::{TimeZone, Utc};
use http::header::{HeaderName, HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use serde_json::{json, Value};
use storefront_core::{CheckoutService, NewProduct, ProductStore};
use storefront_testing::{FixedClock, InstantGateway, MemoryStore, StaticUserDirectory};
use storefront_web::{storefront_router, AppState};

fn user_header() -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-user-id"),
        HeaderValue::from_static("1"),
    )
}

fn admin_headers() -> [(HeaderName, HeaderValue); 2] {
    [
        (
            HeaderName::from_static("x-user-id"),
            HeaderValue::from_static("9"),
        ),
        (
            HeaderName::from_static("x-user-role"),
            HeaderValue::from_static("admin"),
        ),
    ]
}

async fn server_with(gateway: InstantGateway) -> TestServer {
    let store = MemoryStore::new();
    let t0 = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
    // Product ids are assigned sequentially from 1.
    store
        .create_product(
            NewProduct {
                name: "Widget".to_string(),
                sku: "WID-001".to_string(),
                description: None,
                price_cents: 1000,
                old_price_cents: None,
                stock: 5,
                available: true,
                category_id: None,
                image_url: None,
            },
            t0,
        )
        .await
        .unwrap();
    store
        .create_product(
            NewProduct {
                name: "Gadget".to_string(),
                sku: "GAD-001".to_string(),
                description: None,
                price_cents: 2500,
                old_price_cents: None,
                stock: 2,
                available: true,
                category_id: None,
                image_url: None,
            },
            t0,
        )
        .await
        .unwrap();

    let users = StaticUserDirectory::new()
        .with_plain_user(1, "alice@example.com")
        .with_plain_user(9, "admin@example.com");
    let service = CheckoutService::new(store, gateway, users, FixedClock::new(t0));
    TestServer::new(storefront_router(AppState::new(service))).expect("test server")
}

async fn server() -> TestServer {
    server_with(InstantGateway::approving()).await
}

fn raw_order_body(product_id: i64, quantity: u32) -> Value {
    json!({
        "items": [{"product_id": product_id, "quantity": quantity}],
        "shipping_address": "1 Main St, Springfield",
    })
}

#[tokio::test]
async fn health_is_public() {
    let server = server().await;
    let response = server.get("/health").await;
    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn product_listing_is_public() {
    let server = server().await;
    let response = server.get("/api/products").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["total"], 2);
    assert_eq!(body["items"][0]["name"], "Gadget");
}

#[tokio::test]
async fn unknown_product_is_404() {
    let server = server().await;
    let response = server.get("/api/products/999").await;
    assert_eq!(response.status_code(), 404);
    let body: Value = response.json();
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn cart_requires_authentication() {
    let server = server().await;
    let response = server.get("/api/cart").await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn cod_order_decrements_stock() {
    let server = server().await;
    let (name, value) = user_header();

    let response = server
        .post("/api/orders")
        .add_header(name, value)
        .json(&raw_order_body(1, 3))
        .await;
    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    assert_eq!(body["order"]["status"], "PENDING");
    assert_eq!(body["order"]["payment_method"], "COD");
    assert_eq!(body["order"]["total_cents"], 3000);

    let product: Value = server.get("/api/products/1").await.json();
    assert_eq!(product["stock"], 2);
}

#[tokio::test]
async fn overdrawn_order_is_rejected() {
    let server = server().await;
    let (name, value) = user_header();

    let response = server
        .post("/api/orders")
        .add_header(name, value)
        .json(&raw_order_body(2, 3))
        .await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["code"], "BAD_REQUEST");

    let product: Value = server.get("/api/products/2").await.json();
    assert_eq!(product["stock"], 2);
}

#[tokio::test]
async fn cart_checkout_and_payment_flow() {
    let server = server().await;
    let (name, value) = user_header();

    let response = server
        .post("/api/cart/items")
        .add_header(name.clone(), value.clone())
        .json(&json!({"product_id": 1, "quantity": 2}))
        .await;
    assert_eq!(response.status_code(), 201);

    let response = server
        .post("/api/checkout")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "shipping_address": "1 Main St, Springfield",
            "payment_method": "card",
        }))
        .await;
    assert_eq!(response.status_code(), 201);
    let order: Value = response.json();
    let order_id = order["order"]["id"].as_i64().unwrap();

    // Stock untouched until payment.
    let product: Value = server.get("/api/products/1").await.json();
    assert_eq!(product["stock"], 5);

    let response = server
        .post(&format!("/api/orders/{order_id}/pay"))
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "method": "card",
            "card_number": "4111 1111 1111 1111",
            "expiry": "12/30",
            "cvv": "123",
        }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "paid");
    assert_eq!(body["order"]["payment_status"], "paid");

    let product: Value = server.get("/api/products/1").await.json();
    assert_eq!(product["stock"], 3);

    // Cart was cleared by settlement.
    let cart: Value = server
        .get("/api/cart")
        .add_header(name, value)
        .await
        .json();
    assert_eq!(cart["item_count"], 0);
}

#[tokio::test]
async fn declined_payment_is_402() {
    let server = server_with(InstantGateway::declining("card refused")).await;
    let (name, value) = user_header();

    server
        .post("/api/cart/items")
        .add_header(name.clone(), value.clone())
        .json(&json!({"product_id": 1, "quantity": 1}))
        .await;
    let order: Value = server
        .post("/api/checkout")
        .add_header(name.clone(), value.clone())
        .json(&json!({
            "shipping_address": "1 Main St, Springfield",
            "payment_method": "card",
        }))
        .await
        .json();
    let order_id = order["order"]["id"].as_i64().unwrap();

    let response = server
        .post(&format!("/api/orders/{order_id}/pay"))
        .add_header(name, value)
        .json(&json!({
            "method": "card",
            "card_number": "4111 1111 1111 1111",
            "expiry": "12/30",
            "cvv": "123",
        }))
        .await;
    assert_eq!(response.status_code(), 402);
    let body: Value = response.json();
    assert_eq!(body["status"], "declined");
    assert_eq!(body["reason"], "card refused");
}

#[tokio::test]
async fn missing_payment_method_is_400_before_charging() {
    let server = server().await;
    let (name, value) = user_header();

    let order: Value = server
        .post("/api/orders")
        .add_header(name.clone(), value.clone())
        .json(&raw_order_body(1, 1))
        .await
        .json();
    let order_id = order["order"]["id"].as_i64().unwrap();

    let response = server
        .post(&format!("/api/orders/{order_id}/pay"))
        .add_header(name, value)
        .json(&json!({"method": ""}))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn second_cancel_is_a_conflict() {
    let server = server().await;
    let (name, value) = user_header();

    let order: Value = server
        .post("/api/orders")
        .add_header(name.clone(), value.clone())
        .json(&raw_order_body(1, 1))
        .await
        .json();
    let order_id = order["order"]["id"].as_i64().unwrap();

    let response = server
        .post(&format!("/api/orders/{order_id}/cancel"))
        .add_header(name.clone(), value.clone())
        .await;
    response.assert_status_ok();

    let response = server
        .post(&format!("/api/orders/{order_id}/cancel"))
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), 409);
    let body: Value = response.json();
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn foreign_orders_read_as_absent() {
    let server = server().await;
    let (name, value) = user_header();

    let order: Value = server
        .post("/api/orders")
        .add_header(name, value)
        .json(&raw_order_body(1, 1))
        .await
        .json();
    let order_id = order["order"]["id"].as_i64().unwrap();

    let response = server
        .get(&format!("/api/orders/{order_id}"))
        .add_header(
            HeaderName::from_static("x-user-id"),
            HeaderValue::from_static("2"),
        )
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn admin_routes_require_the_admin_role() {
    let server = server().await;
    let (name, value) = user_header();

    let response = server
        .get("/api/admin/orders")
        .add_header(name, value)
        .await;
    assert_eq!(response.status_code(), 403);

    let response = server.get("/api/admin/orders").await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn admin_can_walk_an_order_through_fulfillment() {
    let server = server().await;
    let (name, value) = user_header();

    let order: Value = server
        .post("/api/orders")
        .add_header(name, value)
        .json(&raw_order_body(1, 1))
        .await
        .json();
    let order_id = order["order"]["id"].as_i64().unwrap();

    for status in ["PROCESSING", "SHIPPED"] {
        let mut request = server
            .patch(&format!("/api/admin/orders/{order_id}"))
            .json(&json!({"status": status}));
        for (name, value) in admin_headers() {
            request = request.add_header(name, value);
        }
        request.await.assert_status_ok();
    }

    let mut request = server
        .post(&format!("/api/admin/orders/{order_id}/deliver"))
        .json(&json!({}));
    for (name, value) in admin_headers() {
        request = request.add_header(name, value);
    }
    let response = request.await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "DELIVERED");
    assert_eq!(body["payment_status"], "paid");
}

#[tokio::test]
async fn bulk_cancel_is_refused() {
    let server = server().await;
    let mut request = server
        .post("/api/admin/orders/bulk-status")
        .json(&json!({"order_ids": [1], "status": "CANCELLED"}));
    for (name, value) in admin_headers() {
        request = request.add_header(name, value);
    }
    let response = request.await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn csv_export_resolves_user_emails() {
    let server = server().await;
    let (name, value) = user_header();

    let order: Value = server
        .post("/api/orders")
        .add_header(name, value)
        .json(&raw_order_body(1, 2))
        .await
        .json();
    let order_number = order["order"]["order_number"].as_str().unwrap().to_string();

    let mut request = server.get("/api/admin/orders/export");
    for (name, value) in admin_headers() {
        request = request.add_header(name, value);
    }
    let response = request.await;
    response.assert_status_ok();
    assert!(response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/csv")));
    assert!(response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("attachment")));

    let body = response.text();
    assert!(body.contains(&order_number));
    assert!(body.contains("alice@example.com"));
    assert!(body.contains("WID-001"));
}

#[tokio::test]
async fn admin_can_create_products() {
    let server = server().await;
    let mut request = server.post("/api/admin/products").json(&json!({
        "name": "Sprocket",
        "sku": "SPR-001",
        "description": null,
        "price_cents": 750,
        "old_price_cents": null,
        "stock": 10,
        "available": true,
        "category_id": null,
        "image_url": null,
    }));
    for (name, value) in admin_headers() {
        request = request.add_header(name, value);
    }
    let response = request.await;
    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    assert_eq!(body["sku"], "SPR-001");

    let listing: Value = server.get("/api/products").await.json();
    assert_eq!(listing["total"], 3);
}
