//! Row-to-domain mapping helpers.

use sqlx::postgres::PgRow;
use sqlx::Row;
use storefront_core::{
    CartLine, CartLineId, CategoryId, Order, OrderId, OrderLine, OrderNumber, OrderStatus,
    PaymentStatus, Product, ProductId, Result, StoreError, UserId,
};

pub(crate) fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Whether the error is a Postgres unique-constraint violation (SQLSTATE
/// 23505), used to detect order-number collisions.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

pub(crate) fn to_u32(v: i32) -> Result<u32> {
    u32::try_from(v).map_err(|_| StoreError::Database(format!("negative quantity: {v}")))
}

pub(crate) fn to_i32(v: u32) -> Result<i32> {
    i32::try_from(v).map_err(|_| StoreError::Database(format!("quantity overflow: {v}")))
}

pub(crate) fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId(row.try_get("id").map_err(db_err)?),
        name: row.try_get("name").map_err(db_err)?,
        sku: row.try_get("sku").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        price_cents: row.try_get("price_cents").map_err(db_err)?,
        old_price_cents: row.try_get("old_price_cents").map_err(db_err)?,
        stock: row.try_get("stock").map_err(db_err)?,
        available: row.try_get("available").map_err(db_err)?,
        category_id: row
            .try_get::<Option<i64>, _>("category_id")
            .map_err(db_err)?
            .map(CategoryId),
        image_url: row.try_get("image_url").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

pub(crate) fn row_to_cart_line(row: &PgRow) -> Result<CartLine> {
    Ok(CartLine {
        id: CartLineId(row.try_get("id").map_err(db_err)?),
        user_id: UserId(row.try_get("user_id").map_err(db_err)?),
        product_id: ProductId(row.try_get("product_id").map_err(db_err)?),
        quantity: to_u32(row.try_get("quantity").map_err(db_err)?)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

pub(crate) fn row_to_order(row: &PgRow) -> Result<Order> {
    Ok(Order {
        id: OrderId(row.try_get("id").map_err(db_err)?),
        order_number: OrderNumber(row.try_get("order_number").map_err(db_err)?),
        user_id: UserId(row.try_get("user_id").map_err(db_err)?),
        total_cents: row.try_get("total_cents").map_err(db_err)?,
        shipping_address: row.try_get("shipping_address").map_err(db_err)?,
        billing_address: row.try_get("billing_address").map_err(db_err)?,
        payment_method: row.try_get("payment_method").map_err(db_err)?,
        payment_status: PaymentStatus::parse(
            row.try_get::<String, _>("payment_status").map_err(db_err)?.as_str(),
        )?,
        status: OrderStatus::parse(row.try_get::<String, _>("status").map_err(db_err)?.as_str())?,
        stock_taken: row.try_get("stock_taken").map_err(db_err)?,
        notes: row.try_get("notes").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
        cancelled_at: row.try_get("cancelled_at").map_err(db_err)?,
    })
}

pub(crate) fn row_to_order_line(row: &PgRow) -> Result<OrderLine> {
    Ok(OrderLine {
        id: row.try_get("id").map_err(db_err)?,
        order_id: OrderId(row.try_get("order_id").map_err(db_err)?),
        product_id: ProductId(row.try_get("product_id").map_err(db_err)?),
        quantity: to_u32(row.try_get("quantity").map_err(db_err)?)?,
        unit_price_cents: row.try_get("unit_price_cents").map_err(db_err)?,
        subtotal_cents: row.try_get("subtotal_cents").map_err(db_err)?,
    })
}
