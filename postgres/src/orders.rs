//! `PostgresStore`: the order lifecycle.

use crate::rows::{db_err, is_unique_violation, row_to_order, row_to_order_line, to_i32};
use crate::store::{decrement_stock, paginated, product_for_update, PostgresStore};
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Row, Transaction};
use storefront_core::{
    order::total_of, NewOrderLine, Order, OrderDetail, OrderExportRow, OrderFilter, OrderId,
    OrderItemRequest, OrderLine, OrderLineView, OrderMeta, OrderNumber, OrderStatus, OrderStore,
    OrderUpdate, Page, Paginated, PaymentStatus, ProductSummary, Result, StoreError,
    StoredAddress, UserId,
};

/// How many times order-number generation may retry on a unique violation.
const ORDER_NUMBER_ATTEMPTS: u32 = 3;

/// Lock an order row for the remainder of the transaction.
async fn order_for_update(
    tx: &mut Transaction<'static, Postgres>,
    id: OrderId,
) -> Result<Order> {
    let row = sqlx::query("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?
        .ok_or(StoreError::OrderNotFound)?;
    row_to_order(&row)
}

async fn lines_of(
    tx: &mut Transaction<'static, Postgres>,
    id: OrderId,
) -> Result<Vec<OrderLine>> {
    let rows = sqlx::query("SELECT * FROM order_lines WHERE order_id = $1 ORDER BY id")
        .bind(id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(db_err)?;
    rows.iter().map(row_to_order_line).collect()
}

/// Insert the order header, regenerating the order number on collision.
///
/// A unique violation puts the surrounding Postgres transaction into an
/// aborted state, so each attempt runs under a savepoint that is rolled back
/// before the next number is tried.
async fn insert_order(
    tx: &mut Transaction<'static, Postgres>,
    user_id: UserId,
    lines: &[NewOrderLine],
    meta: &OrderMeta,
    stock_taken: bool,
    now: DateTime<Utc>,
) -> Result<Order> {
    let total_cents = total_of(lines);
    let mut last_collision = None;
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let order_number = OrderNumber::generate(now);
        sqlx::query("SAVEPOINT order_header")
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        let inserted = sqlx::query(
            r"
            INSERT INTO orders (
                order_number, user_id, total_cents, shipping_address,
                billing_address, payment_method, payment_status, status,
                stock_taken, notes, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, 'pending', 'PENDING', $7, $8, $9, $9)
            RETURNING *
            ",
        )
        .bind(order_number.as_str())
        .bind(user_id.0)
        .bind(total_cents)
        .bind(&meta.shipping_address)
        .bind(&meta.billing_address)
        .bind(&meta.payment_method)
        .bind(stock_taken)
        .bind(&meta.notes)
        .bind(now)
        .fetch_one(&mut **tx)
        .await;

        let order = match inserted {
            Ok(row) => {
                sqlx::query("RELEASE SAVEPOINT order_header")
                    .execute(&mut **tx)
                    .await
                    .map_err(db_err)?;
                row_to_order(&row)?
            }
            Err(e) if is_unique_violation(&e) => {
                sqlx::query("ROLLBACK TO SAVEPOINT order_header")
                    .execute(&mut **tx)
                    .await
                    .map_err(db_err)?;
                last_collision = Some(order_number);
                continue;
            }
            Err(e) => return Err(db_err(e)),
        };

        for line in lines {
            sqlx::query(
                r"
                INSERT INTO order_lines (
                    order_id, product_id, quantity, unit_price_cents, subtotal_cents
                ) VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(order.id.0)
            .bind(line.product_id.0)
            .bind(to_i32(line.quantity)?)
            .bind(line.unit_price_cents)
            .bind(line.subtotal_cents)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        }
        return Ok(order);
    }
    Err(StoreError::Conflict(format!(
        "order number generation kept colliding (last: {})",
        last_collision.map_or_else(String::new, |n| n.to_string())
    )))
}

/// Restock every line of an order (cancellation of an order whose stock was
/// taken).
async fn restock(tx: &mut Transaction<'static, Postgres>, id: OrderId) -> Result<()> {
    sqlx::query(
        r"
        UPDATE products p
        SET stock = p.stock + l.quantity
        FROM order_lines l
        WHERE l.order_id = $1 AND l.product_id = p.id
        ",
    )
    .bind(id.0)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

/// Cancel inside an open transaction: transition check, restock iff stock
/// was taken, stamp `cancelled_at`. The status guard on the final UPDATE
/// keeps concurrent conflicting transitions from overwriting each other.
async fn cancel_in_tx(
    tx: &mut Transaction<'static, Postgres>,
    id: OrderId,
    now: DateTime<Utc>,
) -> Result<Order> {
    let order = order_for_update(tx, id).await?;
    order.status.ensure_transition(OrderStatus::Cancelled)?;
    if order.stock_taken {
        restock(tx, id).await?;
    }
    let row = sqlx::query(
        r"
        UPDATE orders
        SET status = 'CANCELLED', stock_taken = FALSE,
            cancelled_at = $3, updated_at = $3
        WHERE id = $1 AND status = $2
        RETURNING *
        ",
    )
    .bind(id.0)
    .bind(order.status.as_str())
    .bind(now)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db_err)?
    .ok_or(StoreError::InvalidTransition {
        from: order.status,
        to: OrderStatus::Cancelled,
    })?;
    row_to_order(&row)
}

/// Read the items and price-frozen draft lines for a set of requested
/// products, locking each product row. Rows are locked in product-id order
/// so concurrent multi-line orders cannot deadlock on each other.
async fn draft_lines(
    tx: &mut Transaction<'static, Postgres>,
    items: &[OrderItemRequest],
) -> Result<Vec<NewOrderLine>> {
    let mut items: Vec<&OrderItemRequest> = items.iter().collect();
    items.sort_by_key(|item| item.product_id.0);
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let product = product_for_update(tx, item.product_id).await?;
        product.ensure_orderable(item.quantity)?;
        lines.push(NewOrderLine::for_product(&product, item.quantity));
    }
    Ok(lines)
}

async fn detail_in_tx(
    tx: &mut Transaction<'static, Postgres>,
    order: Order,
) -> Result<OrderDetail> {
    let rows = sqlx::query(
        r"
        SELECT l.id, l.order_id, l.product_id, l.quantity,
               l.unit_price_cents, l.subtotal_cents,
               p.name, p.sku, p.price_cents, p.old_price_cents,
               p.image_url, p.stock
        FROM order_lines l
        JOIN products p ON p.id = l.product_id
        WHERE l.order_id = $1
        ORDER BY l.id
        ",
    )
    .bind(order.id.0)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_err)?;

    let lines = rows
        .iter()
        .map(|row| {
            let line = row_to_order_line(row)?;
            let product = ProductSummary {
                id: line.product_id,
                name: row.try_get("name").map_err(db_err)?,
                sku: row.try_get("sku").map_err(db_err)?,
                price_cents: row.try_get("price_cents").map_err(db_err)?,
                old_price_cents: row.try_get("old_price_cents").map_err(db_err)?,
                image_url: row.try_get("image_url").map_err(db_err)?,
                stock: row.try_get("stock").map_err(db_err)?,
            };
            Ok(OrderLineView { product, line })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(OrderDetail { order, lines })
}

fn order_filter_clause() -> &'static str {
    r"
        ($1::text IS NULL OR status = $1)
        AND ($2::text IS NULL OR payment_status = $2)
        AND ($3::bigint IS NULL OR user_id = $3)
        AND ($4::text IS NULL OR order_number ILIKE '%' || $4 || '%')
    "
}

impl OrderStore for PostgresStore {
    async fn place_order_taking_stock(
        &self,
        user_id: UserId,
        items: &[OrderItemRequest],
        meta: &OrderMeta,
        now: DateTime<Utc>,
    ) -> Result<OrderDetail> {
        let mut tx = self.begin().await?;
        let lines = draft_lines(&mut tx, items).await?;
        for line in &lines {
            decrement_stock(&mut tx, line.product_id, line.quantity, now).await?;
        }
        let order = insert_order(&mut tx, user_id, &lines, meta, true, now).await?;
        let detail = detail_in_tx(&mut tx, order).await?;
        tx.commit().await.map_err(db_err)?;
        metrics::counter!("store_orders_inserted_total", "policy" => "immediate").increment(1);
        Ok(detail)
    }

    async fn place_order_from_cart(
        &self,
        user_id: UserId,
        meta: &OrderMeta,
        now: DateTime<Utc>,
    ) -> Result<OrderDetail> {
        let mut tx = self.begin().await?;
        let cart = sqlx::query(
            "SELECT product_id, quantity FROM cart_lines WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id.0)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;
        if cart.is_empty() {
            return Err(StoreError::EmptyCart);
        }
        let items = cart
            .iter()
            .map(|row| {
                Ok(OrderItemRequest {
                    product_id: storefront_core::ProductId(
                        row.try_get("product_id").map_err(db_err)?,
                    ),
                    quantity: crate::rows::to_u32(row.try_get("quantity").map_err(db_err)?)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        // Stock is validated but not decremented; that happens at payment
        // confirmation. The cart also survives until then.
        let lines = draft_lines(&mut tx, &items).await?;
        let order = insert_order(&mut tx, user_id, &lines, meta, false, now).await?;
        let detail = detail_in_tx(&mut tx, order).await?;
        tx.commit().await.map_err(db_err)?;
        metrics::counter!("store_orders_inserted_total", "policy" => "deferred").increment(1);
        Ok(detail)
    }

    async fn mark_order_paid(&self, id: OrderId, now: DateTime<Utc>) -> Result<OrderDetail> {
        let mut tx = self.begin().await?;
        let order = order_for_update(&mut tx, id).await?;
        if order.status == OrderStatus::Cancelled {
            return Err(StoreError::OrderCancelled);
        }
        if order.payment_status == PaymentStatus::Paid {
            return Err(StoreError::AlreadyPaid);
        }

        if !order.stock_taken {
            let lines = lines_of(&mut tx, id).await?;
            for line in &lines {
                decrement_stock(&mut tx, line.product_id, line.quantity, now).await?;
            }
        }

        let status_after = if order.status.can_transition_to(OrderStatus::Paid) {
            OrderStatus::Paid
        } else {
            order.status
        };
        let row = sqlx::query(
            r"
            UPDATE orders
            SET payment_status = 'paid', status = $2, stock_taken = TRUE, updated_at = $3
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id.0)
        .bind(status_after.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        let order = row_to_order(&row)?;

        sqlx::query("DELETE FROM cart_lines WHERE user_id = $1")
            .bind(order.user_id.0)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let detail = detail_in_tx(&mut tx, order).await?;
        tx.commit().await.map_err(db_err)?;
        metrics::counter!("store_orders_settled_total").increment(1);
        Ok(detail)
    }

    async fn cancel_order(&self, id: OrderId, now: DateTime<Utc>) -> Result<Order> {
        let mut tx = self.begin().await?;
        let order = cancel_in_tx(&mut tx, id, now).await?;
        tx.commit().await.map_err(db_err)?;
        tracing::info!(order_number = %order.order_number, "order cancelled");
        Ok(order)
    }

    async fn update_order(
        &self,
        id: OrderId,
        update: &OrderUpdate,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let mut tx = self.begin().await?;
        let current = order_for_update(&mut tx, id).await?;

        let status_after = match update.status {
            Some(to) => {
                current.status.ensure_transition(to)?;
                if to == OrderStatus::Cancelled {
                    cancel_in_tx(&mut tx, id, now).await?;
                }
                to
            }
            None => current.status,
        };
        let payment_after = update.payment_status.unwrap_or(current.payment_status);
        let notes_after = match &update.notes {
            Some(notes) => notes.clone(),
            None => current.notes,
        };

        let row = sqlx::query(
            r"
            UPDATE orders
            SET status = $2, payment_status = $3, notes = $4, updated_at = $5
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id.0)
        .bind(status_after.as_str())
        .bind(payment_after.as_str())
        .bind(&notes_after)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        let order = row_to_order(&row)?;
        tx.commit().await.map_err(db_err)?;
        Ok(order)
    }

    async fn confirm_delivery(
        &self,
        id: OrderId,
        payment_received: bool,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let mut tx = self.begin().await?;
        let current = order_for_update(&mut tx, id).await?;
        current.status.ensure_transition(OrderStatus::Delivered)?;
        let payment_after = if payment_received {
            PaymentStatus::Paid
        } else {
            current.payment_status
        };
        let row = sqlx::query(
            r"
            UPDATE orders
            SET status = 'DELIVERED', payment_status = $2, updated_at = $3
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(id.0)
        .bind(payment_after.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        let order = row_to_order(&row)?;
        tx.commit().await.map_err(db_err)?;
        Ok(order)
    }

    async fn bulk_update_status(
        &self,
        ids: &[OrderId],
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        // Only statuses the table allows to reach `to` are eligible; the
        // rest are skipped rather than failed.
        let froms: Vec<String> = OrderStatus::ALL
            .iter()
            .filter(|from| from.can_transition_to(to))
            .map(|from| from.as_str().to_string())
            .collect();
        let ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let result = sqlx::query(
            r"
            UPDATE orders
            SET status = $1, updated_at = $2
            WHERE id = ANY($3) AND status = ANY($4)
            ",
        )
        .bind(to.as_str())
        .bind(now)
        .bind(&ids)
        .bind(&froms)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn find_order(&self, id: OrderId) -> Result<OrderDetail> {
        let mut tx = self.begin().await?;
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::OrderNotFound)?;
        let detail = detail_in_tx(&mut tx, row_to_order(&row)?).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(detail)
    }

    async fn find_order_of_user(&self, user_id: UserId, id: OrderId) -> Result<OrderDetail> {
        let mut tx = self.begin().await?;
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1 AND user_id = $2")
            .bind(id.0)
            .bind(user_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::OrderNotFound)?;
        let detail = detail_in_tx(&mut tx, row_to_order(&row)?).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(detail)
    }

    async fn orders_of_user(&self, user_id: UserId, page: Page) -> Result<Paginated<OrderDetail>> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let mut tx = self.begin().await?;
        let rows = sqlx::query(
            r"
            SELECT * FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(user_id.0)
        .bind(i64::from(page.per_page))
        .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let order = row_to_order(row)?;
            items.push(detail_in_tx(&mut tx, order).await?);
        }
        tx.commit().await.map_err(db_err)?;
        Ok(paginated(items, page, count.0))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Paginated<Order>> {
        let clause = order_filter_clause();
        let status = filter.status.map(|s| s.as_str());
        let payment_status = filter.payment_status.map(|s| s.as_str());
        let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let count: (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM orders WHERE {clause}"))
                .bind(status)
                .bind(payment_status)
                .bind(filter.user_id.map(|u| u.0))
                .bind(search)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

        let rows = sqlx::query(&format!(
            r"
            SELECT * FROM orders
            WHERE {clause}
            ORDER BY created_at DESC, id DESC
            LIMIT $5 OFFSET $6
            "
        ))
        .bind(status)
        .bind(payment_status)
        .bind(filter.user_id.map(|u| u.0))
        .bind(search)
        .bind(i64::from(filter.page.per_page))
        .bind(i64::try_from(filter.page.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let items = rows.iter().map(row_to_order).collect::<Result<Vec<_>>>()?;
        Ok(paginated(items, filter.page, count.0))
    }

    async fn export_rows(&self, filter: &OrderFilter) -> Result<Vec<OrderExportRow>> {
        let clause = order_filter_clause();
        let rows = sqlx::query(&format!(
            r"
            SELECT o.id AS order_id, o.order_number, o.created_at, o.status,
                   o.payment_status, o.payment_method, o.total_cents,
                   o.user_id, o.shipping_address,
                   l.quantity, l.unit_price_cents, l.subtotal_cents,
                   p.name AS product_name, p.sku AS product_sku
            FROM orders o
            JOIN order_lines l ON l.order_id = o.id
            JOIN products p ON p.id = l.product_id
            WHERE {clause}
            ORDER BY o.created_at DESC, o.id DESC, l.id
            "
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.payment_status.map(|s| s.as_str()))
        .bind(filter.user_id.map(|u| u.0))
        .bind(filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let created_at: DateTime<Utc> = row.try_get("created_at").map_err(db_err)?;
                let shipping: String = row.try_get("shipping_address").map_err(db_err)?;
                Ok(OrderExportRow {
                    order_id: row.try_get("order_id").map_err(db_err)?,
                    order_number: row.try_get("order_number").map_err(db_err)?,
                    created_at: created_at.to_rfc3339(),
                    status: row.try_get("status").map_err(db_err)?,
                    payment_status: row.try_get("payment_status").map_err(db_err)?,
                    payment_method: row.try_get("payment_method").map_err(db_err)?,
                    total_cents: row.try_get("total_cents").map_err(db_err)?,
                    user_id: row.try_get("user_id").map_err(db_err)?,
                    user_email: String::new(),
                    product_name: row.try_get("product_name").map_err(db_err)?,
                    product_sku: row.try_get("product_sku").map_err(db_err)?,
                    quantity: crate::rows::to_u32(row.try_get("quantity").map_err(db_err)?)?,
                    unit_price_cents: row.try_get("unit_price_cents").map_err(db_err)?,
                    subtotal_cents: row.try_get("subtotal_cents").map_err(db_err)?,
                    shipping_address: StoredAddress::from_column(&shipping).display_line(),
                })
            })
            .collect()
    }
}
