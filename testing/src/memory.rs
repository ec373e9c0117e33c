//! In-memory store backend.
//!
//! All tables live behind one `Mutex`, so every store operation — including
//! the multi-row ones like order placement — runs under a single lock
//! acquisition. That makes the lock the in-memory equivalent of a database
//! transaction: the atomicity contract of the store traits holds here for
//! the same reasons it holds in Postgres, and service-level tests exercise
//! the real orchestration logic against it.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use storefront_core::{
    order::total_of, CartEntry, CartLine, CartLineId, CartStore, NewOrderLine, NewProduct, Order,
    OrderDetail, OrderExportRow, OrderFilter, OrderId, OrderItemRequest, OrderLine, OrderLineView,
    OrderMeta, OrderNumber, OrderStatus, OrderStore, OrderUpdate, Page, Paginated, PaymentStatus,
    Product, ProductFilter, ProductId, ProductStore, Result, StoreError, StoredAddress, UserId,
};

/// How many times order-number generation may retry on collision.
const ORDER_NUMBER_ATTEMPTS: u32 = 3;

#[derive(Default)]
struct Tables {
    products: HashMap<i64, Product>,
    cart_lines: HashMap<i64, CartLine>,
    orders: HashMap<i64, Order>,
    order_lines: Vec<OrderLine>,
    next_product_id: i64,
    next_cart_line_id: i64,
    next_order_id: i64,
    next_order_line_id: i64,
}

/// The in-memory backend. Cheap to construct per test; `Default` starts
/// empty.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".to_string()))
    }

    /// Current stock level of a product, for assertions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProductNotFound`] for an unknown id.
    pub fn stock_of(&self, id: ProductId) -> Result<i32> {
        let tables = self.lock()?;
        tables
            .products
            .get(&id.0)
            .map(|p| p.stock)
            .ok_or(StoreError::ProductNotFound(id.0))
    }

    /// Repoint a product's current price, for price-freezing tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ProductNotFound`] for an unknown id.
    pub fn set_price(&self, id: ProductId, price_cents: i64) -> Result<()> {
        let mut tables = self.lock()?;
        let product = tables
            .products
            .get_mut(&id.0)
            .ok_or(StoreError::ProductNotFound(id.0))?;
        product.price_cents = price_cents;
        Ok(())
    }
}

impl Tables {
    fn product(&self, id: ProductId) -> Result<&Product> {
        self.products
            .get(&id.0)
            .ok_or(StoreError::ProductNotFound(id.0))
    }

    fn order(&self, id: OrderId) -> Result<&Order> {
        self.orders.get(&id.0).ok_or(StoreError::OrderNotFound)
    }

    fn lines_of(&self, id: OrderId) -> Vec<OrderLine> {
        self.order_lines
            .iter()
            .filter(|l| l.order_id == id)
            .cloned()
            .collect()
    }

    fn detail(&self, order: Order) -> Result<OrderDetail> {
        let lines = self
            .lines_of(order.id)
            .into_iter()
            .map(|line| {
                let product = self.product(line.product_id)?;
                Ok(OrderLineView {
                    product: product.summary(),
                    line,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(OrderDetail { order, lines })
    }

    /// Price and validate the requested items against current products.
    fn draft_lines(&self, items: &[OrderItemRequest]) -> Result<Vec<NewOrderLine>> {
        items
            .iter()
            .map(|item| {
                let product = self.product(item.product_id)?;
                product.ensure_orderable(item.quantity)?;
                Ok(NewOrderLine::for_product(product, item.quantity))
            })
            .collect()
    }

    fn decrement_stock(&mut self, lines: &[NewOrderLine]) -> Result<()> {
        // Validate everything before touching any row, so a failing line
        // leaves stock untouched (the lock makes the two phases atomic).
        for line in lines {
            let product = self.product(line.product_id)?;
            product.ensure_orderable(line.quantity)?;
        }
        for line in lines {
            if let Some(product) = self.products.get_mut(&line.product_id.0) {
                product.stock -= i32::try_from(line.quantity)
                    .map_err(|_| StoreError::Database("quantity overflow".to_string()))?;
            }
        }
        Ok(())
    }

    fn restock(&mut self, order_id: OrderId) -> Result<()> {
        let lines = self.lines_of(order_id);
        for line in lines {
            let quantity = i32::try_from(line.quantity)
                .map_err(|_| StoreError::Database("quantity overflow".to_string()))?;
            if let Some(product) = self.products.get_mut(&line.product_id.0) {
                product.stock += quantity;
            }
        }
        Ok(())
    }

    fn fresh_order_number(&self, now: DateTime<Utc>) -> Result<OrderNumber> {
        self.fresh_order_number_with(|| OrderNumber::generate(now))
    }

    fn fresh_order_number_with(&self, mut next: impl FnMut() -> OrderNumber) -> Result<OrderNumber> {
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let candidate = next();
            let taken = self.orders.values().any(|o| o.order_number == candidate);
            if !taken {
                return Ok(candidate);
            }
        }
        Err(StoreError::Conflict(
            "order number generation kept colliding".to_string(),
        ))
    }

    fn insert_order(
        &mut self,
        user_id: UserId,
        lines: Vec<NewOrderLine>,
        meta: &OrderMeta,
        stock_taken: bool,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let order_number = self.fresh_order_number(now)?;
        self.next_order_id += 1;
        let order = Order {
            id: OrderId(self.next_order_id),
            order_number,
            user_id,
            total_cents: total_of(&lines),
            shipping_address: meta.shipping_address.clone(),
            billing_address: meta.billing_address.clone(),
            payment_method: meta.payment_method.clone(),
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Pending,
            stock_taken,
            notes: meta.notes.clone(),
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        };
        for line in lines {
            self.next_order_line_id += 1;
            self.order_lines.push(OrderLine {
                id: self.next_order_line_id,
                order_id: order.id,
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
                subtotal_cents: line.subtotal_cents,
            });
        }
        self.orders.insert(order.id.0, order.clone());
        Ok(order)
    }

    fn cancel(&mut self, id: OrderId, now: DateTime<Utc>) -> Result<Order> {
        let order = self.order(id)?;
        order.status.ensure_transition(OrderStatus::Cancelled)?;
        let stock_taken = order.stock_taken;
        if stock_taken {
            self.restock(id)?;
        }
        let order = self
            .orders
            .get_mut(&id.0)
            .ok_or(StoreError::OrderNotFound)?;
        order.status = OrderStatus::Cancelled;
        order.stock_taken = false;
        order.cancelled_at = Some(now);
        order.updated_at = now;
        Ok(order.clone())
    }
}

fn paginate<T>(mut items: Vec<T>, page: Page) -> Paginated<T> {
    let total = items.len() as u64;
    let start = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let items = if start >= items.len() {
        Vec::new()
    } else {
        items.drain(start..).take(page.per_page as usize).collect()
    };
    Paginated {
        items,
        page: page.number,
        per_page: page.per_page,
        total,
    }
}

fn matches_order(order: &Order, filter: &OrderFilter) -> bool {
    if let Some(status) = filter.status {
        if order.status != status {
            return false;
        }
    }
    if let Some(payment_status) = filter.payment_status {
        if order.payment_status != payment_status {
            return false;
        }
    }
    if let Some(user_id) = filter.user_id {
        if order.user_id != user_id {
            return false;
        }
    }
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        if !order.order_number.as_str().to_lowercase().contains(&needle) {
            return false;
        }
    }
    true
}

impl ProductStore for MemoryStore {
    async fn list_products(&self, filter: &ProductFilter) -> Result<Paginated<Product>> {
        let tables = self.lock()?;
        let mut matching: Vec<Product> = tables
            .products
            .values()
            .filter(|p| {
                if filter.in_stock_only && p.stock <= 0 {
                    return false;
                }
                if let Some(min) = filter.min_price_cents {
                    if p.price_cents < min {
                        return false;
                    }
                }
                if let Some(max) = filter.max_price_cents {
                    if p.price_cents > max {
                        return false;
                    }
                }
                if let Some(search) = &filter.search {
                    let needle = search.to_lowercase();
                    let hit = p.name.to_lowercase().contains(&needle)
                        || p.sku.to_lowercase().contains(&needle)
                        || p.description
                            .as_deref()
                            .is_some_and(|d| d.to_lowercase().contains(&needle));
                    if !hit {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        Ok(paginate(matching, filter.page))
    }

    async fn find_product(&self, id: ProductId) -> Result<Product> {
        let tables = self.lock()?;
        tables.product(id).cloned()
    }

    async fn create_product(&self, new: NewProduct, now: DateTime<Utc>) -> Result<Product> {
        let mut tables = self.lock()?;
        tables.next_product_id += 1;
        let product = Product {
            id: ProductId(tables.next_product_id),
            name: new.name,
            sku: new.sku,
            description: new.description,
            price_cents: new.price_cents,
            old_price_cents: new.old_price_cents,
            stock: new.stock,
            available: new.available,
            category_id: new.category_id,
            image_url: new.image_url,
            created_at: now,
            updated_at: now,
        };
        tables.products.insert(product.id.0, product.clone());
        Ok(product)
    }
}

impl CartStore for MemoryStore {
    async fn cart_entries(&self, user_id: UserId) -> Result<Vec<CartEntry>> {
        let tables = self.lock()?;
        let mut lines: Vec<CartLine> = tables
            .cart_lines
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        lines.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        lines
            .into_iter()
            .map(|line| {
                let product = tables.product(line.product_id)?;
                Ok(CartEntry {
                    subtotal_cents: product.price_cents * i64::from(line.quantity),
                    product: product.summary(),
                    line,
                })
            })
            .collect()
    }

    async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<CartLine> {
        let mut tables = self.lock()?;
        let existing_id = tables
            .cart_lines
            .values()
            .find(|l| l.user_id == user_id && l.product_id == product_id)
            .map(|l| l.id);
        let merged = existing_id
            .and_then(|id| tables.cart_lines.get(&id.0))
            .map_or(0, |l| l.quantity)
            + quantity;
        tables.product(product_id)?.ensure_orderable(merged)?;

        if let Some(id) = existing_id {
            let line = tables
                .cart_lines
                .get_mut(&id.0)
                .ok_or(StoreError::CartLineNotFound)?;
            line.quantity = merged;
            line.updated_at = now;
            return Ok(line.clone());
        }
        tables.next_cart_line_id += 1;
        let line = CartLine {
            id: CartLineId(tables.next_cart_line_id),
            user_id,
            product_id,
            quantity,
            created_at: now,
            updated_at: now,
        };
        tables.cart_lines.insert(line.id.0, line.clone());
        Ok(line)
    }

    async fn set_cart_quantity(
        &self,
        user_id: UserId,
        line_id: CartLineId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<CartLine> {
        let mut tables = self.lock()?;
        let product_id = tables
            .cart_lines
            .get(&line_id.0)
            .filter(|l| l.user_id == user_id)
            .map(|l| l.product_id)
            .ok_or(StoreError::CartLineNotFound)?;
        tables.product(product_id)?.ensure_orderable(quantity)?;
        let line = tables
            .cart_lines
            .get_mut(&line_id.0)
            .ok_or(StoreError::CartLineNotFound)?;
        line.quantity = quantity;
        line.updated_at = now;
        Ok(line.clone())
    }

    async fn remove_cart_line(&self, user_id: UserId, line_id: CartLineId) -> Result<()> {
        let mut tables = self.lock()?;
        let owned = tables
            .cart_lines
            .get(&line_id.0)
            .is_some_and(|l| l.user_id == user_id);
        if !owned {
            return Err(StoreError::CartLineNotFound);
        }
        tables.cart_lines.remove(&line_id.0);
        Ok(())
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        let mut tables = self.lock()?;
        tables.cart_lines.retain(|_, l| l.user_id != user_id);
        Ok(())
    }
}

impl OrderStore for MemoryStore {
    async fn place_order_taking_stock(
        &self,
        user_id: UserId,
        items: &[OrderItemRequest],
        meta: &OrderMeta,
        now: DateTime<Utc>,
    ) -> Result<OrderDetail> {
        let mut tables = self.lock()?;
        let lines = tables.draft_lines(items)?;
        tables.decrement_stock(&lines)?;
        let order = tables.insert_order(user_id, lines, meta, true, now)?;
        tables.detail(order)
    }

    async fn place_order_from_cart(
        &self,
        user_id: UserId,
        meta: &OrderMeta,
        now: DateTime<Utc>,
    ) -> Result<OrderDetail> {
        let mut tables = self.lock()?;
        let mut cart: Vec<&CartLine> = tables
            .cart_lines
            .values()
            .filter(|l| l.user_id == user_id)
            .collect();
        if cart.is_empty() {
            return Err(StoreError::EmptyCart);
        }
        cart.sort_by_key(|l| l.id.0);
        let items: Vec<OrderItemRequest> = cart
            .iter()
            .map(|l| OrderItemRequest {
                product_id: l.product_id,
                quantity: l.quantity,
            })
            .collect();
        // Stock is validated but not taken; the decrement happens at payment
        // confirmation, and the cart stays in place until then.
        let lines = tables.draft_lines(&items)?;
        let order = tables.insert_order(user_id, lines, meta, false, now)?;
        tables.detail(order)
    }

    async fn mark_order_paid(&self, id: OrderId, now: DateTime<Utc>) -> Result<OrderDetail> {
        let mut tables = self.lock()?;
        let order = tables.order(id)?;
        if order.status == OrderStatus::Cancelled {
            return Err(StoreError::OrderCancelled);
        }
        if order.payment_status == PaymentStatus::Paid {
            return Err(StoreError::AlreadyPaid);
        }
        let user_id = order.user_id;
        let stock_taken = order.stock_taken;

        if !stock_taken {
            let lines: Vec<NewOrderLine> = tables
                .lines_of(id)
                .into_iter()
                .map(|l| NewOrderLine {
                    product_id: l.product_id,
                    quantity: l.quantity,
                    unit_price_cents: l.unit_price_cents,
                    subtotal_cents: l.subtotal_cents,
                })
                .collect();
            tables.decrement_stock(&lines)?;
        }

        let order = tables
            .orders
            .get_mut(&id.0)
            .ok_or(StoreError::OrderNotFound)?;
        order.payment_status = PaymentStatus::Paid;
        if order.status.can_transition_to(OrderStatus::Paid) {
            order.status = OrderStatus::Paid;
        }
        order.stock_taken = true;
        order.updated_at = now;
        let order = order.clone();
        tables.cart_lines.retain(|_, l| l.user_id != user_id);
        tables.detail(order)
    }

    async fn cancel_order(&self, id: OrderId, now: DateTime<Utc>) -> Result<Order> {
        let mut tables = self.lock()?;
        tables.cancel(id, now)
    }

    async fn update_order(
        &self,
        id: OrderId,
        update: &OrderUpdate,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let mut tables = self.lock()?;
        if let Some(to) = update.status {
            let current = tables.order(id)?.status;
            current.ensure_transition(to)?;
            if to == OrderStatus::Cancelled {
                tables.cancel(id, now)?;
            }
        }
        let order = tables
            .orders
            .get_mut(&id.0)
            .ok_or(StoreError::OrderNotFound)?;
        if let Some(to) = update.status {
            if to != OrderStatus::Cancelled {
                order.status = to;
            }
        }
        if let Some(payment_status) = update.payment_status {
            order.payment_status = payment_status;
        }
        if let Some(notes) = &update.notes {
            order.notes.clone_from(notes);
        }
        order.updated_at = now;
        Ok(order.clone())
    }

    async fn confirm_delivery(
        &self,
        id: OrderId,
        payment_received: bool,
        now: DateTime<Utc>,
    ) -> Result<Order> {
        let mut tables = self.lock()?;
        let current = tables.order(id)?.status;
        current.ensure_transition(OrderStatus::Delivered)?;
        let order = tables
            .orders
            .get_mut(&id.0)
            .ok_or(StoreError::OrderNotFound)?;
        order.status = OrderStatus::Delivered;
        if payment_received {
            order.payment_status = PaymentStatus::Paid;
        }
        order.updated_at = now;
        Ok(order.clone())
    }

    async fn bulk_update_status(
        &self,
        ids: &[OrderId],
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tables = self.lock()?;
        let mut updated = 0u64;
        for id in ids {
            let allowed = tables
                .orders
                .get(&id.0)
                .is_some_and(|o| o.status.can_transition_to(to));
            if !allowed {
                continue;
            }
            if let Some(order) = tables.orders.get_mut(&id.0) {
                order.status = to;
                order.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn find_order(&self, id: OrderId) -> Result<OrderDetail> {
        let tables = self.lock()?;
        let order = tables.order(id)?.clone();
        tables.detail(order)
    }

    async fn find_order_of_user(&self, user_id: UserId, id: OrderId) -> Result<OrderDetail> {
        let tables = self.lock()?;
        let order = tables.order(id)?;
        if order.user_id != user_id {
            return Err(StoreError::OrderNotFound);
        }
        let order = order.clone();
        tables.detail(order)
    }

    async fn orders_of_user(&self, user_id: UserId, page: Page) -> Result<Paginated<OrderDetail>> {
        let tables = self.lock()?;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        let page = paginate(orders, page);
        let items = page
            .items
            .into_iter()
            .map(|o| tables.detail(o))
            .collect::<Result<Vec<_>>>()?;
        Ok(Paginated {
            items,
            page: page.page,
            per_page: page.per_page,
            total: page.total,
        })
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Paginated<Order>> {
        let tables = self.lock()?;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| matches_order(o, filter))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        Ok(paginate(orders, filter.page))
    }

    async fn export_rows(&self, filter: &OrderFilter) -> Result<Vec<OrderExportRow>> {
        let tables = self.lock()?;
        let mut orders: Vec<&Order> = tables
            .orders
            .values()
            .filter(|o| matches_order(o, filter))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        let mut rows = Vec::new();
        for order in orders {
            let shipping = StoredAddress::from_column(&order.shipping_address).display_line();
            for line in tables.lines_of(order.id) {
                let product = tables.product(line.product_id)?;
                rows.push(OrderExportRow {
                    order_id: order.id.0,
                    order_number: order.order_number.as_str().to_string(),
                    created_at: order.created_at.to_rfc3339(),
                    status: order.status.as_str().to_string(),
                    payment_status: order.payment_status.as_str().to_string(),
                    payment_method: order.payment_method.clone(),
                    total_cents: order.total_cents,
                    user_id: order.user_id.0,
                    user_email: String::new(),
                    product_name: product.name.clone(),
                    product_sku: product.sku.clone(),
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price_cents,
                    subtotal_cents: line.subtotal_cents,
                    shipping_address: shipping.clone(),
                });
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn order_numbered(id: i64, number: &str) -> Order {
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        Order {
            id: OrderId(id),
            order_number: OrderNumber(number.to_string()),
            user_id: UserId(1),
            total_cents: 1000,
            shipping_address: "1 Main St".to_string(),
            billing_address: "1 Main St".to_string(),
            payment_method: "COD".to_string(),
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Pending,
            stock_taken: true,
            notes: None,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        }
    }

    #[test]
    fn order_number_retries_past_a_collision() {
        let mut tables = Tables::default();
        tables.orders.insert(1, order_numbered(1, "ORD-1-AAAAAA"));

        let mut candidates = ["ORD-1-AAAAAA", "ORD-1-AAAAAA", "ORD-1-BBBBBB"].into_iter();
        let number = tables
            .fresh_order_number_with(|| OrderNumber(candidates.next().unwrap().to_string()))
            .unwrap();
        assert_eq!(number.as_str(), "ORD-1-BBBBBB");
    }

    #[test]
    fn order_number_exhaustion_is_a_conflict() {
        let mut tables = Tables::default();
        tables.orders.insert(1, order_numbered(1, "ORD-1-AAAAAA"));

        let err = tables
            .fresh_order_number_with(|| OrderNumber("ORD-1-AAAAAA".to_string()))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
