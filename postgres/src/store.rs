//! `PostgresStore`: products and cart lines.

use crate::rows::{db_err, row_to_cart_line, row_to_product, to_i32};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use storefront_core::{
    CartEntry, CartLine, CartLineId, CartStore, NewProduct, Page, Paginated, Product,
    ProductFilter, ProductId, ProductStore, Result, StoreError, UserId,
};

/// PostgreSQL implementation of the store traits.
///
/// Every multi-row operation runs inside one transaction; product rows that
/// are about to be checked-then-written are locked with `SELECT ... FOR
/// UPDATE` so the stock rules hold under concurrency.
#[derive(Clone)]
pub struct PostgresStore {
    pub(crate) pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database and run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection or a migration
    /// fails.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(db_err)
    }
}

/// Lock a product row for the remainder of the transaction.
pub(crate) async fn product_for_update(
    tx: &mut Transaction<'static, Postgres>,
    id: ProductId,
) -> Result<Product> {
    let row = sqlx::query("SELECT * FROM products WHERE id = $1 FOR UPDATE")
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?
        .ok_or(StoreError::ProductNotFound(id.0))?;
    row_to_product(&row)
}

/// Conditionally decrement a product's stock; fails with
/// [`StoreError::InsufficientStock`] when the product no longer has
/// `quantity` units.
pub(crate) async fn decrement_stock(
    tx: &mut Transaction<'static, Postgres>,
    id: ProductId,
    quantity: u32,
    now: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        r"
        UPDATE products
        SET stock = stock - $2, updated_at = $3
        WHERE id = $1 AND stock >= $2
        ",
    )
    .bind(id.0)
    .bind(to_i32(quantity)?)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;

    if result.rows_affected() == 0 {
        metrics::counter!("store_stock_conflicts_total").increment(1);
        let product = product_for_update(tx, id).await?;
        return Err(StoreError::InsufficientStock {
            name: product.name,
            available: product.stock,
        });
    }
    Ok(())
}

impl ProductStore for PostgresStore {
    async fn list_products(&self, filter: &ProductFilter) -> Result<Paginated<Product>> {
        let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let where_clause = r"
            ($1::text IS NULL
                OR name ILIKE '%' || $1 || '%'
                OR sku ILIKE '%' || $1 || '%'
                OR description ILIKE '%' || $1 || '%')
            AND (NOT $2 OR stock > 0)
            AND ($3::bigint IS NULL OR price_cents >= $3)
            AND ($4::bigint IS NULL OR price_cents <= $4)
        ";

        let count: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM products WHERE {where_clause}"
        ))
        .bind(search)
        .bind(filter.in_stock_only)
        .bind(filter.min_price_cents)
        .bind(filter.max_price_cents)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let rows = sqlx::query(&format!(
            r"
            SELECT * FROM products
            WHERE {where_clause}
            ORDER BY created_at DESC, id DESC
            LIMIT $5 OFFSET $6
            "
        ))
        .bind(search)
        .bind(filter.in_stock_only)
        .bind(filter.min_price_cents)
        .bind(filter.max_price_cents)
        .bind(i64::from(filter.page.per_page))
        .bind(i64::try_from(filter.page.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let items = rows.iter().map(row_to_product).collect::<Result<Vec<_>>>()?;
        Ok(Paginated {
            items,
            page: filter.page.number,
            per_page: filter.page.per_page,
            total: u64::try_from(count.0).unwrap_or(0),
        })
    }

    async fn find_product(&self, id: ProductId) -> Result<Product> {
        let row = sqlx::query("SELECT * FROM products WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::ProductNotFound(id.0))?;
        row_to_product(&row)
    }

    async fn create_product(&self, new: NewProduct, now: DateTime<Utc>) -> Result<Product> {
        let row = sqlx::query(
            r"
            INSERT INTO products (
                name, sku, description, price_cents, old_price_cents,
                stock, available, category_id, image_url, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING *
            ",
        )
        .bind(&new.name)
        .bind(&new.sku)
        .bind(&new.description)
        .bind(new.price_cents)
        .bind(new.old_price_cents)
        .bind(new.stock)
        .bind(new.available)
        .bind(new.category_id.map(|c| c.0))
        .bind(&new.image_url)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        row_to_product(&row)
    }
}

impl CartStore for PostgresStore {
    async fn cart_entries(&self, user_id: UserId) -> Result<Vec<CartEntry>> {
        let rows = sqlx::query(
            r"
            SELECT c.id, c.user_id, c.product_id, c.quantity,
                   c.created_at, c.updated_at,
                   p.id AS p_id, p.name, p.sku, p.description, p.price_cents,
                   p.old_price_cents, p.stock, p.available, p.category_id,
                   p.image_url, p.created_at AS p_created_at,
                   p.updated_at AS p_updated_at
            FROM cart_lines c
            JOIN products p ON p.id = c.product_id
            WHERE c.user_id = $1
            ORDER BY c.created_at DESC, c.id DESC
            ",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let line = row_to_cart_line(row)?;
                let price_cents: i64 = row.try_get("price_cents").map_err(db_err)?;
                let product = storefront_core::ProductSummary {
                    id: line.product_id,
                    name: row.try_get("name").map_err(db_err)?,
                    sku: row.try_get("sku").map_err(db_err)?,
                    price_cents,
                    old_price_cents: row.try_get("old_price_cents").map_err(db_err)?,
                    image_url: row.try_get("image_url").map_err(db_err)?,
                    stock: row.try_get("stock").map_err(db_err)?,
                };
                Ok(CartEntry {
                    subtotal_cents: price_cents * i64::from(line.quantity),
                    product,
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
        let mut tx = self.begin().await?;
        let product = product_for_update(&mut tx, product_id).await?;

        let existing: Option<i32> = sqlx::query(
            "SELECT quantity FROM cart_lines WHERE user_id = $1 AND product_id = $2 FOR UPDATE",
        )
        .bind(user_id.0)
        .bind(product_id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .map(|row| row.try_get("quantity"))
        .transpose()
        .map_err(db_err)?;

        let merged = crate::rows::to_u32(existing.unwrap_or(0))? + quantity;
        product.ensure_orderable(merged)?;

        let row = sqlx::query(
            r"
            INSERT INTO cart_lines (user_id, product_id, quantity, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (user_id, product_id)
            DO UPDATE SET quantity = $3, updated_at = $4
            RETURNING *
            ",
        )
        .bind(user_id.0)
        .bind(product_id.0)
        .bind(to_i32(merged)?)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        row_to_cart_line(&row)
    }

    async fn set_cart_quantity(
        &self,
        user_id: UserId,
        line_id: CartLineId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<CartLine> {
        let mut tx = self.begin().await?;
        let line = sqlx::query("SELECT * FROM cart_lines WHERE id = $1 AND user_id = $2 FOR UPDATE")
            .bind(line_id.0)
            .bind(user_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or(StoreError::CartLineNotFound)?;
        let line = row_to_cart_line(&line)?;

        let product = product_for_update(&mut tx, line.product_id).await?;
        product.ensure_orderable(quantity)?;

        let row = sqlx::query(
            "UPDATE cart_lines SET quantity = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(line_id.0)
        .bind(to_i32(quantity)?)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        row_to_cart_line(&row)
    }

    async fn remove_cart_line(&self, user_id: UserId, line_id: CartLineId) -> Result<()> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE id = $1 AND user_id = $2")
            .bind(line_id.0)
            .bind(user_id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::CartLineNotFound);
        }
        Ok(())
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM cart_lines WHERE user_id = $1")
            .bind(user_id.0)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

/// Paginate a counted listing.
pub(crate) fn paginated<T>(items: Vec<T>, page: Page, total: i64) -> Paginated<T> {
    Paginated {
        items,
        page: page.number,
        per_page: page.per_page,
        total: u64::try_from(total).unwrap_or(0),
    }
}
