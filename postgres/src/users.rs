//! User directory backed by the `users` table.
//!
//! Identity management lives upstream; this is a read-only lookup used for
//! admin views and the CSV export. Wrap it in
//! [`storefront_core::CachedUserDirectory`] to avoid re-reading hot rows.

use crate::rows::db_err;
use crate::store::PostgresStore;
use sqlx::Row;
use storefront_core::{Result, StoreError, UserDirectory, UserId, UserRecord};

/// Read-only Postgres user lookup.
#[derive(Clone)]
pub struct PgUserDirectory {
    store: PostgresStore,
}

impl PgUserDirectory {
    /// Directory over the store's pool.
    #[must_use]
    pub const fn new(store: PostgresStore) -> Self {
        Self { store }
    }
}

impl UserDirectory for PgUserDirectory {
    async fn find_user(&self, id: UserId) -> Result<UserRecord> {
        let row = sqlx::query("SELECT id, email, name, is_admin FROM users WHERE id = $1")
            .bind(id.0)
            .fetch_optional(self.store.pool())
            .await
            .map_err(db_err)?
            .ok_or(StoreError::UserNotFound)?;
        Ok(UserRecord {
            id: UserId(row.try_get("id").map_err(db_err)?),
            email: row.try_get("email").map_err(db_err)?,
            name: row.try_get("name").map_err(db_err)?,
            is_admin: row.try_get("is_admin").map_err(db_err)?,
        })
    }
}
