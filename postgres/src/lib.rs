//! `PostgreSQL` store backend for Storefront.
//!
//! Implements the `storefront-core` store traits on a `sqlx` connection
//! pool. Queries are runtime-bound (`sqlx::query` + `.bind()`), so the crate
//! builds without a live database. Invariants the schema cannot express on
//! its own are enforced in the operations:
//!
//! - stock decrements are conditional (`... WHERE stock >= $q`) with the
//!   affected-row count checked, so concurrent orders cannot drive stock
//!   negative;
//! - every multi-row operation (placement, settlement, cancellation with
//!   restock) is one transaction;
//! - order status writes are guarded by the state machine's transition
//!   table.
//!
//! # Example
//!
//! ```no_run
//! use storefront_postgres::PostgresStore;
//!
//! # async fn example() -> storefront_core::Result<()> {
//! let store = PostgresStore::connect("postgres://localhost/storefront").await?;
//! # Ok(())
//! # }
//! ```

mod orders;
mod rows;
mod store;
mod users;

pub use store::PostgresStore;
pub use users::PgUserDirectory;
