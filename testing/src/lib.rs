//! Test doubles for the storefront providers.
//!
//! The centerpiece is [`MemoryStore`], a full in-memory implementation of
//! the store traits with the same atomicity contract as the Postgres
//! backend. Together with [`FixedClock`], [`StaticUserDirectory`], and
//! [`InstantGateway`] it lets service-level tests exercise the complete
//! order lifecycle with no database and no sleeps.

mod memory;
mod mocks;

pub use memory::MemoryStore;
pub use mocks::{FixedClock, InstantGateway, StaticUserDirectory};
