//! Provider traits: the seams between the checkout orchestration and its
//! backends.
//!
//! Each trait documents its error contract; implementations live in the
//! `storefront-postgres` crate (production) and `storefront-testing`
//! (in-memory). The store traits carry whole transactional operations rather
//! than row-level primitives so that atomicity is an implementation contract
//! a backend cannot accidentally break from the outside.

mod payment;
mod store;

pub use payment::{PaymentDetails, PaymentGateway, PaymentOutcome, PaymentReceipt};
pub use store::{CartStore, OrderStore, ProductStore};
