//! Storefront core: domain model, order state machine, and checkout
//! orchestration.
//!
//! The crate is organized around three layers:
//!
//! - **Domain model** ([`product`], [`cart`], [`order`], [`address`]): plain
//!   records with the business rules that must hold in every backend —
//!   stock checks, the order status transition table, price freezing,
//!   address validation. Money is integer cents throughout.
//! - **Provider traits** ([`providers`], [`users`], [`clock`]): the seams to
//!   storage, payments, user data, and time. Store traits carry whole
//!   transactional operations, so atomicity is part of the contract rather
//!   than something callers must remember to arrange.
//! - **Orchestration** ([`checkout`]): [`CheckoutService`] wires the
//!   providers into the order lifecycle — cart, placement, payment
//!   confirmation, cancellation with restock, fulfillment, and the admin
//!   operations.
//!
//! # Example
//!
//! ```no_run
//! use storefront_core::{CheckoutService, PlaceOrderRequest, Address};
//! use storefront_core::{OrderItemRequest, ProductId, UserId, SystemClock};
//!
//! # async fn run<S, G, D>(store: S, gateway: G, users: D) -> storefront_core::Result<()>
//! # where
//! #     S: storefront_core::ProductStore
//! #         + storefront_core::CartStore
//! #         + storefront_core::OrderStore,
//! #     G: storefront_core::PaymentGateway,
//! #     D: storefront_core::UserDirectory,
//! # {
//! let service = CheckoutService::new(store, gateway, users, SystemClock);
//! let order = service
//!     .place_cod_order(
//!         UserId(1),
//!         PlaceOrderRequest {
//!             items: vec![OrderItemRequest { product_id: ProductId(1), quantity: 2 }],
//!             shipping_address: Address::Raw("1 Main St, Springfield".into()),
//!             billing_address: None,
//!             phone: None,
//!             notes: None,
//!         },
//!     )
//!     .await?;
//! println!("placed {}", order.order.order_number);
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod cart;
pub mod checkout;
pub mod clock;
pub mod error;
pub mod order;
pub mod product;
pub mod providers;
pub mod users;

pub use address::{Address, StoredAddress, StructuredAddress};
pub use cart::{CartEntry, CartLine, CartLineId, CartView};
pub use checkout::{
    CheckoutRequest, CheckoutService, PaymentConfirmation, PlaceOrderRequest, COD_METHOD,
};
pub use clock::{Clock, SystemClock};
pub use error::{Result, StoreError};
pub use order::{
    NewOrderLine, Order, OrderDetail, OrderExportRow, OrderFilter, OrderId, OrderItemRequest,
    OrderLine, OrderLineView, OrderMeta, OrderNumber, OrderStatus, OrderUpdate, PaymentStatus,
};
pub use product::{
    CategoryId, NewProduct, Page, Paginated, Product, ProductFilter, ProductId, ProductSummary,
};
pub use providers::{
    CartStore, OrderStore, PaymentDetails, PaymentGateway, PaymentOutcome, PaymentReceipt,
    ProductStore,
};
pub use users::{CachedUserDirectory, UserCacheConfig, UserDirectory, UserId, UserRecord};
