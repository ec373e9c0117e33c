//! HTTP request handlers, organized by surface: public catalog, customer
//! cart and orders, and the admin back office.

pub mod admin;
pub mod cart;
pub mod health;
pub mod orders;
pub mod products;

pub use health::health_check;
