//! Domain layer for the checkout pipeline.
//!
//! This crate provides the entities persisted by the checkout core and the
//! rules that govern them:
//! - Order and OrderItem, with the order status transition table
//! - Payment, with the payment status transition table
//! - Address and the `AddressInput` variant accepted at checkout
//! - Product and CartLine, read from external collaborators

pub mod address;
pub mod catalog;
pub mod error;
pub mod order;
pub mod payment;

pub use address::{Address, AddressFields, AddressInput, AddressKind, NewAddress};
pub use catalog::{CartLine, Product};
pub use common::{AddressId, Money, OrderId, OrderItemId, PaymentId, ProductId, UserId};
pub use error::DomainError;
pub use order::{Order, OrderItem, OrderStatus};
pub use payment::{Payment, PaymentStatus};
