//! Transactional persistence for the checkout pipeline.
//!
//! Every write performed by checkout goes through a [`StoreTransaction`]
//! opened with [`Store::begin`]. A transaction that is dropped or rolled back
//! leaves no trace; only [`StoreTransaction::commit`] publishes its writes.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use store::{
    AddressRepository, CartRepository, InventoryRepository, OrderRepository, PaymentRepository,
    Store, StoreTransaction,
};
