use async_trait::async_trait;
use common::{AddressId, OrderId, ProductId, UserId};
use domain::{
    Address, CartLine, NewAddress, Order, OrderItem, OrderStatus, Payment, PaymentStatus, Product,
};

use crate::Result;

/// Stock access used by the inventory ledger.
#[async_trait]
pub trait InventoryRepository: Send {
    /// Loads a product by id.
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Decrements stock by `quantity` if at least that much is available.
    ///
    /// This is a single conditional update, never a read followed by a
    /// write. Returns `false` (and changes nothing) when stock is
    /// insufficient or the product does not exist.
    async fn decrement_stock(&mut self, id: ProductId, quantity: u32) -> Result<bool>;
}

/// Address access used by the address resolver.
#[async_trait]
pub trait AddressRepository: Send {
    async fn address(&mut self, id: AddressId) -> Result<Option<Address>>;

    /// Inserts an address. A default address clears the default flag of the
    /// owner's other addresses of the same kind.
    async fn insert_address(&mut self, address: NewAddress) -> Result<Address>;
}

/// Cart snapshot reader and mutator.
#[async_trait]
pub trait CartRepository: Send {
    async fn cart_lines(&mut self, user_id: UserId) -> Result<Vec<CartLine>>;

    async fn clear_cart(&mut self, user_id: UserId) -> Result<()>;
}

#[async_trait]
pub trait OrderRepository: Send {
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    async fn insert_order_items(&mut self, items: &[OrderItem]) -> Result<()>;

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>>;

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    /// Moves an order to `to` only if its current status is one of
    /// `allowed_from`, optionally recording a tracking number.
    ///
    /// Returns `false` when the order is missing or in another status.
    async fn transition_order_status(
        &mut self,
        id: OrderId,
        allowed_from: &[OrderStatus],
        to: OrderStatus,
        tracking_number: Option<&str>,
    ) -> Result<bool>;
}

#[async_trait]
pub trait PaymentRepository: Send {
    /// Inserts a payment. Fails with `DuplicateTransactionId` if the
    /// transaction id is already recorded.
    async fn insert_payment(&mut self, payment: &Payment) -> Result<()>;

    async fn payment_by_transaction_id(&mut self, transaction_id: &str)
    -> Result<Option<Payment>>;

    async fn payments_for_order(&mut self, order_id: OrderId) -> Result<Vec<Payment>>;

    /// Compare-and-set on payment status, keyed by transaction id.
    ///
    /// Replaces `gateway_response` when one is given. Returns `false` when the
    /// payment is missing or not in one of `allowed_from`.
    async fn transition_payment_status(
        &mut self,
        transaction_id: &str,
        allowed_from: &[PaymentStatus],
        to: PaymentStatus,
        gateway_response: Option<&serde_json::Value>,
    ) -> Result<bool>;
}

/// An open unit of work over every repository.
///
/// Nothing written through a transaction is visible to others until
/// [`StoreTransaction::commit`] succeeds. Dropping the transaction rolls it
/// back.
#[async_trait]
pub trait StoreTransaction:
    InventoryRepository
    + AddressRepository
    + CartRepository
    + OrderRepository
    + PaymentRepository
    + Sized
    + Send
{
    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}

/// Core trait for store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    type Tx: StoreTransaction;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;
}
