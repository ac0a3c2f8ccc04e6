use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{AddressId, OrderId, ProductId, UserId};
use domain::{
    Address, CartLine, NewAddress, Order, OrderItem, OrderStatus, Payment, PaymentStatus, Product,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Result, StoreError,
    store::{
        AddressRepository, CartRepository, InventoryRepository, OrderRepository,
        PaymentRepository, Store, StoreTransaction,
    },
};

#[derive(Debug, Clone, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    addresses: HashMap<AddressId, Address>,
    carts: HashMap<UserId, Vec<CartLine>>,
    orders: HashMap<OrderId, Order>,
    order_items: Vec<OrderItem>,
    payments: Vec<Payment>,
}

/// In-memory store implementation for testing and local runs.
///
/// A transaction holds the table lock for its whole lifetime and works on a
/// private copy, so transactions are fully serialized and a dropped
/// transaction leaves the tables untouched.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a catalog product.
    pub async fn put_product(&self, product: Product) {
        self.tables
            .lock()
            .await
            .products
            .insert(product.id, product);
    }

    /// Returns the current stock of a product.
    pub async fn stock_of(&self, id: ProductId) -> Option<i64> {
        self.tables
            .lock()
            .await
            .products
            .get(&id)
            .map(|p| p.stock_quantity)
    }

    /// Replaces a user's cart.
    pub async fn set_cart(&self, user_id: UserId, lines: Vec<CartLine>) {
        self.tables.lock().await.carts.insert(user_id, lines);
    }

    /// Returns a user's cart lines.
    pub async fn cart(&self, user_id: UserId) -> Vec<CartLine> {
        self.tables
            .lock()
            .await
            .carts
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Inserts an address outside of checkout, as the address book would.
    pub async fn put_address(&self, address: NewAddress) -> Address {
        let mut tables = self.tables.lock().await;
        insert_address(&mut tables, address)
    }

    pub async fn address_count(&self) -> usize {
        self.tables.lock().await.addresses.len()
    }

    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    pub async fn order_item_count(&self) -> usize {
        self.tables.lock().await.order_items.len()
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.tables.lock().await.orders.values().cloned().collect()
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.tables.lock().await.payments.clone()
    }
}

fn insert_address(tables: &mut Tables, address: NewAddress) -> Address {
    if address.is_default && address.user_id.is_some() {
        for existing in tables.addresses.values_mut() {
            if existing.user_id == address.user_id && existing.kind == address.kind {
                existing.is_default = false;
            }
        }
    }

    let stored = address.into_address(AddressId::new(), Utc::now());
    tables.addresses.insert(stored.id, stored.clone());
    stored
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTransaction { guard, working })
    }
}

/// A transaction over [`InMemoryStore`].
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl InventoryRepository for InMemoryTransaction {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn decrement_stock(&mut self, id: ProductId, quantity: u32) -> Result<bool> {
        let quantity = i64::from(quantity);
        match self.working.products.get_mut(&id) {
            Some(product) if product.stock_quantity >= quantity => {
                product.stock_quantity -= quantity;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl AddressRepository for InMemoryTransaction {
    async fn address(&mut self, id: AddressId) -> Result<Option<Address>> {
        Ok(self.working.addresses.get(&id).cloned())
    }

    async fn insert_address(&mut self, address: NewAddress) -> Result<Address> {
        Ok(insert_address(&mut self.working, address))
    }
}

#[async_trait]
impl CartRepository for InMemoryTransaction {
    async fn cart_lines(&mut self, user_id: UserId) -> Result<Vec<CartLine>> {
        Ok(self
            .working
            .carts
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear_cart(&mut self, user_id: UserId) -> Result<()> {
        self.working.carts.remove(&user_id);
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryTransaction {
    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        for address_id in [order.shipping_address_id, order.billing_address_id] {
            if !self.working.addresses.contains_key(&address_id) {
                return Err(StoreError::InvalidData(format!(
                    "order {} references unknown address {address_id}",
                    order.id
                )));
            }
        }
        if self.working.orders.contains_key(&order.id) {
            return Err(StoreError::InvalidData(format!(
                "order {} already exists",
                order.id
            )));
        }
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn insert_order_items(&mut self, items: &[OrderItem]) -> Result<()> {
        for item in items {
            if !self.working.orders.contains_key(&item.order_id) {
                return Err(StoreError::InvalidData(format!(
                    "order item {} references unknown order {}",
                    item.id, item.order_id
                )));
            }
            if item.quantity == 0 {
                return Err(StoreError::InvalidData(format!(
                    "order item {} has zero quantity",
                    item.id
                )));
            }
        }
        self.working.order_items.extend_from_slice(items);
        Ok(())
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn order_items(&mut self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        Ok(self
            .working
            .order_items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn transition_order_status(
        &mut self,
        id: OrderId,
        allowed_from: &[OrderStatus],
        to: OrderStatus,
        tracking_number: Option<&str>,
    ) -> Result<bool> {
        match self.working.orders.get_mut(&id) {
            Some(order) if allowed_from.contains(&order.status) => {
                order.status = to;
                if let Some(tracking) = tracking_number {
                    order.tracking_number = Some(tracking.to_string());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl PaymentRepository for InMemoryTransaction {
    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        if !self.working.orders.contains_key(&payment.order_id) {
            return Err(StoreError::InvalidData(format!(
                "payment {} references unknown order {}",
                payment.id, payment.order_id
            )));
        }
        if self
            .working
            .payments
            .iter()
            .any(|p| p.transaction_id == payment.transaction_id)
        {
            return Err(StoreError::DuplicateTransactionId(
                payment.transaction_id.clone(),
            ));
        }
        self.working.payments.push(payment.clone());
        Ok(())
    }

    async fn payment_by_transaction_id(
        &mut self,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        Ok(self
            .working
            .payments
            .iter()
            .find(|p| p.transaction_id == transaction_id)
            .cloned())
    }

    async fn payments_for_order(&mut self, order_id: OrderId) -> Result<Vec<Payment>> {
        let mut payments: Vec<_> = self
            .working
            .payments
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn transition_payment_status(
        &mut self,
        transaction_id: &str,
        allowed_from: &[PaymentStatus],
        to: PaymentStatus,
        gateway_response: Option<&serde_json::Value>,
    ) -> Result<bool> {
        let payment = self
            .working
            .payments
            .iter_mut()
            .find(|p| p.transaction_id == transaction_id);

        match payment {
            Some(payment) if allowed_from.contains(&payment.status) => {
                payment.status = to;
                if let Some(response) = gateway_response {
                    payment.gateway_response = Some(response.clone());
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn commit(mut self) -> Result<()> {
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
