//! Order reads and administrative status changes.

use common::OrderId;
use domain::{Order, OrderItem, OrderStatus, Payment};
use serde::Serialize;
use store::{OrderRepository, PaymentRepository, Store, StoreTransaction};

use crate::error::{CheckoutError, Result};

/// An order with its lines and payment attempts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
}

/// Read and status-update access to orders.
pub struct OrderService<S: Store> {
    store: S,
}

impl<S: Store> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Loads an order with its items and payments.
    pub async fn order_details(&self, order_id: OrderId) -> Result<OrderDetails> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Order", order_id))?;
        let items = tx.order_items(order_id).await?;
        let payments = tx.payments_for_order(order_id).await?;
        tx.rollback().await?;

        Ok(OrderDetails {
            order,
            items,
            payments,
        })
    }

    /// Moves an order to `status`, optionally recording a tracking number.
    ///
    /// The change is checked against the transition table and applied with a
    /// conditional update on the status that was read, so two racing updates
    /// cannot both win.
    #[tracing::instrument(skip(self, tracking_number))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        status: &str,
        tracking_number: Option<String>,
    ) -> Result<Order> {
        let target: OrderStatus = status.parse()?;
        let tracking_number = tracking_number
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let mut tx = self.store.begin().await?;
        let current = tx
            .order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Order", order_id))?;
        current.status.transition_to(target)?;

        let applied = tx
            .transition_order_status(
                order_id,
                &[current.status],
                target,
                tracking_number.as_deref(),
            )
            .await?;
        if !applied {
            // Someone else moved the order between our read and write.
            let from = tx
                .order(order_id)
                .await?
                .map(|o| o.status)
                .unwrap_or(current.status);
            tx.rollback().await?;
            return Err(CheckoutError::InvalidTransition { from, to: target });
        }

        let updated = tx
            .order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Order", order_id))?;
        tx.commit().await?;

        metrics::counter!("order_status_updates_total").increment(1);
        tracing::info!(%order_id, from = %current.status, to = %target, "order status updated");

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::{Money, UserId};
    use domain::{AddressFields, AddressKind, NewAddress};
    use store::InMemoryStore;

    use super::*;

    async fn seeded_order(store: &InMemoryStore, status: OrderStatus) -> OrderId {
        let address = store
            .put_address(NewAddress {
                user_id: None,
                kind: AddressKind::Shipping,
                fields: AddressFields {
                    full_name: "Grace Hopper".to_string(),
                    line1: "1 Navy Way".to_string(),
                    city: "Arlington".to_string(),
                    postal_code: "22202".to_string(),
                    country: "US".to_string(),
                    ..AddressFields::default()
                },
                is_default: false,
            })
            .await;

        let order = Order {
            id: OrderId::new(),
            user_id: Some(UserId::new()),
            status,
            total_amount: Money::from_cents(1000),
            shipping_address_id: address.id,
            billing_address_id: address.id,
            shipping_method: None,
            tracking_number: None,
            customer_notes: None,
            email: None,
            created_at: Utc::now(),
        };
        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();
        order.id
    }

    #[tokio::test]
    async fn test_ship_with_tracking_number() {
        let store = InMemoryStore::new();
        let order_id = seeded_order(&store, OrderStatus::Processing).await;
        let service = OrderService::new(store);

        let order = service
            .update_status(order_id, "shipped", Some("1Z999".to_string()))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Shipped);
        assert_eq!(order.tracking_number.as_deref(), Some("1Z999"));
    }

    #[tokio::test]
    async fn test_rejects_illegal_transition() {
        let store = InMemoryStore::new();
        let order_id = seeded_order(&store, OrderStatus::PendingPayment).await;
        let service = OrderService::new(store);

        let err = service
            .update_status(order_id, "delivered", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InvalidTransition {
                from: OrderStatus::PendingPayment,
                to: OrderStatus::Delivered
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_status_is_validation_error() {
        let store = InMemoryStore::new();
        let order_id = seeded_order(&store, OrderStatus::Processing).await;
        let service = OrderService::new(store);

        let err = service
            .update_status(order_id, "teleported", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_order_is_not_found() {
        let service = OrderService::new(InMemoryStore::new());
        let err = service
            .update_status(OrderId::new(), "shipped", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound { .. }));

        let err = service.order_details(OrderId::new()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_order_details_flattens_order() {
        let store = InMemoryStore::new();
        let order_id = seeded_order(&store, OrderStatus::Processing).await;
        let details = OrderService::new(store)
            .order_details(order_id)
            .await
            .unwrap();

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["total_amount"], 1000);
        assert!(json["items"].as_array().unwrap().is_empty());
    }
}
