//! Order and order line entities.

use chrono::{DateTime, Utc};
use common::{AddressId, Money, OrderId, OrderItemId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::OrderStatus;
use crate::error::DomainError;

/// A persisted order.
///
/// `total_amount` is a point-in-time snapshot taken at checkout and is never
/// recomputed from the items afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// `None` for guest checkout.
    pub user_id: Option<UserId>,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub shipping_address_id: AddressId,
    pub billing_address_id: AddressId,
    pub shipping_method: Option<String>,
    pub tracking_number: Option<String>,
    pub customer_notes: Option<String>,
    /// Correspondence address, required for guest checkout.
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Returns true if the given user owns this order.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == Some(user_id)
    }
}

/// A single order line. The price is captured at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price_at_purchase: Money,
}

impl OrderItem {
    /// Creates a new line for an order.
    pub fn new(
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
        price_at_purchase: Money,
    ) -> Self {
        Self {
            id: OrderItemId::new(),
            order_id,
            product_id,
            quantity,
            price_at_purchase,
        }
    }

    /// Returns the total price for this line (quantity * price_at_purchase).
    pub fn line_total(&self) -> Result<Money, DomainError> {
        self.price_at_purchase
            .checked_mul(self.quantity)
            .ok_or(DomainError::AmountOverflow)
    }

    /// Sums the line totals of a set of items.
    pub fn total_of(items: &[OrderItem]) -> Result<Money, DomainError> {
        items.iter().try_fold(Money::zero(), |total, item| {
            total
                .checked_add(item.line_total()?)
                .ok_or(DomainError::AmountOverflow)
        })
    }
}
