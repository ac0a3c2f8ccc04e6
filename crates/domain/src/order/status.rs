//! Order status state machine.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// PendingPayment ──► Processing ──► Shipped ──► Delivered
///      │   │             │             │            │
///      │   │             └─────────────┴────────────┴──► Refunded
///      │   └──► PaymentFailed
///      │             │
///      └─────────────┴──(also Processing)──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order persisted, waiting for payment confirmation. The only initial status.
    #[default]
    PendingPayment,

    /// Payment confirmed, order is being fulfilled.
    Processing,

    /// Handed to the carrier.
    Shipped,

    /// Received by the customer (terminal for fulfillment).
    Delivered,

    /// The gateway denied the payment.
    PaymentFailed,

    /// Cancelled before shipping (terminal).
    Cancelled,

    /// Money returned to the customer (terminal).
    Refunded,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::PendingPayment,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::PaymentFailed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    /// Returns the statuses this status may move to.
    pub fn allowed_next(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            PendingPayment => &[Processing, PaymentFailed, Cancelled],
            Processing => &[Shipped, Cancelled, Refunded],
            Shipped => &[Delivered, Refunded],
            Delivered => &[Refunded],
            PaymentFailed => &[Cancelled],
            Cancelled | Refunded => &[],
        }
    }

    /// Returns true if the transition table allows moving to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    /// Checks a transition against the table.
    pub fn transition_to(&self, next: OrderStatus) -> Result<OrderStatus, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidOrderTransition {
                from: *self,
                to: next,
            })
        }
    }

    /// Returns every status from which `target` is reachable in one step.
    ///
    /// Used as the allowed-from set of a conditional status update.
    pub fn predecessors_of(target: OrderStatus) -> Vec<OrderStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(target))
            .collect()
    }

    /// Returns true if the order has not yet left the warehouse.
    pub fn is_pre_shipment(&self) -> bool {
        matches!(
            self,
            OrderStatus::PendingPayment | OrderStatus::Processing | OrderStatus::PaymentFailed
        )
    }

    /// Returns true if this is a terminal status.
    ///
    /// `Delivered` still admits a refund; see [`OrderStatus::allowed_next`].
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    /// Returns the status name as stored and sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::PaymentFailed => "payment_failed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownOrderStatus(s.to_string()))
    }
}
