//! Payment entity and its status state machine.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of a payment attempt.
///
/// ```text
/// Pending ──► Succeeded ──► Refunded
///    │  ▲         ▲
///    │  └ Failed ─┘
///    └──────────────────► Refunded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [
        PaymentStatus::Pending,
        PaymentStatus::Succeeded,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
    ];

    /// Returns the statuses this status may move to.
    ///
    /// A failed capture can still complete later when the gateway retries it.
    pub fn allowed_next(&self) -> &'static [PaymentStatus] {
        use PaymentStatus::*;
        match self {
            Pending => &[Succeeded, Failed, Refunded],
            Failed => &[Succeeded],
            Succeeded => &[Refunded],
            Refunded => &[],
        }
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    /// Checks a transition against the table.
    pub fn transition_to(&self, next: PaymentStatus) -> Result<PaymentStatus, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidPaymentTransition {
                from: *self,
                to: next,
            })
        }
    }

    /// Returns every status from which `target` is reachable in one step.
    pub fn predecessors_of(target: PaymentStatus) -> Vec<PaymentStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(target))
            .collect()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownPaymentStatus(s.to_string()))
    }
}

/// A recorded payment attempt against an order.
///
/// Rows are never deleted; refunds are status transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub payment_method: String,
    /// External gateway identifier, unique across all payments.
    pub transaction_id: String,
    pub status: PaymentStatus,
    /// Opaque diagnostic payload from the gateway.
    pub gateway_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
