//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;
use crate::payment::PaymentStatus;

/// Errors raised by domain rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A status string did not name a known order status.
    #[error("Unknown order status: {0}")]
    UnknownOrderStatus(String),

    /// A status string did not name a known payment status.
    #[error("Unknown payment status: {0}")]
    UnknownPaymentStatus(String),

    /// The order transition table does not allow this move.
    #[error("Invalid state transition: cannot move order from {from} to {to}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },

    /// The payment transition table does not allow this move.
    #[error("Invalid state transition: cannot move payment from {from} to {to}")]
    InvalidPaymentTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// An order total does not fit in the money type.
    #[error("Order total is too large")]
    AmountOverflow,

    /// Inline address fields are incomplete.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}
