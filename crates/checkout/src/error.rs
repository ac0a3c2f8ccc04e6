//! Checkout error types.

use std::time::Duration;

use common::ProductId;
use domain::{DomainError, OrderStatus};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during checkout, payment recording and status updates.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Missing or malformed input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A line could not be reserved.
    #[error(
        "Insufficient stock for '{product_name}' ({product_id}) on line {line}: requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        /// 1-based position of the line in the order.
        line: usize,
        requested: u32,
    },

    /// An address reference or inline address could not be used.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The caller does not own the referenced resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Neither an item list nor a non-empty cart was available.
    #[error("Order has no items")]
    EmptyOrder,

    /// An order, product or address does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The order status transition table rejects the change.
    #[error("Invalid state transition: cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The unit of work did not finish in time and was rolled back.
    #[error("Checkout timed out after {0:?}")]
    Timeout(Duration),

    /// The store failed; the caller may retry.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl CheckoutError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CheckoutError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::Validation(_) => "validation",
            CheckoutError::InsufficientStock { .. } => "insufficient_stock",
            CheckoutError::InvalidAddress(_) => "invalid_address",
            CheckoutError::Forbidden(_) => "forbidden",
            CheckoutError::EmptyOrder => "empty_order",
            CheckoutError::NotFound { .. } => "not_found",
            CheckoutError::InvalidTransition { .. } => "invalid_transition",
            CheckoutError::Timeout(_) => "timeout",
            CheckoutError::Persistence(_) => "persistence",
        }
    }
}

impl From<DomainError> for CheckoutError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidAddress(msg) => CheckoutError::InvalidAddress(msg),
            DomainError::InvalidOrderTransition { from, to } => {
                CheckoutError::InvalidTransition { from, to }
            }
            other => CheckoutError::Validation(other.to_string()),
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
