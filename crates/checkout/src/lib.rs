//! Checkout and payment reconciliation.
//!
//! This crate turns a cart or an explicit item list into a durable order and
//! keeps payment status in step with the external gateway:
//! 1. [`OrderAssembler`] resolves addresses, reserves stock through the
//!    [`InventoryLedger`] and persists the order in one transaction
//! 2. [`PaymentLedger`] records payment attempts against an order
//! 3. [`WebhookReconciler`] applies asynchronous gateway events idempotently
//! 4. [`OrderService`] reads orders back and applies admin status changes
//!
//! Every operation runs inside a single store transaction: it either commits
//! completely or leaves nothing behind.

pub mod address;
pub mod assembler;
pub mod error;
pub mod inventory;
pub mod orders;
pub mod payment;
pub mod webhook;

pub use address::AddressResolver;
pub use assembler::{
    BillingAddress, CheckoutReceipt, CheckoutRequest, DEFAULT_CHECKOUT_TIMEOUT, LineRequest,
    OrderAssembler,
};
pub use error::{CheckoutError, Result};
pub use inventory::{InventoryLedger, Reservation};
pub use orders::{OrderDetails, OrderService};
pub use payment::{NewPayment, PaymentLedger, RecordedPayment};
pub use webhook::{Ack, GatewayEvent, GatewayEventKind, ReconcileOutcome, WebhookReconciler};
