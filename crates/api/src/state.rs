//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use checkout::{OrderAssembler, OrderService, PaymentLedger, WebhookReconciler};
use store::Store;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub assembler: OrderAssembler<S>,
    pub payments: PaymentLedger<S>,
    pub webhooks: WebhookReconciler<S>,
    pub orders: OrderService<S>,
    pub store: S,
}

impl<S: Store + Clone> AppState<S> {
    /// Wires every service to the same store.
    pub fn new(store: S, checkout_timeout: Duration) -> Self {
        Self {
            assembler: OrderAssembler::new(store.clone()).with_timeout(checkout_timeout),
            payments: PaymentLedger::new(store.clone()),
            webhooks: WebhookReconciler::new(store.clone()),
            orders: OrderService::new(store.clone()),
            store,
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}
