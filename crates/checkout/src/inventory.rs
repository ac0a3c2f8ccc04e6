//! Atomic stock reservation.

use common::ProductId;
use store::{InventoryRepository, StoreError};

/// Outcome of a reservation attempt.
///
/// Insufficient stock is an expected business result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Reserved,
    InsufficientStock,
}

/// Reserves stock with a single conditional decrement per line.
///
/// Concurrent reservations against the same product can never both succeed
/// past the available stock, because the check and the decrement are one
/// statement in the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryLedger;

impl InventoryLedger {
    pub fn new() -> Self {
        Self
    }

    /// Reserves `quantity` units of `product_id` within the caller's transaction.
    ///
    /// On `InsufficientStock` nothing is written.
    #[tracing::instrument(skip(self, repo))]
    pub async fn reserve<R: InventoryRepository>(
        &self,
        repo: &mut R,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Reservation, StoreError> {
        if repo.decrement_stock(product_id, quantity).await? {
            metrics::counter!("inventory_reservations_total", "outcome" => "reserved")
                .increment(1);
            Ok(Reservation::Reserved)
        } else {
            metrics::counter!("inventory_reservations_total", "outcome" => "insufficient_stock")
                .increment(1);
            tracing::debug!("insufficient stock");
            Ok(Reservation::InsufficientStock)
        }
    }
}
