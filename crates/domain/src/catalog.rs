//! Read-side views of the catalog and cart collaborators.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// A catalog product as seen by checkout.
///
/// Checkout only ever writes `stock_quantity`, and only through a conditional
/// decrement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Current list price.
    pub price: Money,
    pub stock_quantity: i64,
}

impl Product {
    pub fn new(name: impl Into<String>, price: Money, stock_quantity: i64) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            price,
            stock_quantity,
        }
    }
}

/// One line of a user's cart snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Price captured when the product was added; authoritative at checkout.
    pub price_at_addition: Money,
}

impl CartLine {
    pub fn new(product_id: ProductId, quantity: u32, price_at_addition: Money) -> Self {
        Self {
            product_id,
            quantity,
            price_at_addition,
        }
    }
}
