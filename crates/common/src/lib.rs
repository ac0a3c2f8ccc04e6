//! Shared types used across the checkout workspace.

mod ids;
mod money;

pub use ids::{AddressId, OrderId, OrderItemId, PaymentId, ProductId, UserId};
pub use money::Money;
