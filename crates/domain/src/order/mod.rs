//! Order entity and its status state machine.

mod model;
mod status;

pub use model::{Order, OrderItem};
pub use status::OrderStatus;
