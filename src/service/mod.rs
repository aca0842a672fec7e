//! Remote order-analysis service: wire types, the `OrderService` seam and
//! its HTTP implementation.

pub mod client;
pub mod types;

pub use client::{HttpOrderService, OrderService, ServiceError};
pub use types::{
    MenuCategory, MenuItem, MenuOption, Order, OrderData, OrderLine, OrderResponse,
    ResponseEnvelope, ResponseStatus,
};

#[cfg(test)]
pub use client::{MockOrderService, ServiceCall};
