pub mod agent;
pub mod catalog;
pub mod order;

pub use agent::{Agent, UserId};
pub use catalog::{Area, AreaId, Product, ProductId, Shop, ShopId};
pub use order::{
    NewOrder, Order, OrderId, OrderLine, OrderStatus, OrderSummary, OrderValidationError,
    SummaryItem,
};
