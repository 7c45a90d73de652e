// storefront/src/models/mod.rs

//! Rows and enums stored in Postgres.

pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod product;
pub mod promotion;
pub mod ticket;
pub mod user;

pub use cart_item::CartItem;
pub use order::{Order, OrderStatus};
pub use order_item::OrderItem;
pub use product::{Product, Variation};
pub use promotion::{BestSeller, OnSaleItem, Slide};
pub use ticket::{Ticket, TicketMessage, TicketStatus};
pub use user::{Role, Tier, User};
