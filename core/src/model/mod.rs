// core/src/model/mod.rs

//! Documents persisted by the marketplace and the identifiers that link them.

pub mod cart_item;
pub mod ids;
pub mod order;
pub mod product;
pub mod user;

pub use cart_item::CartItem;
pub use ids::{CartItemId, OrderId, ProductId, StoreId, UserId};
pub use order::{HistoryEntry, Milestone, NotificationFlags, Order, OrderLine, OrderStatus};
pub use product::{Product, Rating};
pub use user::{Role, StoreProfile, User};
