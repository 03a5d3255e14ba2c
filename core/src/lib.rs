// src/lib.rs

//! Farmgate: the marketplace core behind the buyer and farmer apps.
//!
//! Buyers browse products, keep a cart and check out; farmers (sellers) run a
//! store, confirm or reject orders and mark them delivered. This crate owns the
//! parts of that flow with real invariants:
//!  - An atomic checkout that reserves stock across several products, creates
//!    one order per store and clears the consumed cart entries, all or nothing.
//!  - An order lifecycle enforced by an explicit transition table.
//!  - A notification fanout that tells the counterpart party about order
//!    milestones exactly once, guarded by a compare-and-swap on the order.
//!  - Catalog, cart and account operations around them.
//!
//! Persistence goes through the [`DocumentStore`] trait. [`MemoryStore`] is
//! the bundled backend; the server crate adds a Postgres one.

pub mod accounts;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod inventory;
pub mod lifecycle;
pub mod model;
pub mod notify;
pub mod orders;
pub mod session;
pub mod store;

mod retry;

// --- Re-exports for the Public API ---

pub use crate::accounts::{AccountService, NewAccount, ProfileUpdate};
pub use crate::cart::{CartLine, CartService, CartView};
pub use crate::catalog::{CatalogService, NewProduct, ProductReview, ProductUpdate};
pub use crate::checkout::{CartSelection, CheckoutReceipt, CheckoutService};
pub use crate::config::{MarketConfig, RetryConfig};
pub use crate::error::{MarketError, MarketResult, StoreError, StoreResult};
pub use crate::inventory::InventoryLedger;
pub use crate::lifecycle::Actor;
pub use crate::model::{
  CartItem, CartItemId, HistoryEntry, NotificationFlags, Order, OrderId, OrderLine, OrderStatus, Product, ProductId,
  Rating, Role, StoreId, StoreProfile, User, UserId,
};
pub use crate::notify::{Delivery, Milestone, Notification, NotificationFanout, Notifier, Subscription};
pub use crate::orders::{ActivityEntry, CustomerOrders, OrderService};
pub use crate::session::{Party, Session};
pub use crate::store::memory::MemoryStore;
pub use crate::store::{DocKey, DocumentStore, Expect, OrderFilter, ProductFilter, Versioned, WriteBatch};

use std::sync::Arc;

/// Every service of the marketplace wired to one store and one configuration.
///
/// Cloning is cheap; all services share the same `Arc<dyn DocumentStore>`.
#[derive(Clone)]
pub struct Marketplace {
  pub accounts: AccountService,
  pub catalog: CatalogService,
  pub cart: CartService,
  pub checkout: CheckoutService,
  pub orders: OrderService,
  pub fanout: NotificationFanout,
}

impl Marketplace {
  pub fn new(store: Arc<dyn DocumentStore>, notifier: Arc<dyn Notifier>, config: MarketConfig) -> Self {
    Self {
      accounts: AccountService::new(store.clone()),
      catalog: CatalogService::new(store.clone(), config.order_updates.clone()),
      cart: CartService::new(store.clone(), config.order_updates.clone()),
      checkout: CheckoutService::new(store.clone(), config.checkout.clone()),
      orders: OrderService::new(store.clone(), config.order_updates.clone()),
      fanout: NotificationFanout::new(store, notifier, config.fanout_resync_limit),
    }
  }
}
