// core/src/store/mod.rs

//! The document database seen by the marketplace services.
//!
//! Every document carries a version. Writes are grouped in a [`WriteBatch`]
//! together with the versions they were computed from; a backend applies the
//! whole batch or none of it. That is the only transaction primitive the
//! services need: read, decide, then commit against the versions read, and
//! start over on [`StoreError::Conflict`](crate::error::StoreError::Conflict).

pub mod memory;

use crate::error::StoreResult;
use crate::model::{CartItem, CartItemId, Milestone, Order, OrderId, OrderStatus, Product, ProductId, StoreId, User, UserId};
use crate::session::Party;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
  pub value: T,
  /// 1 for a new document, +1 per write.
  pub version: u64,
}

impl<T> Versioned<T> {
  pub fn new(value: T, version: u64) -> Self {
    Self { value, version }
  }

  pub fn expect(&self) -> Expect {
    Expect::Version(self.version)
  }
}

/// Addresses one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocKey {
  User(UserId),
  Product(ProductId),
  CartItem(UserId, CartItemId),
  Order(OrderId),
}

impl fmt::Display for DocKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DocKey::User(id) => write!(f, "users/{}", id),
      DocKey::Product(id) => write!(f, "products/{}", id),
      DocKey::CartItem(buyer, id) => write!(f, "carts/{}/items/{}", buyer, id),
      DocKey::Order(id) => write!(f, "orders/{}", id),
    }
  }
}

/// Precondition on a document's state at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
  /// The document must not exist.
  Absent,
  /// The document must exist at exactly this version.
  Version(u64),
  /// No check; last write wins.
  Any,
}

impl Expect {
  /// Whether a document currently at `found` satisfies this precondition.
  pub fn holds(&self, found: Option<u64>) -> bool {
    match (self, found) {
      (Expect::Any, _) => true,
      (Expect::Absent, None) => true,
      (Expect::Version(expected), Some(current)) => *expected == current,
      _ => false,
    }
  }
}

impl fmt::Display for Expect {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Expect::Absent => f.write_str("absent"),
      Expect::Version(v) => write!(f, "version {}", v),
      Expect::Any => f.write_str("any"),
    }
  }
}

#[derive(Debug, Clone)]
pub enum Write {
  PutUser(User),
  PutProduct(Product),
  DeleteProduct(ProductId),
  PutCartItem(CartItem),
  DeleteCartItem { buyer_id: UserId, id: CartItemId },
  PutOrder(Order),
}

impl Write {
  pub fn key(&self) -> DocKey {
    match self {
      Write::PutUser(user) => DocKey::User(user.id),
      Write::PutProduct(product) => DocKey::Product(product.id),
      Write::DeleteProduct(id) => DocKey::Product(*id),
      Write::PutCartItem(item) => DocKey::CartItem(item.buyer_id, item.id),
      Write::DeleteCartItem { buyer_id, id } => DocKey::CartItem(*buyer_id, *id),
      Write::PutOrder(order) => DocKey::Order(order.id()),
    }
  }
}

/// Writes applied atomically, guarded by per-document preconditions.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
  preconditions: Vec<(DocKey, Expect)>,
  writes: Vec<Write>,
}

impl WriteBatch {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn preconditions(&self) -> &[(DocKey, Expect)] {
    &self.preconditions
  }

  pub fn writes(&self) -> &[Write] {
    &self.writes
  }

  pub fn into_writes(self) -> Vec<Write> {
    self.writes
  }

  fn push(&mut self, write: Write, expect: Expect) -> &mut Self {
    if expect != Expect::Any {
      self.preconditions.push((write.key(), expect));
    }
    self.writes.push(write);
    self
  }

  pub fn put_user(&mut self, user: User, expect: Expect) -> &mut Self {
    self.push(Write::PutUser(user), expect)
  }

  pub fn put_product(&mut self, product: Product, expect: Expect) -> &mut Self {
    self.push(Write::PutProduct(product), expect)
  }

  pub fn delete_product(&mut self, id: ProductId, expect: Expect) -> &mut Self {
    self.push(Write::DeleteProduct(id), expect)
  }

  pub fn put_cart_item(&mut self, item: CartItem, expect: Expect) -> &mut Self {
    self.push(Write::PutCartItem(item), expect)
  }

  pub fn delete_cart_item(&mut self, buyer_id: UserId, id: CartItemId, expect: Expect) -> &mut Self {
    self.push(Write::DeleteCartItem { buyer_id, id }, expect)
  }

  pub fn put_order(&mut self, order: Order, expect: Expect) -> &mut Self {
    self.push(Write::PutOrder(order), expect)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductFilter {
  All,
  Store(StoreId),
}

/// Orders where the given party is buyer or seller, optionally narrowed to some statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFilter {
  pub party: Party,
  /// Empty means every status.
  pub statuses: Vec<OrderStatus>,
  /// Keep only the newest `limit` matches.
  pub limit: Option<usize>,
}

impl OrderFilter {
  pub fn for_party(party: Party) -> Self {
    Self {
      party,
      statuses: Vec::new(),
      limit: None,
    }
  }

  pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = OrderStatus>) -> Self {
    self.statuses = statuses.into_iter().collect();
    self
  }

  pub fn with_limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }

  pub fn matches(&self, order: &Order) -> bool {
    let party_matches = match self.party {
      Party::Buyer(user) => order.buyer_id() == user,
      Party::Seller(store) => order.store_id() == store,
    };
    party_matches && (self.statuses.is_empty() || self.statuses.contains(&order.status()))
  }
}

/// Backend contract. Implementations must be safe to share between tasks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
  async fn user(&self, id: UserId) -> StoreResult<Option<Versioned<User>>>;

  /// Emails are compared case-insensitively.
  async fn user_by_email(&self, email: &str) -> StoreResult<Option<Versioned<User>>>;

  async fn product(&self, id: ProductId) -> StoreResult<Option<Versioned<Product>>>;

  /// Oldest first.
  async fn products(&self, filter: ProductFilter) -> StoreResult<Vec<Versioned<Product>>>;

  async fn cart_item(&self, buyer: UserId, id: CartItemId) -> StoreResult<Option<Versioned<CartItem>>>;

  /// Oldest first.
  async fn cart(&self, buyer: UserId) -> StoreResult<Vec<Versioned<CartItem>>>;

  async fn order(&self, id: OrderId) -> StoreResult<Option<Versioned<Order>>>;

  /// Ordered by creation time, oldest first. A limit drops the oldest matches.
  async fn orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Versioned<Order>>>;

  /// Applies the whole batch or nothing. A failed precondition is a
  /// `StoreError::Conflict`; so is a second account claiming a taken email.
  async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;

  /// Atomically sets the milestone flag of an order if it is still unset.
  /// Returns true only for the caller that flipped it; false if it was already
  /// set or the order does not exist.
  async fn claim_notification(&self, order: OrderId, milestone: Milestone) -> StoreResult<bool>;

  /// Live feed of every order written after the call.
  ///
  /// `MemoryStore` delivers in commit order. A backend whose commits finish
  /// outside a shared lock may interleave concurrent ones, so consumers act
  /// on a snapshot only through `claim_notification`.
  fn watch_orders(&self) -> broadcast::Receiver<Order>;
}
