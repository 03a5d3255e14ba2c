// core/src/store/memory.rs

//! In-process `DocumentStore`, used by tests and by the server when no
//! database is configured.

use super::{DocKey, DocumentStore, OrderFilter, ProductFilter, Versioned, Write, WriteBatch};
use crate::error::{StoreError, StoreResult};
use crate::model::{CartItem, CartItemId, Milestone, Order, OrderId, Product, ProductId, User, UserId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use tokio::sync::broadcast;
use tracing::{debug, trace};

const DEFAULT_FEED_CAPACITY: usize = 1024;

#[derive(Default)]
struct Tables {
  users: HashMap<UserId, Versioned<User>>,
  products: HashMap<ProductId, Versioned<Product>>,
  carts: HashMap<(UserId, CartItemId), Versioned<CartItem>>,
  orders: HashMap<OrderId, Versioned<Order>>,
}

impl Tables {
  fn version_of(&self, key: &DocKey) -> Option<u64> {
    match key {
      DocKey::User(id) => self.users.get(id).map(|d| d.version),
      DocKey::Product(id) => self.products.get(id).map(|d| d.version),
      DocKey::CartItem(buyer, id) => self.carts.get(&(*buyer, *id)).map(|d| d.version),
      DocKey::Order(id) => self.orders.get(id).map(|d| d.version),
    }
  }

  fn email_taken_by_other(&self, user: &User) -> Option<UserId> {
    self
      .users
      .values()
      .find(|u| u.value.id != user.id && u.value.email.eq_ignore_ascii_case(&user.email))
      .map(|u| u.value.id)
  }

  /// Applies one write. Returns the order when an order document changed.
  fn apply(&mut self, write: Write) -> Option<Order> {
    match write {
      Write::PutUser(user) => {
        put(&mut self.users, user.id, user);
        None
      }
      Write::PutProduct(product) => {
        put(&mut self.products, product.id, product);
        None
      }
      Write::DeleteProduct(id) => {
        self.products.remove(&id);
        None
      }
      Write::PutCartItem(item) => {
        put(&mut self.carts, (item.buyer_id, item.id), item);
        None
      }
      Write::DeleteCartItem { buyer_id, id } => {
        self.carts.remove(&(buyer_id, id));
        None
      }
      Write::PutOrder(order) => {
        put(&mut self.orders, order.id(), order.clone());
        Some(order)
      }
    }
  }
}

fn put<K: Eq + Hash, T>(table: &mut HashMap<K, Versioned<T>>, key: K, value: T) {
  let version = table.get(&key).map_or(1, |d| d.version + 1);
  table.insert(key, Versioned::new(value, version));
}

fn conflict(key: DocKey, expected: impl ToString, found: Option<u64>) -> StoreError {
  StoreError::Conflict {
    key,
    expected: expected.to_string(),
    found: found.map_or_else(|| "absent".to_string(), |v| format!("version {}", v)),
  }
}

pub struct MemoryStore {
  tables: Mutex<Tables>,
  feed: broadcast::Sender<Order>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::with_feed_capacity(DEFAULT_FEED_CAPACITY)
  }

  /// `capacity` bounds how far a slow change-feed subscriber may lag before it must resync.
  pub fn with_feed_capacity(capacity: usize) -> Self {
    let (feed, _) = broadcast::channel(capacity.max(1));
    Self {
      tables: Mutex::new(Tables::default()),
      feed,
    }
  }

  fn publish(&self, changed: Vec<Order>) {
    for order in changed {
      // No receivers is fine: nobody is listening yet.
      let delivered = self.feed.send(order).unwrap_or(0);
      trace!(receivers = delivered, "Published order change.");
    }
  }
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl DocumentStore for MemoryStore {
  async fn user(&self, id: UserId) -> StoreResult<Option<Versioned<User>>> {
    Ok(self.tables.lock().users.get(&id).cloned())
  }

  async fn user_by_email(&self, email: &str) -> StoreResult<Option<Versioned<User>>> {
    let tables = self.tables.lock();
    Ok(
      tables
        .users
        .values()
        .find(|u| u.value.email.eq_ignore_ascii_case(email.trim()))
        .cloned(),
    )
  }

  async fn product(&self, id: ProductId) -> StoreResult<Option<Versioned<Product>>> {
    Ok(self.tables.lock().products.get(&id).cloned())
  }

  async fn products(&self, filter: ProductFilter) -> StoreResult<Vec<Versioned<Product>>> {
    let mut found: Vec<_> = {
      let tables = self.tables.lock();
      tables
        .products
        .values()
        .filter(|p| match filter {
          ProductFilter::All => true,
          ProductFilter::Store(store) => p.value.store_id == store,
        })
        .cloned()
        .collect()
    };
    found.sort_by_key(|p| (p.value.created_at, *p.value.id.as_uuid()));
    Ok(found)
  }

  async fn cart_item(&self, buyer: UserId, id: CartItemId) -> StoreResult<Option<Versioned<CartItem>>> {
    Ok(self.tables.lock().carts.get(&(buyer, id)).cloned())
  }

  async fn cart(&self, buyer: UserId) -> StoreResult<Vec<Versioned<CartItem>>> {
    let mut items: Vec<_> = {
      let tables = self.tables.lock();
      tables
        .carts
        .iter()
        .filter(|((owner, _), _)| *owner == buyer)
        .map(|(_, item)| item.clone())
        .collect()
    };
    items.sort_by_key(|i| (i.value.created_at, *i.value.id.as_uuid()));
    Ok(items)
  }

  async fn order(&self, id: OrderId) -> StoreResult<Option<Versioned<Order>>> {
    Ok(self.tables.lock().orders.get(&id).cloned())
  }

  async fn orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Versioned<Order>>> {
    let mut found: Vec<_> = {
      let tables = self.tables.lock();
      tables
        .orders
        .values()
        .filter(|o| filter.matches(&o.value))
        .cloned()
        .collect()
    };
    found.sort_by_key(|o| (o.value.created_at(), *o.value.id().as_uuid()));
    if let Some(limit) = filter.limit {
      let skip = found.len().saturating_sub(limit);
      found.drain(..skip);
    }
    Ok(found)
  }

  async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
    let mut tables = self.tables.lock();

    for (key, expect) in batch.preconditions() {
      let found = tables.version_of(key);
      if !expect.holds(found) {
        debug!(%key, %expect, ?found, "Rejecting batch: precondition failed.");
        return Err(conflict(*key, expect, found));
      }
    }
    for write in batch.writes() {
      if let Write::PutUser(user) = write {
        if let Some(owner) = tables.email_taken_by_other(user) {
          return Err(StoreError::Conflict {
            key: DocKey::User(user.id),
            expected: format!("unique email '{}'", user.email),
            found: format!("taken by {}", owner),
          });
        }
      }
    }

    let mut changed = Vec::new();
    for write in batch.into_writes() {
      if let Some(order) = tables.apply(write) {
        changed.push(order);
      }
    }
    // Still under the lock so the feed sees commits in the order they applied.
    self.publish(changed);
    Ok(())
  }

  async fn claim_notification(&self, order: OrderId, milestone: Milestone) -> StoreResult<bool> {
    let mut tables = self.tables.lock();
    let Some(doc) = tables.orders.get_mut(&order) else {
      return Ok(false);
    };
    if !doc.value.mark_notified(milestone) {
      return Ok(false);
    }
    doc.version += 1;
    let updated = doc.value.clone();
    self.publish(vec![updated]);
    Ok(true)
  }

  fn watch_orders(&self) -> broadcast::Receiver<Order> {
    self.feed.subscribe()
  }
}
