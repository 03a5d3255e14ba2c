// tests/common/mod.rs
#![allow(dead_code)] // Each test binary uses a different subset.

use async_trait::async_trait;
use farmgate::{
  CartItem, CartItemId, CartSelection, DocumentStore, MarketConfig, Marketplace, MemoryStore, Milestone, NewAccount,
  NewProduct, Notification, Notifier, Order, OrderFilter, OrderId, Product, ProductFilter, ProductId, RetryConfig, Role,
  Session, StoreError, StoreProfile, StoreResult, User, UserId, Versioned, WriteBatch,
};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::Level;

// --- Tracing ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Notifier that remembers what it showed ---
#[derive(Default)]
pub struct RecordingNotifier {
  shown: Mutex<Vec<(UserId, Notification)>>,
  failing: AtomicBool,
}

impl RecordingNotifier {
  pub fn shown(&self) -> Vec<(UserId, Notification)> {
    self.shown.lock().clone()
  }

  pub fn shown_to(&self, user: UserId) -> Vec<Notification> {
    self
      .shown
      .lock()
      .iter()
      .filter(|(to, _)| *to == user)
      .map(|(_, n)| n.clone())
      .collect()
  }

  pub fn count(&self) -> usize {
    self.shown.lock().len()
  }

  pub fn fail_from_now(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }
}

#[async_trait]
impl Notifier for RecordingNotifier {
  async fn display(&self, recipient: UserId, notification: &Notification) -> anyhow::Result<()> {
    if self.failing.load(Ordering::SeqCst) {
      anyhow::bail!("push service unavailable");
    }
    self.shown.lock().push((recipient, notification.clone()));
    Ok(())
  }
}

// --- Store wrapper that lets a test interfere with commits ---

/// Delegates to a `MemoryStore`. Before the next commit it can apply a
/// competing batch (as if another client committed first) or fail outright
/// with a conflict.
pub struct ContendedStore {
  inner: Arc<MemoryStore>,
  competing: Mutex<Option<WriteBatch>>,
  forced_conflicts: AtomicU32,
  commits: AtomicU32,
}

impl ContendedStore {
  pub fn new(inner: Arc<MemoryStore>) -> Self {
    Self {
      inner,
      competing: Mutex::new(None),
      forced_conflicts: AtomicU32::new(0),
      commits: AtomicU32::new(0),
    }
  }

  /// The next commit first lets `batch` win the race.
  pub fn interleave(&self, batch: WriteBatch) {
    *self.competing.lock() = Some(batch);
  }

  /// The next `n` commits fail with a conflict and write nothing.
  pub fn force_conflicts(&self, n: u32) {
    self.forced_conflicts.store(n, Ordering::SeqCst);
  }

  /// Commit calls seen, including failed ones.
  pub fn commits(&self) -> u32 {
    self.commits.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl DocumentStore for ContendedStore {
  async fn user(&self, id: UserId) -> StoreResult<Option<Versioned<User>>> {
    self.inner.user(id).await
  }

  async fn user_by_email(&self, email: &str) -> StoreResult<Option<Versioned<User>>> {
    self.inner.user_by_email(email).await
  }

  async fn product(&self, id: ProductId) -> StoreResult<Option<Versioned<Product>>> {
    self.inner.product(id).await
  }

  async fn products(&self, filter: ProductFilter) -> StoreResult<Vec<Versioned<Product>>> {
    self.inner.products(filter).await
  }

  async fn cart_item(&self, buyer: UserId, id: CartItemId) -> StoreResult<Option<Versioned<CartItem>>> {
    self.inner.cart_item(buyer, id).await
  }

  async fn cart(&self, buyer: UserId) -> StoreResult<Vec<Versioned<CartItem>>> {
    self.inner.cart(buyer).await
  }

  async fn order(&self, id: OrderId) -> StoreResult<Option<Versioned<Order>>> {
    self.inner.order(id).await
  }

  async fn orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Versioned<Order>>> {
    self.inner.orders(filter).await
  }

  async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
    self.commits.fetch_add(1, Ordering::SeqCst);
    let forced = self
      .forced_conflicts
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if forced {
      return Err(StoreError::Conflict {
        key: batch.writes()[0].key(),
        expected: "test".to_string(),
        found: "forced conflict".to_string(),
      });
    }
    let competing = self.competing.lock().take();
    if let Some(competing) = competing {
      self.inner.commit(competing).await?;
    }
    self.inner.commit(batch).await
  }

  async fn claim_notification(&self, order: OrderId, milestone: Milestone) -> StoreResult<bool> {
    self.inner.claim_notification(order, milestone).await
  }

  fn watch_orders(&self) -> broadcast::Receiver<Order> {
    self.inner.watch_orders()
  }
}

// --- Fixtures ---

pub struct TestMarket {
  pub market: Marketplace,
  pub store: Arc<dyn DocumentStore>,
  pub notifier: Arc<RecordingNotifier>,
  pub buyer: Session,
  pub other_buyer: Session,
  pub farmer: Session,
  pub other_farmer: Session,
}

pub fn fast_config() -> MarketConfig {
  MarketConfig {
    checkout: RetryConfig::immediate(3),
    order_updates: RetryConfig::immediate(3),
    fanout_resync_limit: 100,
  }
}

pub async fn market() -> TestMarket {
  market_on(Arc::new(MemoryStore::new())).await
}

pub async fn market_on(store: Arc<dyn DocumentStore>) -> TestMarket {
  setup_tracing();
  let notifier = Arc::new(RecordingNotifier::default());
  let market = Marketplace::new(store.clone(), notifier.clone(), fast_config());

  let buyer = register(&market, "ada@example.com", "Ada", "Obi", Role::Buyer).await;
  let other_buyer = register(&market, "tunde@example.com", "Tunde", "Bello", Role::Buyer).await;
  let farmer = register(&market, "green@example.com", "Musa", "Green", seller("Green Acres")).await;
  let other_farmer = register(&market, "hill@example.com", "Ifeoma", "Hill", seller("Hillside Farm")).await;

  TestMarket {
    market,
    store,
    notifier,
    buyer: Session::for_user(&buyer),
    other_buyer: Session::for_user(&other_buyer),
    farmer: Session::for_user(&farmer),
    other_farmer: Session::for_user(&other_farmer),
  }
}

pub fn seller(store_name: &str) -> Role {
  Role::Seller {
    store: StoreProfile {
      name: store_name.to_string(),
      description: "Fresh produce".to_string(),
      kind: "vegetables".to_string(),
      address: "Km 4, Farm Road".to_string(),
      avatar_url: None,
    },
  }
}

pub async fn register(market: &Marketplace, email: &str, first: &str, last: &str, role: Role) -> User {
  market
    .accounts
    .register(NewAccount {
      email: email.to_string(),
      first_name: first.to_string(),
      last_name: last.to_string(),
      phone_no: "0800000000".to_string(),
      address: "12 Market Street".to_string(),
      role,
      password_hash: "not-a-real-hash".to_string(),
    })
    .await
    .unwrap()
}

pub async fn list_product(tm: &TestMarket, farmer: &Session, name: &str, price_cents: i64, quantity: u32) -> Product {
  tm.market
    .catalog
    .create(
      farmer,
      NewProduct {
        name: name.to_string(),
        description: String::new(),
        category: Some("vegetables".to_string()),
        price_cents,
        quantity,
        image_url: None,
      },
    )
    .await
    .unwrap()
}

pub fn select(product: &Product) -> CartSelection {
  CartSelection {
    store_id: product.store_id,
    cart_item_id: CartItemId::for_product(product.id),
  }
}

pub async fn stock_of(tm: &TestMarket, product: &Product) -> u32 {
  tm.market.catalog.get(product.id).await.unwrap().quantity
}

pub async fn order_count(tm: &TestMarket, session: &Session) -> usize {
  tm.market.orders.orders_for(session).await.unwrap().len()
}

/// Adds `quantity` of `product` to the buyer's cart and checks it out on its own.
pub async fn place_order(tm: &TestMarket, buyer: &Session, product: &Product, quantity: u32) -> Order {
  tm.market.cart.add(buyer, product.id, quantity).await.unwrap();
  let receipt = tm.market.checkout.checkout(buyer, &[select(product)]).await.unwrap();
  receipt.orders.into_iter().next().unwrap()
}

/// Polls until `check` holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
  for _ in 0..200 {
    if check() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  check()
}
