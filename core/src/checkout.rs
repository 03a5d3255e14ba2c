// core/src/checkout.rs

//! Turns selected cart entries into orders, one per store, in a single commit.
//!
//! Each attempt reads the cart entries and products it needs, reserves stock in
//! an [`InventoryLedger`], builds the orders and commits one [`WriteBatch`]
//! guarded by the versions it read. Either every product is decremented, every
//! order created and every consumed cart entry deleted, or nothing changes.

use crate::config::RetryConfig;
use crate::error::{MarketError, MarketResult};
use crate::inventory::InventoryLedger;
use crate::model::{CartItem, CartItemId, Order, OrderId, OrderLine, Product, StoreId, UserId};
use crate::retry::with_conflict_retry;
use crate::session::Session;
use crate::store::{DocumentStore, Expect, Versioned, WriteBatch};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// One cart entry picked for checkout, with the store the client shows it under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSelection {
  pub store_id: StoreId,
  pub cart_item_id: CartItemId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
  /// One order per store, ordered by store id.
  pub orders: Vec<Order>,
}

impl CheckoutReceipt {
  pub fn total_cents(&self) -> i64 {
    self.orders.iter().map(Order::total_cents).sum()
  }
}

struct Line {
  item: Versioned<CartItem>,
  product: Versioned<Product>,
}

#[derive(Clone)]
pub struct CheckoutService {
  store: Arc<dyn DocumentStore>,
  retry: RetryConfig,
}

impl CheckoutService {
  pub fn new(store: Arc<dyn DocumentStore>, retry: RetryConfig) -> Self {
    Self { store, retry }
  }

  #[instrument(
    name = "checkout",
    skip(self, session, selections),
    fields(buyer = %session.user_id, lines = selections.len()),
    err(Display)
  )]
  pub async fn checkout(&self, session: &Session, selections: &[CartSelection]) -> MarketResult<CheckoutReceipt> {
    let buyer = session.require_buyer()?;
    validate_selection(selections)?;

    let receipt = with_conflict_retry(&self.retry, "checkout", |attempt| self.attempt(buyer, selections, attempt)).await?;

    info!(
      orders = receipt.orders.len(),
      total_cents = receipt.total_cents(),
      "Checkout committed."
    );
    Ok(receipt)
  }

  async fn attempt(&self, buyer: UserId, selections: &[CartSelection], attempt: u32) -> MarketResult<CheckoutReceipt> {
    debug!(attempt, "Starting checkout attempt.");
    let groups = self.load_lines(buyer, selections).await?;

    let mut ledger = InventoryLedger::new();
    for line in groups.values().flatten() {
      ledger.reserve(&line.product, line.item.value.quantity)?;
    }

    let now = Utc::now();
    let mut orders = Vec::with_capacity(groups.len());
    for (store_id, lines) in &groups {
      let store_name = self.store_name(*store_id).await?;
      let items = lines
        .iter()
        .map(|line| OrderLine {
          product_id: line.product.value.id,
          name: line.product.value.name.clone(),
          price_cents: line.product.value.price_cents,
          quantity: line.item.value.quantity,
        })
        .collect();
      orders.push(Order::place(OrderId::new(), buyer, *store_id, store_name, items, now)?);
    }

    let mut batch = WriteBatch::new();
    ledger.stage(&mut batch);
    for order in &orders {
      batch.put_order(order.clone(), Expect::Absent);
    }
    for line in groups.values().flatten() {
      batch.delete_cart_item(buyer, line.item.value.id, line.item.expect());
    }
    self.store.commit(batch).await?;

    Ok(CheckoutReceipt { orders })
  }

  /// Reads the selected entries and their products, grouped by the product's real store.
  async fn load_lines(&self, buyer: UserId, selections: &[CartSelection]) -> MarketResult<BTreeMap<StoreId, Vec<Line>>> {
    let mut groups: BTreeMap<StoreId, Vec<Line>> = BTreeMap::new();
    for selection in selections {
      let item = self
        .store
        .cart_item(buyer, selection.cart_item_id)
        .await?
        .ok_or_else(|| MarketError::not_found("cart item", selection.cart_item_id))?;
      let product_id = item.value.product_id;
      let product = self
        .store
        .product(product_id)
        .await?
        .ok_or_else(|| MarketError::MissingReference {
          from: format!("cart item {}", item.value.id),
          missing: format!("product {}", product_id),
        })?;

      if product.value.store_id != selection.store_id {
        return Err(MarketError::Validation(format!(
          "'{}' is sold by store {}, not {}",
          product.value.name, product.value.store_id, selection.store_id
        )));
      }
      groups.entry(product.value.store_id).or_default().push(Line { item, product });
    }
    Ok(groups)
  }

  async fn store_name(&self, store_id: StoreId) -> MarketResult<String> {
    let missing = || MarketError::MissingReference {
      from: format!("store {}", store_id),
      missing: format!("farmer account {}", store_id.owner()),
    };
    let seller = self.store.user(store_id.owner()).await?.ok_or_else(missing)?;
    seller
      .value
      .store_profile()
      .map(|profile| profile.name.clone())
      .ok_or_else(missing)
  }
}

fn validate_selection(selections: &[CartSelection]) -> MarketResult<()> {
  if selections.is_empty() {
    return Err(MarketError::Validation("select at least one cart item to check out".to_string()));
  }
  let mut seen = HashSet::with_capacity(selections.len());
  for selection in selections {
    if !seen.insert(selection.cart_item_id) {
      return Err(MarketError::Validation(format!(
        "cart item {} is selected more than once",
        selection.cart_item_id
      )));
    }
  }
  Ok(())
}
