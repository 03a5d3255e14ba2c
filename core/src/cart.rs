// core/src/cart.rs

//! The buyer's cart: one entry per product, quantity always positive.

use crate::config::RetryConfig;
use crate::error::{MarketError, MarketResult};
use crate::model::{CartItem, CartItemId, Product, ProductId, StoreId};
use crate::retry::with_conflict_retry;
use crate::session::Session;
use crate::store::{DocumentStore, Expect, WriteBatch};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
  pub item: CartItem,
  pub product: Product,
  pub subtotal_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCart {
  pub store_id: StoreId,
  pub store_name: String,
  pub lines: Vec<CartLine>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
  pub stores: Vec<StoreCart>,
  /// Entries whose product has been deleted. They cannot be checked out.
  pub missing: Vec<CartItem>,
  pub total_cents: i64,
}

#[derive(Clone)]
pub struct CartService {
  store: Arc<dyn DocumentStore>,
  retry: RetryConfig,
}

impl CartService {
  pub fn new(store: Arc<dyn DocumentStore>, retry: RetryConfig) -> Self {
    Self { store, retry }
  }

  /// Adds `quantity` units of a product, creating the entry or increasing it.
  #[instrument(name = "cart::add", skip(self, session), fields(buyer = %session.user_id), err(Display))]
  pub async fn add(&self, session: &Session, product_id: ProductId, quantity: u32) -> MarketResult<CartItem> {
    let buyer = session.require_buyer()?;
    if quantity == 0 {
      return Err(MarketError::Validation("quantity must be a positive number".to_string()));
    }
    if self.store.product(product_id).await?.is_none() {
      return Err(MarketError::not_found("product", product_id));
    }

    let item_id = CartItemId::for_product(product_id);
    let item = with_conflict_retry(&self.retry, "cart::add", |_| async move {
      let (item, expect) = match self.store.cart_item(buyer, item_id).await? {
        Some(existing) => {
          let expect = existing.expect();
          let mut item = existing.value;
          item.quantity = item
            .quantity
            .checked_add(quantity)
            .ok_or_else(|| MarketError::Validation("cart quantity is too large".to_string()))?;
          (item, expect)
        }
        None => (CartItem::new(buyer, product_id, quantity, Utc::now()), Expect::Absent),
      };
      let mut batch = WriteBatch::new();
      batch.put_cart_item(item.clone(), expect);
      self.store.commit(batch).await?;
      Ok(item)
    })
    .await?;

    info!(product_id = %product_id, quantity = item.quantity, "Cart entry updated.");
    Ok(item)
  }

  /// Changes an entry by `delta`. Reaching zero or below deletes it and returns `None`.
  #[instrument(name = "cart::adjust", skip(self, session), fields(buyer = %session.user_id), err(Display))]
  pub async fn adjust(&self, session: &Session, item_id: CartItemId, delta: i64) -> MarketResult<Option<CartItem>> {
    let buyer = session.require_buyer()?;
    with_conflict_retry(&self.retry, "cart::adjust", |_| async move {
      let existing = self
        .store
        .cart_item(buyer, item_id)
        .await?
        .ok_or_else(|| MarketError::not_found("cart item", item_id))?;
      let expect = existing.expect();
      let wanted = i64::from(existing.value.quantity).saturating_add(delta);

      let mut batch = WriteBatch::new();
      let result = if wanted <= 0 {
        batch.delete_cart_item(buyer, item_id, expect);
        None
      } else {
        let quantity = u32::try_from(wanted).map_err(|_| MarketError::Validation("cart quantity is too large".to_string()))?;
        let mut item = existing.value;
        item.quantity = quantity;
        batch.put_cart_item(item.clone(), expect);
        Some(item)
      };
      self.store.commit(batch).await?;
      Ok(result)
    })
    .await
  }

  #[instrument(name = "cart::remove", skip(self, session), fields(buyer = %session.user_id), err(Display))]
  pub async fn remove(&self, session: &Session, item_id: CartItemId) -> MarketResult<()> {
    let buyer = session.require_buyer()?;
    let existing = self
      .store
      .cart_item(buyer, item_id)
      .await?
      .ok_or_else(|| MarketError::not_found("cart item", item_id))?;
    let mut batch = WriteBatch::new();
    batch.delete_cart_item(buyer, item_id, Expect::Any);
    self.store.commit(batch).await?;
    info!(product_id = %existing.value.product_id, "Cart entry removed.");
    Ok(())
  }

  /// The cart grouped by store, with current product details.
  #[instrument(name = "cart::view", skip(self, session), fields(buyer = %session.user_id), err(Display))]
  pub async fn view(&self, session: &Session) -> MarketResult<CartView> {
    let buyer = session.require_buyer()?;
    let mut grouped: BTreeMap<StoreId, Vec<CartLine>> = BTreeMap::new();
    let mut view = CartView::default();

    for entry in self.store.cart(buyer).await? {
      let item = entry.value;
      let Some(product) = self.store.product(item.product_id).await? else {
        warn!(cart_item = %item.id, product_id = %item.product_id, "Cart entry points at a deleted product.");
        view.missing.push(item);
        continue;
      };
      let subtotal_cents = product.value.price_cents.saturating_mul(i64::from(item.quantity));
      view.total_cents = view.total_cents.saturating_add(subtotal_cents);
      grouped.entry(product.value.store_id).or_default().push(CartLine {
        item,
        product: product.value,
        subtotal_cents,
      });
    }

    for (store_id, lines) in grouped {
      let store_name = match self.store.user(store_id.owner()).await? {
        Some(seller) => seller
          .value
          .store_profile()
          .map_or_else(|| seller.value.display_name(), |s| s.name.clone()),
        None => "Unknown store".to_string(),
      };
      view.stores.push(StoreCart {
        store_id,
        store_name,
        lines,
      });
    }
    Ok(view)
  }
}
