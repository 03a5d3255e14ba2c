// core/src/catalog.rs

//! Products: farmers manage their own listings, everyone browses, buyers review what was delivered.

use crate::config::RetryConfig;
use crate::error::{MarketError, MarketResult};
use crate::model::{OrderId, OrderStatus, Product, ProductId, Rating, StoreId};
use crate::retry::with_conflict_retry;
use crate::session::Session;
use crate::store::{DocumentStore, Expect, ProductFilter, WriteBatch};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
  pub name: String,
  #[serde(default)]
  pub description: String,
  pub category: Option<String>,
  pub price_cents: i64,
  pub quantity: u32,
  pub image_url: Option<String>,
}

/// Fields left `None` are kept as they are.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
  pub name: Option<String>,
  pub description: Option<String>,
  pub category: Option<String>,
  pub price_cents: Option<i64>,
  /// New stock level (restock or correction).
  pub quantity: Option<u32>,
  pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductReview {
  pub product_id: ProductId,
  pub rating: u8,
  #[serde(default)]
  pub review: String,
}

#[derive(Clone)]
pub struct CatalogService {
  store: Arc<dyn DocumentStore>,
  retry: RetryConfig,
}

impl CatalogService {
  pub fn new(store: Arc<dyn DocumentStore>, retry: RetryConfig) -> Self {
    Self { store, retry }
  }

  #[instrument(name = "catalog::create", skip(self, session, new), fields(seller = %session.user_id), err(Display))]
  pub async fn create(&self, session: &Session, new: NewProduct) -> MarketResult<Product> {
    let store_id = session.require_seller()?;
    let now = Utc::now();
    let product = Product {
      id: ProductId::new(),
      store_id,
      name: new.name.trim().to_string(),
      description: new.description,
      category: new.category,
      price_cents: new.price_cents,
      quantity: new.quantity,
      image_url: new.image_url,
      ratings: Vec::new(),
      created_at: now,
      updated_at: now,
    };
    validate(&product)?;

    let mut batch = WriteBatch::new();
    batch.put_product(product.clone(), Expect::Absent);
    self.store.commit(batch).await?;
    info!(product_id = %product.id, "Product listed.");
    Ok(product)
  }

  #[instrument(name = "catalog::update", skip(self, session, update), fields(seller = %session.user_id), err(Display))]
  pub async fn update(&self, session: &Session, id: ProductId, update: ProductUpdate) -> MarketResult<Product> {
    let store_id = session.require_seller()?;
    let update = &update;
    with_conflict_retry(&self.retry, "catalog::update", |_| async move {
      let current = self
        .store
        .product(id)
        .await?
        .ok_or_else(|| MarketError::not_found("product", id))?;
      ensure_owner(&current.value, store_id)?;

      let expect = current.expect();
      let mut product = current.value;
      if let Some(name) = &update.name {
        product.name = name.trim().to_string();
      }
      if let Some(description) = &update.description {
        product.description = description.clone();
      }
      if let Some(category) = &update.category {
        product.category = Some(category.clone());
      }
      if let Some(price_cents) = update.price_cents {
        product.price_cents = price_cents;
      }
      if let Some(quantity) = update.quantity {
        product.quantity = quantity;
      }
      if let Some(image_url) = &update.image_url {
        product.image_url = Some(image_url.clone());
      }
      product.updated_at = Utc::now();
      validate(&product)?;

      let mut batch = WriteBatch::new();
      batch.put_product(product.clone(), expect);
      self.store.commit(batch).await?;
      Ok(product)
    })
    .await
  }

  /// Removes a listing. Cart entries pointing at it become dangling and are
  /// reported as missing until the buyer removes them.
  #[instrument(name = "catalog::delete", skip(self, session), fields(seller = %session.user_id), err(Display))]
  pub async fn delete(&self, session: &Session, id: ProductId) -> MarketResult<()> {
    let store_id = session.require_seller()?;
    let current = self
      .store
      .product(id)
      .await?
      .ok_or_else(|| MarketError::not_found("product", id))?;
    ensure_owner(&current.value, store_id)?;

    let mut batch = WriteBatch::new();
    batch.delete_product(id, current.expect());
    self
      .store
      .commit(batch)
      .await
      .map_err(|e| if e.is_conflict() { MarketError::TransactionConflict { attempts: 1 } } else { e.into() })?;
    info!(product_id = %id, "Product removed.");
    Ok(())
  }

  pub async fn get(&self, id: ProductId) -> MarketResult<Product> {
    self
      .store
      .product(id)
      .await?
      .map(|doc| doc.value)
      .ok_or_else(|| MarketError::not_found("product", id))
  }

  pub async fn list_all(&self) -> MarketResult<Vec<Product>> {
    self.list(ProductFilter::All).await
  }

  pub async fn list_store(&self, store_id: StoreId) -> MarketResult<Vec<Product>> {
    self.list(ProductFilter::Store(store_id)).await
  }

  async fn list(&self, filter: ProductFilter) -> MarketResult<Vec<Product>> {
    Ok(self.store.products(filter).await?.into_iter().map(|doc| doc.value).collect())
  }

  /// Rates products of one of the buyer's delivered orders, all in one commit.
  /// Rating the same product of the same order again replaces the earlier review.
  #[instrument(name = "catalog::review_order", skip(self, session, reviews), fields(buyer = %session.user_id), err(Display))]
  pub async fn review_order(
    &self,
    session: &Session,
    order_id: OrderId,
    reviews: &[ProductReview],
  ) -> MarketResult<Vec<Product>> {
    let buyer = session.require_buyer()?;
    if reviews.is_empty() {
      return Err(MarketError::Validation("nothing to review".to_string()));
    }
    let mut seen = HashSet::new();
    for review in reviews {
      if !(1..=5).contains(&review.rating) {
        return Err(MarketError::Validation(format!("rating must be 1 to 5, got {}", review.rating)));
      }
      if !seen.insert(review.product_id) {
        return Err(MarketError::Validation(format!("product {} is reviewed twice", review.product_id)));
      }
    }

    let order = match self.store.order(order_id).await? {
      Some(doc) if doc.value.buyer_id() == buyer => doc.value,
      _ => return Err(MarketError::not_found("order", order_id)),
    };
    if order.status() != OrderStatus::Delivered {
      return Err(MarketError::Validation(format!(
        "order {} can be reviewed once delivered; it is '{}'",
        order_id,
        order.status()
      )));
    }
    if let Some(stray) = reviews.iter().find(|r| !order.contains_product(r.product_id)) {
      return Err(MarketError::Validation(format!(
        "product {} is not part of order {}",
        stray.product_id, order_id
      )));
    }

    let products = with_conflict_retry(&self.retry, "catalog::review_order", |_| async move {
      let now = Utc::now();
      let mut batch = WriteBatch::new();
      let mut products = Vec::with_capacity(reviews.len());
      for review in reviews {
        let current = self
          .store
          .product(review.product_id)
          .await?
          .ok_or_else(|| MarketError::MissingReference {
            from: format!("order {}", order_id),
            missing: format!("product {}", review.product_id),
          })?;
        let expect = current.expect();
        let mut product = current.value;
        product.upsert_rating(Rating {
          user_id: buyer,
          order_id,
          rating: review.rating,
          review: review.review.trim().to_string(),
          date: now,
        });
        batch.put_product(product.clone(), expect);
        products.push(product);
      }
      self.store.commit(batch).await?;
      Ok(products)
    })
    .await?;

    info!(order_id = %order_id, reviewed = products.len(), "Order reviewed.");
    Ok(products)
  }
}

fn ensure_owner(product: &Product, store_id: StoreId) -> MarketResult<()> {
  if product.store_id != store_id {
    return Err(MarketError::Forbidden(format!(
      "product {} belongs to another store",
      product.id
    )));
  }
  Ok(())
}

fn validate(product: &Product) -> MarketResult<()> {
  if product.name.is_empty() {
    return Err(MarketError::Validation("product name is required".to_string()));
  }
  if product.price_cents < 0 {
    return Err(MarketError::Validation("price cannot be negative".to_string()));
  }
  Ok(())
}
