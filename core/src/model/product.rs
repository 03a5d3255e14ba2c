// core/src/model/product.rs

use super::ids::{OrderId, ProductId, StoreId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  pub id: ProductId,
  pub store_id: StoreId,
  pub name: String,
  pub description: String,
  pub category: Option<String>,
  /// Minor currency units.
  pub price_cents: i64,
  /// Units available. Only checkout and the owning seller's restock change it.
  pub quantity: u32,
  pub image_url: Option<String>,
  #[serde(default)]
  pub ratings: Vec<Rating>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// A buyer's review of one product from one of their orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
  pub user_id: UserId,
  pub order_id: OrderId,
  /// 1 to 5 stars.
  pub rating: u8,
  pub review: String,
  pub date: DateTime<Utc>,
}

impl Product {
  pub fn average_rating(&self) -> Option<f64> {
    if self.ratings.is_empty() {
      return None;
    }
    let sum: u32 = self.ratings.iter().map(|r| u32::from(r.rating)).sum();
    Some(f64::from(sum) / self.ratings.len() as f64)
  }

  /// Inserts the rating, replacing an earlier one by the same buyer for the same order.
  pub fn upsert_rating(&mut self, rating: Rating) {
    match self
      .ratings
      .iter_mut()
      .find(|r| r.order_id == rating.order_id && r.user_id == rating.user_id)
    {
      Some(existing) => *existing = rating,
      None => self.ratings.push(rating),
    }
  }
}
