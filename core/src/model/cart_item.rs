// core/src/model/cart_item.rs

use super::ids::{CartItemId, ProductId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
  pub id: CartItemId,
  pub buyer_id: UserId,
  pub product_id: ProductId,
  /// Always at least 1; an entry that would drop to 0 is deleted instead.
  pub quantity: u32,
  pub created_at: DateTime<Utc>,
}

impl CartItem {
  pub fn new(buyer_id: UserId, product_id: ProductId, quantity: u32, created_at: DateTime<Utc>) -> Self {
    Self {
      id: CartItemId::for_product(product_id),
      buyer_id,
      product_id,
      quantity,
      created_at,
    }
  }
}
