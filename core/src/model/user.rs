// core/src/model/user.rs

use super::ids::{StoreId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id: UserId,
  pub email: String,
  pub first_name: String,
  pub last_name: String,
  pub phone_no: String,
  pub address: String,
  /// Opaque credential produced by the auth layer. Never sent to clients.
  pub password_hash: String,
  #[serde(flatten)]
  pub role: Role,
  pub created_at: DateTime<Utc>,
}

/// What an account does in the marketplace. Sellers carry their store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Role {
  #[serde(rename = "User")]
  Buyer,
  #[serde(rename = "Farmer")]
  Seller { store: StoreProfile },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreProfile {
  pub name: String,
  pub description: String,
  /// Free-form kind of farm or shop ("vegetables", "poultry", ...).
  pub kind: String,
  pub address: String,
  pub avatar_url: Option<String>,
}

impl User {
  pub fn display_name(&self) -> String {
    let name = format!("{} {}", self.first_name.trim(), self.last_name.trim());
    let name = name.trim();
    if name.is_empty() {
      "Unknown".to_string()
    } else {
      name.to_string()
    }
  }

  /// The store this account runs, if it is a seller.
  pub fn store_id(&self) -> Option<StoreId> {
    match self.role {
      Role::Seller { .. } => Some(StoreId::of_seller(self.id)),
      Role::Buyer => None,
    }
  }

  pub fn store_profile(&self) -> Option<&StoreProfile> {
    match &self.role {
      Role::Seller { store } => Some(store),
      Role::Buyer => None,
    }
  }
}
