// core/src/model/ids.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct $name(Uuid);

    impl $name {
      pub fn new() -> Self {
        Self(Uuid::new_v4())
      }

      pub fn as_uuid(&self) -> &Uuid {
        &self.0
      }
    }

    impl Default for $name {
      fn default() -> Self {
        Self::new()
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
      }
    }

    impl FromStr for $name {
      type Err = uuid::Error;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
      }
    }
  };
}

uuid_id!(UserId);
uuid_id!(ProductId);
uuid_id!(OrderId);
uuid_id!(
  /// Identifies a seller's store. A store is owned by exactly one seller
  /// account and shares that account's uuid, but the two are never interchangeable
  /// in signatures.
  StoreId
);
uuid_id!(
  /// A buyer keeps at most one cart entry per product, so the entry is keyed by
  /// the product's uuid (see [`CartItemId::for_product`]).
  CartItemId
);

impl StoreId {
  pub fn of_seller(seller: UserId) -> Self {
    Self(seller.0)
  }

  pub fn owner(&self) -> UserId {
    UserId(self.0)
  }
}

impl CartItemId {
  pub fn for_product(product: ProductId) -> Self {
    Self(product.0)
  }
}
