// core/src/inventory.rs

//! Stock reservations for one checkout attempt.

use crate::error::{MarketError, MarketResult};
use crate::model::{Product, ProductId};
use crate::store::{Versioned, WriteBatch};
use std::collections::BTreeMap;
use tracing::debug;

struct Reservation {
  product: Versioned<Product>,
  reserved: u32,
}

/// Collects the stock a checkout needs and stages the decrements.
///
/// Nothing is written until [`InventoryLedger::stage`] adds the new quantities
/// to a batch, each guarded by the version the stock was read at. A concurrent
/// sale of the same product therefore fails the whole batch instead of
/// overselling.
#[derive(Default)]
pub struct InventoryLedger {
  reservations: BTreeMap<ProductId, Reservation>,
}

impl InventoryLedger {
  pub fn new() -> Self {
    Self::default()
  }

  /// Reserves `quantity` units of `product` on top of what this ledger already holds for it.
  ///
  /// On failure the ledger is unchanged.
  pub fn reserve(&mut self, product: &Versioned<Product>, quantity: u32) -> MarketResult<()> {
    let already = self
      .reservations
      .get(&product.value.id)
      .map_or(0, |r| r.reserved);
    let requested = already.checked_add(quantity).ok_or_else(|| {
      MarketError::Validation(format!("requested quantity of '{}' is too large", product.value.name))
    })?;
    let available = product.value.quantity;

    if requested > available {
      return Err(MarketError::InsufficientStock {
        product_name: product.value.name.clone(),
        available,
        requested,
      });
    }

    debug!(product_id = %product.value.id, available, requested, "Stock reserved.");
    self
      .reservations
      .entry(product.value.id)
      .or_insert_with(|| Reservation {
        product: product.clone(),
        reserved: 0,
      })
      .reserved = requested;
    Ok(())
  }

  /// Adds one decremented product write per reserved product to `batch`.
  pub fn stage(self, batch: &mut WriteBatch) {
    for (_, reservation) in self.reservations {
      let expect = reservation.product.expect();
      let mut product = reservation.product.value;
      // reserve() guarantees reserved <= quantity
      product.quantity -= reservation.reserved;
      batch.put_product(product, expect);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::StoreId;
  use crate::store::{Expect, Write};
  use chrono::Utc;

  fn stocked(quantity: u32) -> Versioned<Product> {
    let now = Utc::now();
    Versioned::new(
      Product {
        id: ProductId::new(),
        store_id: StoreId::new(),
        name: "Carrots".into(),
        description: String::new(),
        category: None,
        price_cents: 75,
        quantity,
        image_url: None,
        ratings: Vec::new(),
        created_at: now,
        updated_at: now,
      },
      4,
    )
  }

  #[test]
  fn repeated_reservations_add_up() {
    let product = stocked(5);
    let mut ledger = InventoryLedger::new();
    ledger.reserve(&product, 2).unwrap();
    ledger.reserve(&product, 3).unwrap();
    let err = ledger.reserve(&product, 1).unwrap_err();
    match err {
      MarketError::InsufficientStock {
        available, requested, ..
      } => {
        assert_eq!(available, 5);
        assert_eq!(requested, 6);
      }
      other => panic!("expected InsufficientStock, got {:?}", other),
    }
    let mut batch = WriteBatch::new();
    ledger.stage(&mut batch);
    match &batch.writes()[..] {
      [Write::PutProduct(p)] => assert_eq!(p.quantity, 0),
      other => panic!("unexpected writes {:?}", other),
    }
  }

  #[test]
  fn staged_writes_are_guarded_by_the_read_version() {
    let product = stocked(3);
    let mut ledger = InventoryLedger::new();
    ledger.reserve(&product, 1).unwrap();
    let mut batch = WriteBatch::new();
    ledger.stage(&mut batch);

    assert_eq!(batch.preconditions(), &[(crate::store::DocKey::Product(product.value.id), Expect::Version(4))]);
    match &batch.writes()[0] {
      Write::PutProduct(p) => assert_eq!(p.quantity, 2),
      other => panic!("unexpected write {:?}", other),
    }
  }

  #[test]
  fn zero_stock_cannot_be_reserved() {
    let product = stocked(0);
    let mut ledger = InventoryLedger::new();
    assert!(ledger.reserve(&product, 1).is_err());
    let mut batch = WriteBatch::new();
    ledger.stage(&mut batch);
    assert!(batch.writes().is_empty());
  }
}
