// tests/property_tests.rs
mod common;
use common::*;
use chrono::{Duration, Utc};
use farmgate::{Actor, MarketError, Order, OrderId, OrderLine, OrderStatus, ProductId, StoreId, UserId};
use proptest::prelude::*;
use std::collections::HashSet;

fn runtime() -> tokio::runtime::Runtime {
  tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .unwrap()
}

/// (stock, requested, sold by the second farmer)
fn lines() -> impl Strategy<Value = Vec<(u32, u32, bool)>> {
  prop::collection::vec((0u32..6, 1u32..6, any::<bool>()), 1..5)
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(48))]

  #[test]
  fn checkout_is_all_or_nothing(lines in lines()) {
    runtime().block_on(async {
      let tm = market().await;
      let mut products = Vec::new();
      for (i, (stock, requested, second)) in lines.iter().enumerate() {
        let farmer = if *second { &tm.other_farmer } else { &tm.farmer };
        let product = list_product(&tm, farmer, &format!("Item {}", i), 100 + i as i64, *stock).await;
        tm.market.cart.add(&tm.buyer, product.id, *requested).await.unwrap();
        products.push(product);
      }
      let selections: Vec<_> = products.iter().map(select).collect();
      let any_short = lines.iter().any(|(stock, requested, _)| requested > stock);

      let result = tm.market.checkout.checkout(&tm.buyer, &selections).await;

      if any_short {
        prop_assert!(matches!(result, Err(MarketError::InsufficientStock { .. })), "got {:?}", result);
        for (product, (stock, _, _)) in products.iter().zip(&lines) {
          prop_assert_eq!(stock_of(&tm, product).await, *stock);
        }
        prop_assert_eq!(order_count(&tm, &tm.buyer).await, 0);
        prop_assert_eq!(tm.store.cart(tm.buyer.user_id).await.unwrap().len(), lines.len());
      } else {
        let receipt = result.unwrap();
        let stores: HashSet<StoreId> = products.iter().map(|p| p.store_id).collect();
        prop_assert_eq!(receipt.orders.len(), stores.len());
        for order in &receipt.orders {
          prop_assert_eq!(order.status(), OrderStatus::OrderPlaced);
          prop_assert_eq!(order.history().len(), 1);
          prop_assert!(order.is_consistent());
        }
        for (product, (stock, requested, _)) in products.iter().zip(&lines) {
          prop_assert_eq!(stock_of(&tm, product).await, stock - requested);
        }
        prop_assert!(tm.store.cart(tm.buyer.user_id).await.unwrap().is_empty());
      }
      Ok(())
    })?;
  }

  #[test]
  fn status_changes_keep_totals_and_grow_history(
    prices in prop::collection::vec((0i64..100_000, 1u32..50), 1..6),
    moves in prop::collection::vec((0usize..4, any::<bool>()), 0..12),
  ) {
    let statuses = [
      OrderStatus::OrderPlaced,
      OrderStatus::OrderConfirmed,
      OrderStatus::Delivered,
      OrderStatus::Canceled,
    ];
    let items: Vec<OrderLine> = prices
      .iter()
      .map(|(price_cents, quantity)| OrderLine {
        product_id: ProductId::new(),
        name: "Produce".to_string(),
        price_cents: *price_cents,
        quantity: *quantity,
      })
      .collect();
    let expected_total: i64 = prices.iter().map(|(p, q)| p * i64::from(*q)).sum();
    let start = Utc::now();
    let mut order = Order::place(OrderId::new(), UserId::new(), StoreId::new(), "Farm", items, start).unwrap();

    for (step, (target, by_seller)) in moves.into_iter().enumerate() {
      let before = order.history().len();
      let actor = if by_seller { Actor::Seller } else { Actor::Buyer };
      let at = start + Duration::seconds(step as i64 + 1);
      let applied = order.advance(statuses[target], actor, at).is_ok();

      prop_assert_eq!(order.history().len(), before + usize::from(applied));
      prop_assert_eq!(order.total_cents(), expected_total);
      prop_assert_eq!(Some(order.status()), order.latest_entry().map(|e| e.status));
      prop_assert!(order.is_consistent());
    }
  }
}
