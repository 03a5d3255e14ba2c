// tests/order_lifecycle_tests.rs
mod common;
use common::*;
use farmgate::{MarketError, OrderStatus, Role, Session};
use std::sync::Arc;
use std::time::Duration;

async fn tick() {
  // Keeps creation timestamps distinct so ordering assertions are stable.
  tokio::time::sleep(Duration::from_millis(3)).await;
}

#[tokio::test]
async fn seller_confirms_then_delivers() {
  let tm = market().await;
  let lettuce = list_product(&tm, &tm.farmer, "Lettuce", 180, 5).await;
  let placed = place_order(&tm, &tm.buyer, &lettuce, 2).await;

  let confirmed = tm.market.orders.confirm(&tm.farmer, placed.id()).await.unwrap();
  assert_eq!(confirmed.status(), OrderStatus::OrderConfirmed);
  assert_eq!(confirmed.history().len(), 2);
  assert!(!confirmed.notification_sent().order_confirmed);
  assert_eq!(confirmed.total_cents(), placed.total_cents());
  assert!(confirmed.is_consistent());

  let delivered = tm.market.orders.deliver(&tm.farmer, placed.id()).await.unwrap();
  assert_eq!(delivered.status(), OrderStatus::Delivered);
  let shown: Vec<_> = delivered.history_newest_first().into_iter().map(|e| e.status).collect();
  assert_eq!(
    shown,
    vec![OrderStatus::Delivered, OrderStatus::OrderConfirmed, OrderStatus::OrderPlaced]
  );
  assert!(delivered.is_consistent());
}

#[tokio::test]
async fn buyer_cancel_is_terminal() {
  let tm = market().await;
  let ginger = list_product(&tm, &tm.farmer, "Ginger", 60, 5).await;
  let placed = place_order(&tm, &tm.buyer, &ginger, 1).await;

  let canceled = tm.market.orders.cancel(&tm.buyer, placed.id()).await.unwrap();
  assert_eq!(canceled.status(), OrderStatus::Canceled);
  assert_eq!(canceled.history().len(), 2);

  for attempt in [
    tm.market.orders.confirm(&tm.farmer, placed.id()).await,
    tm.market.orders.deliver(&tm.farmer, placed.id()).await,
    tm.market.orders.reject(&tm.farmer, placed.id()).await,
  ] {
    assert!(matches!(attempt, Err(MarketError::IllegalTransition { .. })), "got {:?}", attempt);
  }
  let stored = tm.market.orders.order(&tm.buyer, placed.id()).await.unwrap();
  assert_eq!(stored.history().len(), 2);
  assert_eq!(stored.status(), OrderStatus::Canceled);
}

#[tokio::test]
async fn confirmed_orders_cannot_be_canceled_or_rejected() {
  let tm = market().await;
  let plantain = list_product(&tm, &tm.farmer, "Plantain", 120, 5).await;
  let placed = place_order(&tm, &tm.buyer, &plantain, 1).await;
  tm.market.orders.confirm(&tm.farmer, placed.id()).await.unwrap();

  let cancel = tm.market.orders.cancel(&tm.buyer, placed.id()).await;
  assert!(matches!(cancel, Err(MarketError::IllegalTransition { from: OrderStatus::OrderConfirmed, .. })));
  let reject = tm.market.orders.reject(&tm.farmer, placed.id()).await;
  assert!(matches!(reject, Err(MarketError::IllegalTransition { .. })));
}

#[tokio::test]
async fn only_the_right_party_may_act() {
  let tm = market().await;
  let cabbage = list_product(&tm, &tm.farmer, "Cabbage", 140, 5).await;
  let placed = place_order(&tm, &tm.buyer, &cabbage, 1).await;

  assert!(matches!(
    tm.market.orders.confirm(&tm.buyer, placed.id()).await,
    Err(MarketError::Forbidden(_))
  ));
  assert!(matches!(
    tm.market.orders.confirm(&tm.other_farmer, placed.id()).await,
    Err(MarketError::NotFound { .. })
  ));
  assert!(matches!(
    tm.market.orders.cancel(&tm.other_buyer, placed.id()).await,
    Err(MarketError::NotFound { .. })
  ));
  assert!(matches!(
    tm.market.orders.order(&tm.other_buyer, placed.id()).await,
    Err(MarketError::NotFound { .. })
  ));

  // Seller rejection is the seller-side cancel.
  let rejected = tm.market.orders.reject(&tm.farmer, placed.id()).await.unwrap();
  assert_eq!(rejected.status(), OrderStatus::Canceled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_confirm_and_cancel_apply_exactly_one() {
  let tm = Arc::new(market().await);
  let carrots = list_product(&tm, &tm.farmer, "Carrots", 75, 9).await;
  let placed = place_order(&tm, &tm.buyer, &carrots, 3).await;
  let id = placed.id();

  let confirm = {
    let tm = tm.clone();
    tokio::spawn(async move { tm.market.orders.confirm(&tm.farmer, id).await })
  };
  let cancel = {
    let tm = tm.clone();
    tokio::spawn(async move { tm.market.orders.cancel(&tm.buyer, id).await })
  };
  let (confirm, cancel) = (confirm.await.unwrap(), cancel.await.unwrap());

  assert!(confirm.is_ok() ^ cancel.is_ok(), "confirm: {:?}, cancel: {:?}", confirm, cancel);
  let loser = confirm.as_ref().err().or(cancel.as_ref().err()).unwrap();
  assert!(matches!(loser, MarketError::IllegalTransition { .. }), "got {:?}", loser);

  let stored = tm.market.orders.order(&tm.buyer, id).await.unwrap();
  assert_eq!(stored.history().len(), 2);
  assert!(stored.is_consistent());
}

#[tokio::test]
async fn buyers_list_oldest_first_and_sellers_newest_first() {
  let tm = market().await;
  let milk = list_product(&tm, &tm.farmer, "Milk", 500, 20).await;
  let first = place_order(&tm, &tm.buyer, &milk, 1).await;
  tick().await;
  let second = place_order(&tm, &tm.other_buyer, &milk, 1).await;
  tick().await;
  let third = place_order(&tm, &tm.buyer, &milk, 2).await;

  let buyer_ids: Vec<_> = tm
    .market
    .orders
    .orders_for(&tm.buyer)
    .await
    .unwrap()
    .iter()
    .map(|o| o.id())
    .collect();
  assert_eq!(buyer_ids, vec![first.id(), third.id()]);

  let seller_ids: Vec<_> = tm
    .market
    .orders
    .orders_for(&tm.farmer)
    .await
    .unwrap()
    .iter()
    .map(|o| o.id())
    .collect();
  assert_eq!(seller_ids, vec![third.id(), second.id(), first.id()]);

  let groups = tm.market.orders.orders_by_customer(&tm.farmer).await.unwrap();
  assert_eq!(groups.len(), 2);
  assert_eq!(groups[0].customer_name, "Ada Obi");
  assert_eq!(groups[0].orders.len(), 2);
  assert_eq!(groups[1].customer_name, "Tunde Bello");

  assert!(matches!(
    tm.market.orders.orders_by_customer(&tm.buyer).await,
    Err(MarketError::Forbidden(_))
  ));
}

#[tokio::test]
async fn customers_sharing_a_name_stay_in_separate_groups() {
  let tm = market().await;
  let namesake = register(&tm.market, "ada.obi@example.org", "Ada", "Obi", Role::Buyer).await;
  let namesake = Session::for_user(&namesake);
  let eggs = list_product(&tm, &tm.farmer, "Eggs", 300, 10).await;

  let older = place_order(&tm, &tm.buyer, &eggs, 1).await;
  tick().await;
  let newer = place_order(&tm, &namesake, &eggs, 2).await;

  let groups = tm.market.orders.orders_by_customer(&tm.farmer).await.unwrap();
  assert_eq!(groups.len(), 2);
  assert!(groups.iter().all(|g| g.customer_name == "Ada Obi" && g.orders.len() == 1));
  assert_eq!(groups[0].buyer_id, namesake.user_id);
  assert_eq!(groups[0].orders[0].id(), newer.id());
  assert_eq!(groups[1].buyer_id, tm.buyer.user_id);
  assert_eq!(groups[1].orders[0].id(), older.id());
}

#[tokio::test]
async fn activity_shows_each_orders_latest_status_newest_first() {
  let tm = market().await;
  let beans = list_product(&tm, &tm.farmer, "Beans", 300, 20).await;
  let older = place_order(&tm, &tm.buyer, &beans, 1).await;
  tick().await;
  let newer = place_order(&tm, &tm.buyer, &beans, 1).await;
  tick().await;
  tm.market.orders.confirm(&tm.farmer, older.id()).await.unwrap();

  let activity = tm.market.orders.activity(&tm.buyer).await.unwrap();
  assert_eq!(activity.len(), 2);
  assert_eq!(activity[0].order_id, older.id());
  assert_eq!(activity[0].status, OrderStatus::OrderConfirmed);
  assert_eq!(activity[1].order_id, newer.id());
  assert_eq!(activity[1].status, OrderStatus::OrderPlaced);
}
