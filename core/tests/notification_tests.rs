// tests/notification_tests.rs
mod common;
use common::*;
use farmgate::{Delivery, MemoryStore, Milestone, NotificationFanout};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn a_milestone_is_displayed_once() {
  let tm = market().await;
  let yam = list_product(&tm, &tm.farmer, "Yam", 800, 4).await;
  let placed = place_order(&tm, &tm.buyer, &yam, 1).await;

  let fanout = &tm.market.fanout;
  assert_eq!(fanout.deliver(&tm.farmer, &placed).await.unwrap(), Delivery::Displayed);
  // The same stale snapshot again: the stored flag is already claimed.
  assert_eq!(fanout.deliver(&tm.farmer, &placed).await.unwrap(), Delivery::AlreadySent);

  let shown = tm.notifier.shown_to(tm.farmer.user_id);
  assert_eq!(shown.len(), 1);
  assert_eq!(shown[0].title, "New Order Received!");
  assert_eq!(
    shown[0].body,
    format!("Order ID: {} placed by Ada Obi. Review and prepare the order.", placed.id())
  );
  let stored = tm.market.orders.order(&tm.farmer, placed.id()).await.unwrap();
  assert!(stored.notification_sent().order_placed);
}

#[tokio::test]
async fn parties_only_hear_about_their_own_milestones() {
  let tm = market().await;
  let okra = list_product(&tm, &tm.farmer, "Okra", 90, 4).await;
  let placed = place_order(&tm, &tm.buyer, &okra, 1).await;
  let fanout = &tm.market.fanout;

  assert_eq!(fanout.deliver(&tm.buyer, &placed).await.unwrap(), Delivery::Ignored);
  assert_eq!(fanout.deliver(&tm.other_farmer, &placed).await.unwrap(), Delivery::Ignored);
  assert_eq!(fanout.deliver(&tm.other_buyer, &placed).await.unwrap(), Delivery::Ignored);
  assert_eq!(tm.notifier.count(), 0);

  let confirmed = tm.market.orders.confirm(&tm.farmer, placed.id()).await.unwrap();
  assert_eq!(fanout.deliver(&tm.farmer, &confirmed).await.unwrap(), Delivery::Ignored);
  assert_eq!(fanout.deliver(&tm.buyer, &confirmed).await.unwrap(), Delivery::Displayed);

  let shown = tm.notifier.shown_to(tm.buyer.user_id);
  assert_eq!(shown.len(), 1);
  assert_eq!(shown[0].milestone, Milestone::OrderConfirmed);
  assert_eq!(
    shown[0].body,
    format!("Your order {} with Green Acres has been confirmed.", placed.id())
  );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deliveries_of_one_snapshot_display_once() {
  let tm = Arc::new(market().await);
  let rice = list_product(&tm, &tm.farmer, "Rice", 1200, 4).await;
  let placed = place_order(&tm, &tm.buyer, &rice, 1).await;

  let mut handles = Vec::new();
  for _ in 0..8 {
    let tm = tm.clone();
    let snapshot = placed.clone();
    handles.push(tokio::spawn(async move {
      tm.market.fanout.deliver(&tm.farmer, &snapshot).await.unwrap()
    }));
  }
  let mut outcomes = Vec::new();
  for handle in handles {
    outcomes.push(handle.await.unwrap());
  }

  assert_eq!(outcomes.iter().filter(|d| **d == Delivery::Displayed).count(), 1);
  assert_eq!(outcomes.iter().filter(|d| **d == Delivery::AlreadySent).count(), 7);
  assert_eq!(tm.notifier.count(), 1);
}

#[tokio::test]
async fn display_failures_are_not_retried() {
  let tm = market().await;
  let pepper = list_product(&tm, &tm.farmer, "Pepper", 100, 4).await;
  let placed = place_order(&tm, &tm.buyer, &pepper, 1).await;

  tm.notifier.fail_from_now(true);
  assert_eq!(tm.market.fanout.deliver(&tm.farmer, &placed).await.unwrap(), Delivery::Failed);
  tm.notifier.fail_from_now(false);

  assert_eq!(tm.market.fanout.deliver(&tm.farmer, &placed).await.unwrap(), Delivery::AlreadySent);
  assert_eq!(tm.notifier.count(), 0);
}

#[tokio::test]
async fn confirmation_rearms_and_fires_once_per_milestone() {
  let tm = market().await;
  let fish = list_product(&tm, &tm.farmer, "Catfish", 2500, 4).await;
  let placed = place_order(&tm, &tm.buyer, &fish, 1).await;
  let fanout = &tm.market.fanout;

  let confirmed = tm.market.orders.confirm(&tm.farmer, placed.id()).await.unwrap();
  assert_eq!(fanout.deliver(&tm.buyer, &confirmed).await.unwrap(), Delivery::Displayed);
  let delivered = tm.market.orders.deliver(&tm.farmer, placed.id()).await.unwrap();
  assert!(!delivered.notification_sent().delivered);
  assert_eq!(fanout.deliver(&tm.buyer, &delivered).await.unwrap(), Delivery::Displayed);
  assert_eq!(fanout.deliver(&tm.buyer, &delivered).await.unwrap(), Delivery::AlreadySent);

  let titles: Vec<_> = tm
    .notifier
    .shown_to(tm.buyer.user_id)
    .into_iter()
    .map(|n| n.title)
    .collect();
  assert_eq!(titles, vec!["Order Confirmed", "Order Delivered"]);
}

#[tokio::test]
async fn subscriptions_follow_live_changes_for_both_parties() {
  let tm = market().await;
  let seller_sub = tm.market.fanout.subscribe(tm.farmer.clone());
  let buyer_sub = tm.market.fanout.subscribe(tm.buyer.clone());
  assert!(seller_sub.is_active() && buyer_sub.is_active());

  let eggs = list_product(&tm, &tm.farmer, "Eggs", 300, 30).await;
  let placed = place_order(&tm, &tm.buyer, &eggs, 2).await;
  let notifier = tm.notifier.clone();
  let farmer_id = tm.farmer.user_id;
  assert!(eventually(|| notifier.shown_to(farmer_id).len() == 1).await);

  tm.market.orders.confirm(&tm.farmer, placed.id()).await.unwrap();
  let buyer_id = tm.buyer.user_id;
  assert!(eventually(|| notifier.shown_to(buyer_id).len() == 1).await);

  tm.market.orders.deliver(&tm.farmer, placed.id()).await.unwrap();
  assert!(eventually(|| notifier.shown_to(buyer_id).len() == 2).await);

  // Let any stray re-deliveries (the claim writes publish too) settle.
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(notifier.count(), 3);
  drop(seller_sub);
  buyer_sub.unsubscribe();
}

#[tokio::test]
async fn subscribing_replays_pending_milestones() {
  let tm = market().await;
  let honey = list_product(&tm, &tm.farmer, "Honey", 3000, 5).await;
  place_order(&tm, &tm.buyer, &honey, 1).await;
  place_order(&tm, &tm.other_buyer, &honey, 1).await;

  let _sub = tm.market.fanout.subscribe(tm.farmer.clone());
  let notifier = tm.notifier.clone();
  assert!(eventually(|| notifier.count() == 2).await);
}

#[tokio::test]
async fn dropped_subscriptions_stop_listening() {
  let tm = market().await;
  let corn = list_product(&tm, &tm.farmer, "Corn", 50, 10).await;
  let sub = tm.market.fanout.subscribe(tm.farmer.clone());
  drop(sub);

  place_order(&tm, &tm.buyer, &corn, 1).await;
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(tm.notifier.count(), 0);
}

#[tokio::test]
async fn a_lagging_listener_resyncs_without_duplicates() {
  setup_tracing();
  let memory = Arc::new(MemoryStore::with_feed_capacity(1));
  let tm = market_on(memory.clone()).await;
  let fanout = NotificationFanout::new(memory, tm.notifier.clone(), 100);
  let beans = list_product(&tm, &tm.farmer, "Beans", 400, 50).await;

  let _sub = fanout.subscribe(tm.farmer.clone());
  // The listener has not run yet on this single-threaded runtime, so the
  // one-slot feed overflows.
  for _ in 0..5 {
    place_order(&tm, &tm.buyer, &beans, 1).await;
  }

  let notifier = tm.notifier.clone();
  assert!(eventually(|| notifier.count() == 5).await);
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(notifier.count(), 5);
}
