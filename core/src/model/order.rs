// core/src/model/order.rs

use super::ids::{OrderId, ProductId, StoreId, UserId};
use crate::error::{MarketError, MarketResult};
use crate::lifecycle::{self, Actor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
  #[serde(rename = "Order Placed")]
  OrderPlaced,
  #[serde(rename = "Order Confirmed")]
  OrderConfirmed,
  #[serde(rename = "Delivered")]
  Delivered,
  #[serde(rename = "Canceled")]
  Canceled,
}

impl OrderStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      OrderStatus::OrderPlaced => "Order Placed",
      OrderStatus::OrderConfirmed => "Order Confirmed",
      OrderStatus::Delivered => "Delivered",
      OrderStatus::Canceled => "Canceled",
    }
  }

  /// The notification milestone reached when an order enters this status.
  pub fn milestone(&self) -> Option<Milestone> {
    match self {
      OrderStatus::OrderPlaced => Some(Milestone::OrderPlaced),
      OrderStatus::OrderConfirmed => Some(Milestone::OrderConfirmed),
      OrderStatus::Delivered => Some(Milestone::Delivered),
      OrderStatus::Canceled => None,
    }
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Order statuses that notify the counterpart party, one flag each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Milestone {
  OrderPlaced,
  OrderConfirmed,
  Delivered,
}

impl Milestone {
  /// Name of the flag inside the serialized `notificationSent` object.
  pub fn flag_name(&self) -> &'static str {
    match self {
      Milestone::OrderPlaced => "orderPlaced",
      Milestone::OrderConfirmed => "orderConfirmed",
      Milestone::Delivered => "delivered",
    }
  }

  pub fn status(&self) -> OrderStatus {
    match self {
      Milestone::OrderPlaced => OrderStatus::OrderPlaced,
      Milestone::OrderConfirmed => OrderStatus::OrderConfirmed,
      Milestone::Delivered => OrderStatus::Delivered,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFlags {
  pub order_placed: bool,
  pub order_confirmed: bool,
  pub delivered: bool,
}

impl NotificationFlags {
  pub fn get(&self, milestone: Milestone) -> bool {
    match milestone {
      Milestone::OrderPlaced => self.order_placed,
      Milestone::OrderConfirmed => self.order_confirmed,
      Milestone::Delivered => self.delivered,
    }
  }

  fn set(&mut self, milestone: Milestone, value: bool) {
    match milestone {
      Milestone::OrderPlaced => self.order_placed = value,
      Milestone::OrderConfirmed => self.order_confirmed = value,
      Milestone::Delivered => self.delivered = value,
    }
  }
}

/// Snapshot of a product at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
  pub product_id: ProductId,
  pub name: String,
  pub price_cents: i64,
  pub quantity: u32,
}

impl OrderLine {
  pub fn subtotal_cents(&self) -> Option<i64> {
    self.price_cents.checked_mul(i64::from(self.quantity))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
  pub status: OrderStatus,
  pub date: DateTime<Utc>,
}

/// One store's share of a checkout.
///
/// Fields are private: an order is created by [`Order::place`] and changed only
/// by [`Order::advance`], which keeps `status` equal to the last history entry
/// and `history` append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  id: OrderId,
  buyer_id: UserId,
  store_id: StoreId,
  store_name: String,
  items: Vec<OrderLine>,
  total_cents: i64,
  status: OrderStatus,
  history: Vec<HistoryEntry>,
  notification_sent: NotificationFlags,
  created_at: DateTime<Utc>,
}

impl Order {
  /// A freshly placed order: status `OrderPlaced`, one history entry, no notification sent.
  pub fn place(
    id: OrderId,
    buyer_id: UserId,
    store_id: StoreId,
    store_name: impl Into<String>,
    items: Vec<OrderLine>,
    now: DateTime<Utc>,
  ) -> MarketResult<Self> {
    if items.is_empty() {
      return Err(MarketError::Validation("an order needs at least one item".to_string()));
    }
    if let Some(line) = items.iter().find(|l| l.quantity == 0) {
      return Err(MarketError::Validation(format!("'{}' has a zero quantity", line.name)));
    }
    let total_cents = sum_lines(&items)
      .ok_or_else(|| MarketError::Validation("order total does not fit in a 64-bit amount".to_string()))?;

    Ok(Self {
      id,
      buyer_id,
      store_id,
      store_name: store_name.into(),
      items,
      total_cents,
      status: OrderStatus::OrderPlaced,
      history: vec![HistoryEntry {
        status: OrderStatus::OrderPlaced,
        date: now,
      }],
      notification_sent: NotificationFlags::default(),
      created_at: now,
    })
  }

  /// Moves the order to `to` on behalf of `actor`, appending exactly one history entry.
  ///
  /// Entering a milestone status re-arms that milestone's notification flag so
  /// the fanout fires once for it.
  pub fn advance(&mut self, to: OrderStatus, actor: Actor, at: DateTime<Utc>) -> MarketResult<()> {
    lifecycle::authorize(self.id, self.status, to, actor)?;
    self.status = to;
    self.history.push(HistoryEntry { status: to, date: at });
    if let Some(milestone) = to.milestone() {
      self.notification_sent.set(milestone, false);
    }
    Ok(())
  }

  /// Sets the milestone flag. Returns false if it was already set.
  pub(crate) fn mark_notified(&mut self, milestone: Milestone) -> bool {
    if self.notification_sent.get(milestone) {
      return false;
    }
    self.notification_sent.set(milestone, true);
    true
  }

  pub fn id(&self) -> OrderId {
    self.id
  }

  pub fn buyer_id(&self) -> UserId {
    self.buyer_id
  }

  pub fn store_id(&self) -> StoreId {
    self.store_id
  }

  pub fn store_name(&self) -> &str {
    &self.store_name
  }

  pub fn items(&self) -> &[OrderLine] {
    &self.items
  }

  pub fn total_cents(&self) -> i64 {
    self.total_cents
  }

  pub fn status(&self) -> OrderStatus {
    self.status
  }

  /// Insertion order, which is the canonical replay order.
  pub fn history(&self) -> &[HistoryEntry] {
    &self.history
  }

  /// History for display: newest first, ties keep insertion order reversed.
  pub fn history_newest_first(&self) -> Vec<HistoryEntry> {
    let mut entries: Vec<(usize, HistoryEntry)> = self.history.iter().copied().enumerate().collect();
    entries.sort_by(|(ia, a), (ib, b)| b.date.cmp(&a.date).then(ib.cmp(ia)));
    entries.into_iter().map(|(_, e)| e).collect()
  }

  pub fn latest_entry(&self) -> Option<&HistoryEntry> {
    self.history.last()
  }

  pub fn notification_sent(&self) -> NotificationFlags {
    self.notification_sent
  }

  pub fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  pub fn contains_product(&self, product: ProductId) -> bool {
    self.items.iter().any(|l| l.product_id == product)
  }

  /// True when `total_cents` equals the line sum and `status` equals the last history entry.
  pub fn is_consistent(&self) -> bool {
    sum_lines(&self.items) == Some(self.total_cents) && self.history.last().map(|e| e.status) == Some(self.status)
  }
}

fn sum_lines(items: &[OrderLine]) -> Option<i64> {
  items
    .iter()
    .try_fold(0i64, |acc, line| line.subtotal_cents().and_then(|s| acc.checked_add(s)))
}
