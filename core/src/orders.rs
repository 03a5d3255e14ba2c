// core/src/orders.rs

//! Status changes and the buyer/seller views of orders.

use crate::config::RetryConfig;
use crate::error::{MarketError, MarketResult};
use crate::model::{Order, OrderId, OrderStatus, UserId};
use crate::retry::with_conflict_retry;
use crate::session::{Party, Session};
use crate::store::{DocumentStore, OrderFilter, WriteBatch};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// A seller's orders from one customer, newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerOrders {
  pub buyer_id: UserId,
  pub customer_name: String,
  pub orders: Vec<Order>,
}

/// One line of the activity feed: where an order currently stands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
  pub order_id: OrderId,
  pub store_name: String,
  pub status: OrderStatus,
  pub date: DateTime<Utc>,
  pub total_cents: i64,
}

#[derive(Clone)]
pub struct OrderService {
  store: Arc<dyn DocumentStore>,
  retry: RetryConfig,
}

impl OrderService {
  pub fn new(store: Arc<dyn DocumentStore>, retry: RetryConfig) -> Self {
    Self { store, retry }
  }

  /// Seller accepts a placed order.
  pub async fn confirm(&self, session: &Session, id: OrderId) -> MarketResult<Order> {
    session.require_seller()?;
    self.transition(session, id, OrderStatus::OrderConfirmed).await
  }

  /// Seller turns down a placed order.
  pub async fn reject(&self, session: &Session, id: OrderId) -> MarketResult<Order> {
    session.require_seller()?;
    self.transition(session, id, OrderStatus::Canceled).await
  }

  /// Buyer withdraws a placed order.
  pub async fn cancel(&self, session: &Session, id: OrderId) -> MarketResult<Order> {
    session.require_buyer()?;
    self.transition(session, id, OrderStatus::Canceled).await
  }

  pub async fn deliver(&self, session: &Session, id: OrderId) -> MarketResult<Order> {
    session.require_seller()?;
    self.transition(session, id, OrderStatus::Delivered).await
  }

  /// Read-modify-write of one order, re-read from scratch after a conflict so
  /// a concurrent change by the other party is seen before deciding again.
  #[instrument(name = "orders::transition", skip(self, session), fields(user = %session.user_id), err(Display))]
  async fn transition(&self, session: &Session, id: OrderId, to: OrderStatus) -> MarketResult<Order> {
    let party = session.party();
    let order = with_conflict_retry(&self.retry, "orders::transition", |_| async move {
      let current = self.store.order(id).await?.ok_or_else(|| MarketError::not_found("order", id))?;
      let actor = party
        .actor_on(&current.value)
        .ok_or_else(|| MarketError::not_found("order", id))?;
      let expect = current.expect();
      let mut order = current.value;
      // Keep history dates non-decreasing even if clocks disagree.
      let at = order.latest_entry().map_or_else(Utc::now, |last| last.date.max(Utc::now()));
      order.advance(to, actor, at)?;

      let mut batch = WriteBatch::new();
      batch.put_order(order.clone(), expect);
      self.store.commit(batch).await?;
      Ok(order)
    })
    .await?;

    info!(order_id = %id, status = %order.status(), history = order.history().len(), "Order status changed.");
    Ok(order)
  }

  /// An order as seen by one of its two parties. Anyone else gets `NotFound`.
  pub async fn order(&self, session: &Session, id: OrderId) -> MarketResult<Order> {
    let party = session.party();
    match self.store.order(id).await? {
      Some(doc) if party.actor_on(&doc.value).is_some() => Ok(doc.value),
      _ => Err(MarketError::not_found("order", id)),
    }
  }

  /// Buyers see their orders oldest first, sellers newest first.
  #[instrument(name = "orders::list", skip(self, session), fields(user = %session.user_id), err(Display))]
  pub async fn orders_for(&self, session: &Session) -> MarketResult<Vec<Order>> {
    let party = session.party();
    let mut orders: Vec<Order> = self
      .store
      .orders(&OrderFilter::for_party(party))
      .await?
      .into_iter()
      .map(|doc| doc.value)
      .collect();
    if let Party::Seller(_) = party {
      orders.reverse();
    }
    Ok(orders)
  }

  /// The seller's orders grouped by customer. Groups follow each customer's most recent order.
  #[instrument(name = "orders::by_customer", skip(self, session), fields(user = %session.user_id), err(Display))]
  pub async fn orders_by_customer(&self, session: &Session) -> MarketResult<Vec<CustomerOrders>> {
    let store_id = session.require_seller()?;
    let docs = self.store.orders(&OrderFilter::for_party(Party::Seller(store_id))).await?;

    let mut groups: Vec<CustomerOrders> = Vec::new();
    let mut index: HashMap<UserId, usize> = HashMap::new();
    for order in docs.into_iter().rev().map(|doc| doc.value) {
      let buyer_id = order.buyer_id();
      let slot = match index.get(&buyer_id) {
        Some(slot) => *slot,
        None => {
          let customer_name = match self.store.user(buyer_id).await? {
            Some(user) => user.value.display_name(),
            None => {
              warn!(buyer_id = %buyer_id, "Order references a missing customer account.");
              "Unknown".to_string()
            }
          };
          groups.push(CustomerOrders {
            buyer_id,
            customer_name,
            orders: Vec::new(),
          });
          index.insert(buyer_id, groups.len() - 1);
          groups.len() - 1
        }
      };
      groups[slot].orders.push(order);
    }
    Ok(groups)
  }

  /// Latest status of every order of the session's party, most recent change first.
  #[instrument(name = "orders::activity", skip(self, session), fields(user = %session.user_id), err(Display))]
  pub async fn activity(&self, session: &Session) -> MarketResult<Vec<ActivityEntry>> {
    let docs = self.store.orders(&OrderFilter::for_party(session.party())).await?;
    let mut entries: Vec<ActivityEntry> = docs
      .iter()
      .filter_map(|doc| {
        let order = &doc.value;
        order.latest_entry().map(|latest| ActivityEntry {
          order_id: order.id(),
          store_name: order.store_name().to_string(),
          status: latest.status,
          date: latest.date,
          total_cents: order.total_cents(),
        })
      })
      .collect();
    entries.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(entries)
  }
}
