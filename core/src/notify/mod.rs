// core/src/notify/mod.rs

//! Order-milestone notifications for the counterpart party.
//!
//! Sellers hear about new orders on their store; buyers hear when their order
//! is confirmed and when it is delivered. Each (order, milestone) pair is shown
//! at most once: the milestone flag on the order is claimed with a
//! compare-and-swap before anything is displayed.

mod fanout;

pub use self::fanout::{Delivery, NotificationFanout, Subscription};
pub use crate::model::Milestone;

use crate::model::{Order, OrderId, UserId};
use crate::session::Party;
use async_trait::async_trait;
use serde::Serialize;

/// The push/display service. Failures are reported, never retried.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn display(&self, recipient: UserId, notification: &Notification) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub order_id: OrderId,
  pub milestone: Milestone,
  pub title: String,
  pub body: String,
}

impl Notification {
  /// Text shown for `milestone` of `order`. `customer` names the buyer in seller-facing texts.
  pub fn for_milestone(order: &Order, milestone: Milestone, customer: &str) -> Self {
    let (title, body) = match milestone {
      Milestone::OrderPlaced => (
        "New Order Received!".to_string(),
        format!(
          "Order ID: {} placed by {}. Review and prepare the order.",
          order.id(),
          customer
        ),
      ),
      Milestone::OrderConfirmed => (
        "Order Confirmed".to_string(),
        format!("Your order {} with {} has been confirmed.", order.id(), order.store_name()),
      ),
      Milestone::Delivered => (
        "Order Delivered".to_string(),
        format!("Your order {} from {} has been delivered.", order.id(), order.store_name()),
      ),
    };
    Self {
      order_id: order.id(),
      milestone,
      title,
      body,
    }
  }
}

/// Milestones a party is told about.
pub fn watched_milestones(party: &Party) -> &'static [Milestone] {
  match party {
    Party::Seller(_) => &[Milestone::OrderPlaced],
    Party::Buyer(_) => &[Milestone::OrderConfirmed, Milestone::Delivered],
  }
}
