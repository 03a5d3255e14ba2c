// core/src/notify/fanout.rs

use super::{watched_milestones, Notification, Notifier};
use crate::error::MarketResult;
use crate::model::{Order, OrderStatus, UserId};
use crate::session::Session;
use crate::store::{DocumentStore, OrderFilter};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// What happened to one order snapshot handed to [`NotificationFanout::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
  /// This call claimed the milestone and the notifier displayed it.
  Displayed,
  /// This call claimed the milestone but the notifier failed. The claim stands.
  Failed,
  /// The milestone was already claimed, here or by a concurrent delivery.
  AlreadySent,
  /// Not an order of this party, or not a milestone it watches.
  Ignored,
}

#[derive(Clone)]
pub struct NotificationFanout {
  store: Arc<dyn DocumentStore>,
  notifier: Arc<dyn Notifier>,
  resync_limit: usize,
}

impl NotificationFanout {
  pub fn new(store: Arc<dyn DocumentStore>, notifier: Arc<dyn Notifier>, resync_limit: usize) -> Self {
    Self {
      store,
      notifier,
      resync_limit,
    }
  }

  /// Notifies the session's user about `order` if it reached a milestone they
  /// watch and nobody has claimed that milestone yet.
  pub async fn deliver(&self, session: &Session, order: &Order) -> MarketResult<Delivery> {
    let party = session.party();
    if party.actor_on(order).is_none() {
      return Ok(Delivery::Ignored);
    }
    let Some(milestone) = order
      .status()
      .milestone()
      .filter(|m| watched_milestones(&party).contains(m))
    else {
      return Ok(Delivery::Ignored);
    };
    if order.notification_sent().get(milestone) {
      return Ok(Delivery::AlreadySent);
    }
    if !self.store.claim_notification(order.id(), milestone).await? {
      debug!(order_id = %order.id(), ?milestone, "Milestone already claimed.");
      return Ok(Delivery::AlreadySent);
    }

    let customer = self.customer_name(order.buyer_id()).await;
    let notification = Notification::for_milestone(order, milestone, &customer);
    match self.notifier.display(session.user_id, &notification).await {
      Ok(()) => {
        info!(order_id = %order.id(), ?milestone, recipient = %session.user_id, "Notification displayed.");
        Ok(Delivery::Displayed)
      }
      Err(e) => {
        warn!(order_id = %order.id(), ?milestone, error = %e, "Notification display failed; not retrying.");
        Ok(Delivery::Failed)
      }
    }
  }

  async fn customer_name(&self, buyer: UserId) -> String {
    match self.store.user(buyer).await {
      Ok(Some(user)) => user.value.display_name(),
      Ok(None) => "Unknown".to_string(),
      Err(e) => {
        warn!(buyer_id = %buyer, error = %e, "Could not load customer for notification text.");
        "Unknown".to_string()
      }
    }
  }

  /// Delivers every pending milestone among the party's most recent orders.
  pub async fn resync(&self, session: &Session) -> MarketResult<usize> {
    let party = session.party();
    let statuses: Vec<OrderStatus> = watched_milestones(&party).iter().map(|m| m.status()).collect();
    let filter = OrderFilter::for_party(party)
      .with_statuses(statuses)
      .with_limit(self.resync_limit);
    let mut displayed = 0;
    for doc in self.store.orders(&filter).await? {
      if self.deliver(session, &doc.value).await? == Delivery::Displayed {
        displayed += 1;
      }
    }
    Ok(displayed)
  }

  /// Starts a standing listener for the session's user.
  ///
  /// The change feed is joined before the snapshot is read, so an order written
  /// in between is seen at least once. Must be called inside a tokio runtime.
  pub fn subscribe(&self, session: Session) -> Subscription {
    let mut feed = self.store.watch_orders();
    let fanout = self.clone();
    let user_id = session.user_id;
    let span = info_span!("fanout", user = %user_id);

    let handle = tokio::spawn(
      async move {
        fanout.resync_logged(&session).await;
        loop {
          match feed.recv().await {
            Ok(order) => {
              if let Err(e) = fanout.deliver(&session, &order).await {
                error!(order_id = %order.id(), error = %e, "Failed to process order change.");
              }
            }
            Err(RecvError::Lagged(skipped)) => {
              warn!(skipped, "Order feed lagged; resynchronising.");
              fanout.resync_logged(&session).await;
            }
            Err(RecvError::Closed) => {
              debug!("Order feed closed.");
              break;
            }
          }
        }
      }
      .instrument(span),
    );

    debug!(user = %user_id, "Notification subscription started.");
    Subscription { user_id, handle }
  }

  async fn resync_logged(&self, session: &Session) {
    match self.resync(session).await {
      Ok(displayed) => debug!(displayed, "Resynchronised pending notifications."),
      Err(e) => error!(error = %e, "Notification resync failed."),
    }
  }
}

/// Handle of a running listener. Dropping it stops the listener.
pub struct Subscription {
  user_id: UserId,
  handle: JoinHandle<()>,
}

impl Subscription {
  pub fn user_id(&self) -> UserId {
    self.user_id
  }

  pub fn is_active(&self) -> bool {
    !self.handle.is_finished()
  }

  pub fn unsubscribe(self) {
    // Drop does the work.
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

impl std::fmt::Debug for Subscription {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("user_id", &self.user_id)
      .field("active", &self.is_active())
      .finish()
  }
}
