// server/src/services/push_mock.rs

//! Stand-in for the device push service: logs each notification and keeps a
//! short per-user inbox that `/notifications` exposes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use farmgate::{Notification, Notifier, UserId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{info, warn};

const INBOX_CAPACITY: usize = 100;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushedNotification {
  pub message_id: String,
  pub shown_at: DateTime<Utc>,
  #[serde(flatten)]
  pub notification: Notification,
}

#[derive(Default)]
pub struct PushMock {
  inboxes: Mutex<HashMap<UserId, VecDeque<PushedNotification>>>,
}

impl PushMock {
  pub fn new() -> Self {
    Self::default()
  }

  /// Newest first.
  pub fn inbox(&self, user: UserId) -> Vec<PushedNotification> {
    self
      .inboxes
      .lock()
      .get(&user)
      .map(|inbox| inbox.iter().rev().cloned().collect())
      .unwrap_or_default()
  }
}

#[async_trait]
impl Notifier for PushMock {
  async fn display(&self, recipient: UserId, notification: &Notification) -> anyhow::Result<()> {
    tokio::time::sleep(Duration::from_millis(5)).await; // Simulate device latency

    if notification.body.to_lowercase().contains("fail_test") {
      warn!(%recipient, order_id = %notification.order_id, "Simulated push failure.");
      anyhow::bail!("Simulated push delivery failure");
    }

    let pushed = PushedNotification {
      message_id: format!("mock_push_{}", uuid::Uuid::new_v4()),
      shown_at: Utc::now(),
      notification: notification.clone(),
    };
    info!(
      %recipient,
      order_id = %notification.order_id,
      title = %notification.title,
      message_id = %pushed.message_id,
      "Push notification shown."
    );

    let mut inboxes = self.inboxes.lock();
    let inbox = inboxes.entry(recipient).or_default();
    if inbox.len() == INBOX_CAPACITY {
      inbox.pop_front();
    }
    inbox.push_back(pushed);
    Ok(())
  }
}
