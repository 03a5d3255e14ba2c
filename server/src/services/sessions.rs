// server/src/services/sessions.rs

//! Bearer-token sessions.
//!
//! Each signed-in session owns a notification [`Subscription`]; removing the
//! session (sign-out, expiry, purge) drops it, which stops the listener.

use chrono::{DateTime, Duration, Utc};
use farmgate::{NotificationFanout, Session, Subscription};
use parking_lot::Mutex;
use rand_core::{OsRng, RngCore};
use std::collections::HashMap;
use tracing::{debug, info};

const TOKEN_BYTES: usize = 32;

struct Entry {
  session: Session,
  expires_at: DateTime<Utc>,
  _subscription: Subscription,
}

pub struct SessionRegistry {
  ttl: Duration,
  fanout: NotificationFanout,
  entries: Mutex<HashMap<String, Entry>>,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
  pub token: String,
  pub expires_at: DateTime<Utc>,
}

fn new_token() -> String {
  let mut bytes = [0u8; TOKEN_BYTES];
  OsRng.fill_bytes(&mut bytes);
  bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl SessionRegistry {
  pub fn new(fanout: NotificationFanout, ttl: Duration) -> Self {
    Self {
      ttl,
      fanout,
      entries: Mutex::new(HashMap::new()),
    }
  }

  /// Starts a session and its notification listener. Must run inside the tokio runtime.
  pub fn open(&self, session: Session) -> IssuedToken {
    let token = new_token();
    let expires_at = Utc::now() + self.ttl;
    let subscription = self.fanout.subscribe(session.clone());
    info!(user_id = %session.user_id, %expires_at, "Session opened.");
    self.entries.lock().insert(
      token.clone(),
      Entry {
        session,
        expires_at,
        _subscription: subscription,
      },
    );
    IssuedToken { token, expires_at }
  }

  /// The live session behind `token`. An expired token is removed on sight.
  pub fn resolve(&self, token: &str) -> Option<Session> {
    let mut entries = self.entries.lock();
    let found = entries
      .get(token)
      .map(|entry| (entry.expires_at > Utc::now(), entry.session.clone()));
    match found {
      Some((true, session)) => Some(session),
      Some((false, _)) => {
        entries.remove(token);
        debug!("Expired session token presented.");
        None
      }
      None => None,
    }
  }

  /// Keeps the session's display name and role in step with a profile edit.
  pub fn refresh(&self, token: &str, session: Session) {
    if let Some(entry) = self.entries.lock().get_mut(token) {
      entry.session = session;
    }
  }

  pub fn close(&self, token: &str) -> bool {
    let removed = self.entries.lock().remove(token);
    if let Some(entry) = &removed {
      info!(user_id = %entry.session.user_id, "Session closed.");
    }
    removed.is_some()
  }

  /// Drops every expired session. Returns how many were removed.
  pub fn purge_expired(&self) -> usize {
    let now = Utc::now();
    let mut entries = self.entries.lock();
    let before = entries.len();
    entries.retain(|_, entry| entry.expires_at > now);
    let purged = before - entries.len();
    if purged > 0 {
      info!(purged, "Expired sessions purged.");
    }
    purged
  }

  pub fn active(&self) -> usize {
    self.entries.lock().len()
  }
}
