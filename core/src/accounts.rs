// core/src/accounts.rs

//! Buyer and farmer accounts. Credentials are hashed by the caller; this
//! module only stores the opaque hash.

use crate::config::RetryConfig;
use crate::error::{MarketError, MarketResult};
use crate::model::{Role, StoreProfile, User, UserId};
use crate::retry::with_conflict_retry;
use crate::session::Session;
use crate::store::{DocumentStore, Expect, WriteBatch};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct NewAccount {
  pub email: String,
  pub first_name: String,
  pub last_name: String,
  pub phone_no: String,
  pub address: String,
  pub role: Role,
  pub password_hash: String,
}

/// Fields left `None` are kept. `store` is only accepted from farmers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
  pub first_name: Option<String>,
  pub last_name: Option<String>,
  pub phone_no: Option<String>,
  pub address: Option<String>,
  pub store: Option<StoreProfile>,
}

#[derive(Clone)]
pub struct AccountService {
  store: Arc<dyn DocumentStore>,
  retry: RetryConfig,
}

impl AccountService {
  pub fn new(store: Arc<dyn DocumentStore>) -> Self {
    Self {
      store,
      retry: RetryConfig::default(),
    }
  }

  #[instrument(name = "accounts::register", skip(self, new), fields(email = %new.email), err(Display))]
  pub async fn register(&self, new: NewAccount) -> MarketResult<User> {
    let email = normalize_email(&new.email)?;
    if new.password_hash.is_empty() {
      return Err(MarketError::Validation("a password is required".to_string()));
    }
    if let Role::Seller { store } = &new.role {
      if store.name.trim().is_empty() {
        return Err(MarketError::Validation("a farm needs a store name".to_string()));
      }
    }
    if self.store.user_by_email(&email).await?.is_some() {
      return Err(MarketError::Validation(format!("{} is already registered", email)));
    }

    let user = User {
      id: UserId::new(),
      email: email.clone(),
      first_name: new.first_name.trim().to_string(),
      last_name: new.last_name.trim().to_string(),
      phone_no: new.phone_no.trim().to_string(),
      address: new.address.trim().to_string(),
      password_hash: new.password_hash,
      role: new.role,
      created_at: Utc::now(),
    };
    let mut batch = WriteBatch::new();
    batch.put_user(user.clone(), Expect::Absent);
    // The store re-checks email uniqueness at commit; losing that race reads as a duplicate.
    self.store.commit(batch).await.map_err(|e| {
      if e.is_conflict() {
        MarketError::Validation(format!("{} is already registered", email))
      } else {
        e.into()
      }
    })?;

    info!(user_id = %user.id, farmer = user.store_id().is_some(), "Account registered.");
    Ok(user)
  }

  pub async fn by_email(&self, email: &str) -> MarketResult<Option<User>> {
    Ok(self.store.user_by_email(email.trim()).await?.map(|doc| doc.value))
  }

  pub async fn get(&self, id: UserId) -> MarketResult<User> {
    self
      .store
      .user(id)
      .await?
      .map(|doc| doc.value)
      .ok_or_else(|| MarketError::not_found("user", id))
  }

  #[instrument(name = "accounts::update_profile", skip(self, session, update), fields(user = %session.user_id), err(Display))]
  pub async fn update_profile(&self, session: &Session, update: ProfileUpdate) -> MarketResult<User> {
    let user_id = session.user_id;
    let update = &update;
    with_conflict_retry(&self.retry, "accounts::update_profile", |_| async move {
      let current = self
        .store
        .user(user_id)
        .await?
        .ok_or_else(|| MarketError::not_found("user", user_id))?;
      let expect = current.expect();
      let mut user = current.value;

      if let Some(first_name) = &update.first_name {
        user.first_name = first_name.trim().to_string();
      }
      if let Some(last_name) = &update.last_name {
        user.last_name = last_name.trim().to_string();
      }
      if let Some(phone_no) = &update.phone_no {
        user.phone_no = phone_no.trim().to_string();
      }
      if let Some(address) = &update.address {
        user.address = address.trim().to_string();
      }
      if let Some(profile) = &update.store {
        match &mut user.role {
          Role::Seller { store } => {
            if profile.name.trim().is_empty() {
              return Err(MarketError::Validation("a farm needs a store name".to_string()));
            }
            *store = profile.clone();
          }
          Role::Buyer => {
            return Err(MarketError::Forbidden("only farmer accounts have a store".to_string()));
          }
        }
      }

      let mut batch = WriteBatch::new();
      batch.put_user(user.clone(), expect);
      self.store.commit(batch).await?;
      Ok(user)
    })
    .await
  }
}

fn normalize_email(email: &str) -> MarketResult<String> {
  let email = email.trim().to_ascii_lowercase();
  match email.split_once('@') {
    Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
    _ => Err(MarketError::Validation(format!("'{}' is not a valid email address", email))),
  }
}
