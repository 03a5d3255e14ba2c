// server/src/web/handlers/auth_handlers.rs

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use farmgate::{NewAccount, ProfileUpdate, Role, Session, StoreProfile, User, UserId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::services::auth_service::{hash_password, verify_password};
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

// --- Request DTOs ---

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccountType {
  #[default]
  User,
  Farmer,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequestPayload {
  pub email: String,
  pub password: String,
  pub first_name: String,
  pub last_name: String,
  #[serde(default)]
  pub phone_no: String,
  #[serde(default)]
  pub address: String,
  #[serde(default)]
  pub account_type: AccountType,
  /// Required for farmers.
  pub store: Option<StoreProfile>,
}

#[derive(Deserialize)]
pub struct SigninRequestPayload {
  pub email: String,
  pub password: String,
}

// --- Response DTOs ---

/// A user as shown to clients: everything but the password hash.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
  pub id: UserId,
  pub email: String,
  pub first_name: String,
  pub last_name: String,
  pub phone_no: String,
  pub address: String,
  #[serde(rename = "type")]
  pub account_type: &'static str,
  pub store: Option<StoreProfile>,
  pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
  fn from(user: &User) -> Self {
    let (account_type, store) = match &user.role {
      Role::Buyer => ("User", None),
      Role::Seller { store } => ("Farmer", Some(store.clone())),
    };
    Self {
      id: user.id,
      email: user.email.clone(),
      first_name: user.first_name.clone(),
      last_name: user.last_name.clone(),
      phone_no: user.phone_no.clone(),
      address: user.address.clone(),
      account_type,
      store,
      created_at: user.created_at,
    }
  }
}

fn role_for(account_type: AccountType, store: Option<StoreProfile>) -> Result<Role, AppError> {
  match (account_type, store) {
    (AccountType::User, None) => Ok(Role::Buyer),
    (AccountType::User, Some(_)) => Err(AppError::Validation("Only farmers have a store.".to_string())),
    (AccountType::Farmer, Some(store)) => Ok(Role::Seller { store }),
    (AccountType::Farmer, None) => Err(AppError::Validation("Farmers must describe their store.".to_string())),
  }
}

// --- Handler Implementations ---

#[instrument(
    name = "handler::signup",
    skip(app_state, req_payload),
    fields(req_email = %req_payload.email, account_type = ?req_payload.account_type)
)]
pub async fn signup_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<SignupRequestPayload>,
) -> Result<HttpResponse, AppError> {
  let payload = req_payload.into_inner();
  let role = role_for(payload.account_type, payload.store)?;
  let password_hash = hash_password(&payload.password)?;

  let user = app_state
    .market
    .accounts
    .register(NewAccount {
      email: payload.email,
      first_name: payload.first_name,
      last_name: payload.last_name,
      phone_no: payload.phone_no,
      address: payload.address,
      role,
      password_hash,
    })
    .await?;

  info!(user_id = %user.id, "Account created.");
  Ok(HttpResponse::Created().json(UserView::from(&user)))
}

#[instrument(name = "handler::signin", skip(app_state, req_payload), fields(req_email = %req_payload.email))]
pub async fn signin_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<SigninRequestPayload>,
) -> Result<HttpResponse, AppError> {
  let rejected = || AppError::Auth("Invalid email or password.".to_string());

  let Some(user) = app_state.market.accounts.by_email(&req_payload.email).await? else {
    warn!("Sign-in for unknown email.");
    return Err(rejected());
  };
  if !verify_password(&user.password_hash, &req_payload.password)? {
    warn!(user_id = %user.id, "Sign-in with wrong password.");
    return Err(rejected());
  }

  let issued = app_state.sessions.open(Session::for_user(&user));
  info!(user_id = %user.id, "Signed in.");
  Ok(HttpResponse::Ok().json(json!({
    "token": issued.token,
    "expiresAt": issued.expires_at,
    "user": UserView::from(&user),
  })))
}

#[instrument(name = "handler::signout", skip_all, fields(user_id = %auth_user.session.user_id))]
pub async fn signout_handler(app_state: web::Data<AppState>, auth_user: AuthenticatedUser) -> HttpResponse {
  app_state.sessions.close(&auth_user.token);
  HttpResponse::NoContent().finish()
}

#[instrument(name = "handler::me", skip_all, fields(user_id = %auth_user.session.user_id))]
pub async fn me_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let user = app_state.market.accounts.get(auth_user.session.user_id).await?;
  Ok(HttpResponse::Ok().json(UserView::from(&user)))
}

#[instrument(name = "handler::update_profile", skip_all, fields(user_id = %auth_user.session.user_id))]
pub async fn update_profile_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, AppError> {
  let user = app_state
    .market
    .accounts
    .update_profile(&auth_user.session, req_payload.into_inner())
    .await?;
  app_state.sessions.refresh(&auth_user.token, Session::for_user(&user));
  Ok(HttpResponse::Ok().json(UserView::from(&user)))
}
