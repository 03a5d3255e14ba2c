// server/src/web/handlers/checkout_handlers.rs

use actix_web::{web, HttpResponse};
use farmgate::CartSelection;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Deserialize, Debug)]
pub struct CheckoutRequestPayload {
  pub selections: Vec<CartSelection>,
}

#[instrument(
    name = "handler::checkout",
    skip(app_state, auth_user, req_payload),
    fields(user_id = %auth_user.session.user_id, lines = req_payload.selections.len())
)]
pub async fn checkout_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<CheckoutRequestPayload>,
) -> Result<HttpResponse, AppError> {
  let receipt = app_state
    .market
    .checkout
    .checkout(&auth_user.session, &req_payload.selections)
    .await?;

  let total_cents = receipt.total_cents();
  info!(orders = receipt.orders.len(), total_cents, "Checkout committed.");
  Ok(HttpResponse::Created().json(json!({
    "orders": receipt.orders,
    "totalCents": total_cents,
  })))
}
