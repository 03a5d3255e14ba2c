// server/src/web/handlers/cart_handlers.rs

use actix_web::{web, HttpResponse};
use farmgate::{CartItemId, ProductId};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

fn default_quantity() -> u32 {
  1
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequestPayload {
  pub product_id: ProductId,
  #[serde(default = "default_quantity")]
  pub quantity: u32,
}

#[derive(Deserialize, Debug)]
pub struct AdjustCartItemPayload {
  /// Negative lowers the quantity; reaching zero removes the entry.
  pub delta: i64,
}

#[instrument(name = "handler::view_cart", skip_all, fields(user_id = %auth_user.session.user_id))]
pub async fn view_cart_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let view = app_state.market.cart.view(&auth_user.session).await?;
  Ok(HttpResponse::Ok().json(view))
}

#[instrument(
    name = "handler::add_to_cart",
    skip(app_state, req_payload, auth_user),
    fields(user_id = %auth_user.session.user_id, product_id = %req_payload.product_id, quantity = req_payload.quantity)
)]
pub async fn add_to_cart_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<AddToCartRequestPayload>,
) -> Result<HttpResponse, AppError> {
  let item = app_state
    .market
    .cart
    .add(&auth_user.session, req_payload.product_id, req_payload.quantity)
    .await?;
  info!(cart_item_id = %item.id, quantity = item.quantity, "Cart updated.");
  Ok(HttpResponse::Ok().json(item))
}

#[instrument(
    name = "handler::adjust_cart_item",
    skip(app_state, auth_user, path, req_payload),
    fields(user_id = %auth_user.session.user_id, cart_item_id = %path.as_ref(), delta = req_payload.delta)
)]
pub async fn adjust_cart_item_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<CartItemId>,
  req_payload: web::Json<AdjustCartItemPayload>,
) -> Result<HttpResponse, AppError> {
  let item = app_state
    .market
    .cart
    .adjust(&auth_user.session, path.into_inner(), req_payload.delta)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "item": item, "removed": item.is_none() })))
}

#[instrument(
    name = "handler::remove_cart_item",
    skip(app_state, auth_user, path),
    fields(user_id = %auth_user.session.user_id, cart_item_id = %path.as_ref())
)]
pub async fn remove_cart_item_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<CartItemId>,
) -> Result<HttpResponse, AppError> {
  app_state
    .market
    .cart
    .remove(&auth_user.session, path.into_inner())
    .await?;
  Ok(HttpResponse::NoContent().finish())
}
