// server/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use farmgate::{OrderId, ProductReview};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OrderAction {
  Confirm,
  Reject,
  Cancel,
  Deliver,
}

#[derive(Deserialize, Debug)]
pub struct ReviewRequestPayload {
  pub reviews: Vec<ProductReview>,
}

/// Buyers get their orders oldest first; sellers get their store's orders newest first.
#[instrument(name = "handler::list_orders", skip_all, fields(user_id = %auth_user.session.user_id))]
pub async fn list_orders_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let orders = app_state.market.orders.orders_for(&auth_user.session).await?;
  Ok(HttpResponse::Ok().json(json!({ "orders": orders })))
}

#[instrument(name = "handler::orders_by_customer", skip_all, fields(user_id = %auth_user.session.user_id))]
pub async fn orders_by_customer_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let customers = app_state.market.orders.orders_by_customer(&auth_user.session).await?;
  Ok(HttpResponse::Ok().json(json!({ "customers": customers })))
}

#[instrument(
    name = "handler::get_order",
    skip(app_state, auth_user, path),
    fields(user_id = %auth_user.session.user_id, order_id = %path.as_ref())
)]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<OrderId>,
) -> Result<HttpResponse, AppError> {
  let order = app_state.market.orders.order(&auth_user.session, path.into_inner()).await?;
  let history = order.history_newest_first();
  Ok(HttpResponse::Ok().json(json!({ "order": order, "history": history })))
}

#[instrument(
    name = "handler::order_action",
    skip(app_state, auth_user, path),
    fields(user_id = %auth_user.session.user_id, order_id = %path.as_ref().0, action = ?path.as_ref().1)
)]
pub async fn order_action_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<(OrderId, OrderAction)>,
) -> Result<HttpResponse, AppError> {
  let (order_id, action) = path.into_inner();
  let orders = &app_state.market.orders;
  let session = &auth_user.session;
  let order = match action {
    OrderAction::Confirm => orders.confirm(session, order_id).await?,
    OrderAction::Reject => orders.reject(session, order_id).await?,
    OrderAction::Cancel => orders.cancel(session, order_id).await?,
    OrderAction::Deliver => orders.deliver(session, order_id).await?,
  };
  info!(status = %order.status(), "Order status changed.");
  Ok(HttpResponse::Ok().json(order))
}

#[instrument(
    name = "handler::review_order",
    skip(app_state, auth_user, path, req_payload),
    fields(user_id = %auth_user.session.user_id, order_id = %path.as_ref(), reviews = req_payload.reviews.len())
)]
pub async fn review_order_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<OrderId>,
  req_payload: web::Json<ReviewRequestPayload>,
) -> Result<HttpResponse, AppError> {
  let products = app_state
    .market
    .catalog
    .review_order(&auth_user.session, path.into_inner(), &req_payload.reviews)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "products": products })))
}
