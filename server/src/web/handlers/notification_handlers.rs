// server/src/web/handlers/notification_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::instrument;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

/// The activity feed (latest status of each of the caller's orders) plus the
/// notifications already pushed to this user.
#[instrument(name = "handler::notifications", skip_all, fields(user_id = %auth_user.session.user_id))]
pub async fn notifications_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let activity = app_state.market.orders.activity(&auth_user.session).await?;
  let delivered = app_state.push.inbox(auth_user.session.user_id);
  Ok(HttpResponse::Ok().json(json!({
    "activity": activity,
    "delivered": delivered,
  })))
}
