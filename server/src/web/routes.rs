// server/src/web/routes.rs

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::handlers::{
  auth_handlers, cart_handlers, checkout_handlers, notification_handlers, order_handlers, product_handlers,
};

async fn health_check_handler(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
  let storage = match &app_state.db_pool {
    Some(pool) => {
      sqlx::query("SELECT 1").execute(pool).await?;
      "postgres"
    }
    None => "memory",
  };
  Ok(HttpResponse::Ok().json(json!({
    "status": "ok",
    "storage": storage,
    "activeSessions": app_state.sessions.active(),
    "sessionTtlMinutes": app_state.config.session_ttl_minutes,
  })))
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      .service(
        web::scope("/auth")
          .route("/signup", web::post().to(auth_handlers::signup_handler))
          .route("/signin", web::post().to(auth_handlers::signin_handler))
          .route("/signout", web::post().to(auth_handlers::signout_handler)),
      )
      .service(
        web::resource("/me")
          .route(web::get().to(auth_handlers::me_handler))
          .route(web::patch().to(auth_handlers::update_profile_handler)),
      )
      .service(
        web::scope("/products")
          .route("", web::get().to(product_handlers::list_products_handler))
          .route("", web::post().to(product_handlers::create_product_handler))
          .route("/{product_id}", web::get().to(product_handlers::get_product_handler))
          .route("/{product_id}", web::patch().to(product_handlers::update_product_handler))
          .route("/{product_id}", web::delete().to(product_handlers::delete_product_handler)),
      )
      .service(
        web::scope("/cart")
          .route("", web::get().to(cart_handlers::view_cart_handler))
          .route("/items", web::post().to(cart_handlers::add_to_cart_handler))
          .route("/items/{item_id}", web::patch().to(cart_handlers::adjust_cart_item_handler))
          .route("/items/{item_id}", web::delete().to(cart_handlers::remove_cart_item_handler)),
      )
      .route("/checkout", web::post().to(checkout_handlers::checkout_handler))
      .service(
        web::scope("/orders")
          .route("", web::get().to(order_handlers::list_orders_handler))
          // Registered before "/{order_id}" so it is not parsed as an id.
          .route("/by-customer", web::get().to(order_handlers::orders_by_customer_handler))
          .route("/{order_id}", web::get().to(order_handlers::get_order_handler))
          .route("/{order_id}/reviews", web::post().to(order_handlers::review_order_handler))
          .route("/{order_id}/{action}", web::post().to(order_handlers::order_action_handler)),
      )
      .route("/notifications", web::get().to(notification_handlers::notifications_handler)),
  );
}
