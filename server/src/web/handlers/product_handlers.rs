// server/src/web/handlers/product_handlers.rs

use actix_web::{web, HttpResponse};
use farmgate::{NewProduct, ProductId, ProductUpdate, StoreId};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ListProductsQuery {
  pub store_id: Option<StoreId>,
}

#[instrument(name = "handler::list_products", skip(app_state), fields(store_id = ?query_params.store_id))]
pub async fn list_products_handler(
  app_state: web::Data<AppState>,
  query_params: web::Query<ListProductsQuery>,
) -> Result<HttpResponse, AppError> {
  let products = match query_params.store_id {
    Some(store_id) => app_state.market.catalog.list_store(store_id).await?,
    None => app_state.market.catalog.list_all().await?,
  };
  info!("Listing {} products.", products.len());
  Ok(HttpResponse::Ok().json(json!({ "products": products })))
}

#[instrument(name = "handler::get_product", skip(app_state, path), fields(product_id = %path.as_ref()))]
pub async fn get_product_handler(
  app_state: web::Data<AppState>,
  path: web::Path<ProductId>,
) -> Result<HttpResponse, AppError> {
  let product = app_state.market.catalog.get(path.into_inner()).await?;
  let average_rating = product.average_rating();
  Ok(HttpResponse::Ok().json(json!({
    "product": product,
    "averageRating": average_rating,
  })))
}

#[instrument(name = "handler::create_product", skip_all, fields(user_id = %auth_user.session.user_id))]
pub async fn create_product_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<NewProduct>,
) -> Result<HttpResponse, AppError> {
  let product = app_state
    .market
    .catalog
    .create(&auth_user.session, req_payload.into_inner())
    .await?;
  Ok(HttpResponse::Created().json(product))
}

#[instrument(
    name = "handler::update_product",
    skip(app_state, auth_user, req_payload, path),
    fields(user_id = %auth_user.session.user_id, product_id = %path.as_ref())
)]
pub async fn update_product_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<ProductId>,
  req_payload: web::Json<ProductUpdate>,
) -> Result<HttpResponse, AppError> {
  let product = app_state
    .market
    .catalog
    .update(&auth_user.session, path.into_inner(), req_payload.into_inner())
    .await?;
  Ok(HttpResponse::Ok().json(product))
}

#[instrument(
    name = "handler::delete_product",
    skip(app_state, auth_user, path),
    fields(user_id = %auth_user.session.user_id, product_id = %path.as_ref())
)]
pub async fn delete_product_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<ProductId>,
) -> Result<HttpResponse, AppError> {
  app_state
    .market
    .catalog
    .delete(&auth_user.session, path.into_inner())
    .await?;
  Ok(HttpResponse::NoContent().finish())
}
