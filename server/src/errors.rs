// server/src/errors.rs

use actix_web::{HttpResponse, ResponseError};
use farmgate::MarketError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error(transparent)]
  Market(#[from] MarketError),

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

// Stray anyhow errors keep the typed error they wrap when there is one.
impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<MarketError>() {
      Ok(market) => AppError::Market(market),
      Err(err) => match err.downcast::<sqlx::Error>() {
        Ok(db) => AppError::Sqlx(db),
        Err(err) => AppError::Internal(err.to_string()),
      },
    }
  }
}

fn market_response(err: &MarketError) -> HttpResponse {
  let detail = err.to_string();
  match err {
    MarketError::InsufficientStock {
      product_name,
      available,
      requested,
    } => HttpResponse::Conflict().json(json!({
      "error": "Insufficient stock",
      "detail": detail,
      "productName": product_name,
      "available": available,
      "requested": requested,
    })),
    MarketError::MissingReference { .. } => {
      HttpResponse::Conflict().json(json!({"error": "Referenced item no longer exists", "detail": detail}))
    }
    MarketError::TransactionConflict { attempts } => HttpResponse::Conflict().json(json!({
      "error": "Too much contention, please retry",
      "detail": detail,
      "attempts": attempts,
    })),
    MarketError::IllegalTransition { .. } => {
      HttpResponse::Conflict().json(json!({"error": "Illegal status change", "detail": detail}))
    }
    MarketError::AuthFailure(_) => HttpResponse::Unauthorized().json(json!({"error": "Authentication failed", "detail": detail})),
    MarketError::NotFound { .. } => HttpResponse::NotFound().json(json!({"error": "Not found", "detail": detail})),
    MarketError::Forbidden(_) => HttpResponse::Forbidden().json(json!({"error": "Forbidden", "detail": detail})),
    MarketError::Validation(m) => HttpResponse::BadRequest().json(json!({"error": m})),
    MarketError::Store(_) => {
      HttpResponse::InternalServerError().json(json!({"error": "Storage operation failed"}))
    }
  }
}

impl ResponseError for AppError {
  fn error_response(&self) -> HttpResponse {
    match self {
      AppError::Market(e) if e.is_user_facing() => {
        tracing::info!(application_error = %self, "Request rejected");
      }
      _ => tracing::error!(application_error = %self, "Responding with error"),
    }
    match self {
      AppError::Validation(m) => HttpResponse::BadRequest().json(json!({"error": m})),
      AppError::Auth(m) => HttpResponse::Unauthorized().json(json!({"error": m})),
      AppError::Config(m) => {
        HttpResponse::InternalServerError().json(json!({"error": "Configuration issue", "detail": m}))
      }
      AppError::Sqlx(_) => HttpResponse::InternalServerError().json(json!({"error": "Database operation failed"})),
      AppError::Market(e) => market_response(e),
      AppError::Internal(m) => {
        HttpResponse::InternalServerError().json(json!({"error": "An internal error occurred", "detail": m}))
      }
    }
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
