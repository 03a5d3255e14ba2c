// server/src/web/extractors.rs

use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use farmgate::Session;
use futures_util::future::{ready, Ready};
use tracing::warn;

use crate::errors::AppError;
use crate::state::AppState;

/// The caller behind an `Authorization: Bearer <token>` header.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
  pub session: Session,
  pub token: String,
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
  let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
  let token = header.strip_prefix("Bearer ").or_else(|| header.strip_prefix("bearer "))?;
  let token = token.trim();
  (!token.is_empty()).then_some(token)
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
    let Some(state) = req.app_data::<web::Data<AppState>>() else {
      return ready(Err(AppError::Internal("Application state is not configured.".to_string())));
    };
    let Some(token) = bearer_token(req) else {
      return ready(Err(AppError::Auth("Missing bearer token.".to_string())));
    };
    match state.sessions.resolve(token) {
      Some(session) => ready(Ok(AuthenticatedUser {
        session,
        token: token.to_string(),
      })),
      None => {
        warn!("Unknown or expired session token presented.");
        ready(Err(AppError::Auth("Session is invalid or has expired.".to_string())))
      }
    }
  }
}
