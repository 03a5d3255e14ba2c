// server/src/state.rs
use crate::config::AppConfig;
use crate::services::push_mock::PushMock;
use crate::services::sessions::SessionRegistry;
use farmgate::Marketplace;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub market: Marketplace,
  pub sessions: Arc<SessionRegistry>,
  pub push: Arc<PushMock>,
  pub config: Arc<AppConfig>,
  /// Present when running against Postgres; used by the health check.
  pub db_pool: Option<PgPool>,
}
