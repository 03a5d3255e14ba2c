// server/src/main.rs

mod config;
mod db;
mod errors;
mod seed;
mod services;
mod state;
mod web;

use crate::config::{AppConfig, LogFormat};
use crate::db::PgStore;
use crate::services::push_mock::PushMock;
use crate::services::sessions::SessionRegistry;
use crate::state::AppState;

use actix_web::{web as actix_data, App, HttpServer};
use farmgate::{DocumentStore, Marketplace, MemoryStore};
use sqlx::PgPool;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60);

fn init_tracing(format: LogFormat) {
  let builder = tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()) // Allow RUST_LOG override
    .with_span_events(FmtSpan::CLOSE);
  match format {
    LogFormat::Pretty => builder.init(),
    LogFormat::Json => builder.json().init(),
  }
}

async fn open_store(config: &AppConfig) -> io::Result<(Arc<dyn DocumentStore>, Option<PgPool>)> {
  let Some(url) = &config.database_url else {
    tracing::warn!("DATABASE_URL not set; using the in-memory store. Data is lost on restart.");
    return Ok((Arc::new(MemoryStore::new()), None));
  };

  let pool = PgPool::connect(url).await.map_err(|e| {
    tracing::error!(error = %e, "Failed to connect to the database.");
    io::Error::other(e)
  })?;
  tracing::info!("Successfully connected to the database.");

  let store = PgStore::new(pool.clone());
  store.migrate().await.map_err(io::Error::other)?;
  Ok((Arc::new(store), Some(pool)))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
  let app_config = match AppConfig::from_env() {
    Ok(cfg) => Arc::new(cfg),
    Err(e) => {
      eprintln!("Configuration error: {}", e);
      return Err(io::Error::other(e.to_string()));
    }
  };
  init_tracing(app_config.log_format);
  tracing::info!("Starting farmgate server...");

  let (store, db_pool) = open_store(&app_config).await?;
  let push = Arc::new(PushMock::new());
  let market = Marketplace::new(store, push.clone(), app_config.market_config());

  if app_config.seed_db {
    if let Err(e) = seed::seed_demo_data(&market).await {
      tracing::error!(error = %e, "Failed to seed demo data.");
    }
  }

  let sessions = Arc::new(SessionRegistry::new(market.fanout.clone(), app_config.session_ttl()));
  let purger = sessions.clone();
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
    loop {
      ticker.tick().await;
      purger.purge_expired();
    }
  });

  let app_state = AppState {
    market,
    sessions,
    push,
    config: app_config.clone(),
    db_pool,
  };

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Binding server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(web::configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
