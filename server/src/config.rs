// server/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use farmgate::{MarketConfig, RetryConfig};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// One year. Keeps `now + ttl` far from the range limits of `chrono`.
pub const MAX_SESSION_TTL_MINUTES: i64 = 366 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
  Pretty,
  Json,
}

impl FromStr for LogFormat {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "pretty" | "text" => Ok(LogFormat::Pretty),
      "json" => Ok(LogFormat::Json),
      other => Err(format!("expected 'pretty' or 'json', got '{}'", other)),
    }
  }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  /// Absent selects the in-memory store.
  pub database_url: Option<String>,
  pub checkout_max_attempts: u32,
  pub checkout_retry_base_ms: u64,
  pub session_ttl_minutes: i64,
  pub seed_db: bool,
  pub log_format: LogFormat,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present
    let config = Self::from_lookup(|name| env::var(name).ok())?;
    tracing::info!(
      host = %config.server_host,
      port = config.server_port,
      persistent = config.database_url.is_some(),
      "Application configuration loaded."
    );
    Ok(config)
  }

  /// Builds the config from any variable source; unset variables take their defaults.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
    where
      T: FromStr,
      T::Err: std::fmt::Display,
    {
      match lookup(name) {
        Some(raw) => raw
          .trim()
          .parse::<T>()
          .map_err(|e| AppError::Config(format!("Invalid {} value '{}': {}", name, raw, e))),
        None => Ok(default),
      }
    }

    let server_host = lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
    let server_port = parsed(&lookup, "SERVER_PORT", 8080u16)?;
    let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
    let checkout_max_attempts = parsed(&lookup, "CHECKOUT_MAX_ATTEMPTS", 3u32)?;
    let checkout_retry_base_ms = parsed(&lookup, "CHECKOUT_RETRY_BASE_MS", 25u64)?;
    let session_ttl_minutes = parsed(&lookup, "SESSION_TTL_MINUTES", 720i64)?;
    let seed_db = parsed(&lookup, "SEED_DB", false)?;
    let log_format = parsed(&lookup, "LOG_FORMAT", LogFormat::Pretty)?;

    if checkout_max_attempts == 0 {
      return Err(AppError::Config("CHECKOUT_MAX_ATTEMPTS must be at least 1".to_string()));
    }
    if !(1..=MAX_SESSION_TTL_MINUTES).contains(&session_ttl_minutes) {
      return Err(AppError::Config(format!(
        "SESSION_TTL_MINUTES must be between 1 and {}",
        MAX_SESSION_TTL_MINUTES
      )));
    }

    Ok(Self {
      server_host,
      server_port,
      database_url,
      checkout_max_attempts,
      checkout_retry_base_ms,
      session_ttl_minutes,
      seed_db,
      log_format,
    })
  }

  pub fn market_config(&self) -> MarketConfig {
    let checkout = RetryConfig {
      max_attempts: self.checkout_max_attempts,
      base_delay: Duration::from_millis(self.checkout_retry_base_ms),
      ..RetryConfig::default()
    };
    MarketConfig {
      checkout,
      ..MarketConfig::default()
    }
  }

  pub fn session_ttl(&self) -> chrono::Duration {
    chrono::Duration::minutes(self.session_ttl_minutes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
    let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    AppConfig::from_lookup(|name| vars.get(name).cloned())
  }

  #[test]
  fn defaults_select_memory_store() {
    let config = load(&[]).unwrap();
    assert_eq!(config.server_host, "127.0.0.1");
    assert_eq!(config.server_port, 8080);
    assert!(config.database_url.is_none());
    assert!(!config.seed_db);
    assert_eq!(config.log_format, LogFormat::Pretty);
    assert_eq!(config.market_config().checkout.max_attempts, 3);
  }

  #[test]
  fn overrides_are_parsed() {
    let config = load(&[
      ("SERVER_PORT", "9000"),
      ("DATABASE_URL", "postgres://localhost/farmgate"),
      ("CHECKOUT_MAX_ATTEMPTS", "5"),
      ("CHECKOUT_RETRY_BASE_MS", "10"),
      ("SEED_DB", "true"),
      ("LOG_FORMAT", "JSON"),
    ])
    .unwrap();
    assert_eq!(config.server_port, 9000);
    assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/farmgate"));
    assert!(config.seed_db);
    assert_eq!(config.log_format, LogFormat::Json);
    let market = config.market_config();
    assert_eq!(market.checkout.max_attempts, 5);
    assert_eq!(market.checkout.base_delay, Duration::from_millis(10));
  }

  #[test]
  fn invalid_values_are_config_errors() {
    assert!(matches!(load(&[("SERVER_PORT", "eighty")]), Err(AppError::Config(_))));
    assert!(matches!(load(&[("SEED_DB", "yes")]), Err(AppError::Config(_))));
    assert!(matches!(load(&[("LOG_FORMAT", "xml")]), Err(AppError::Config(_))));
    assert!(matches!(load(&[("CHECKOUT_MAX_ATTEMPTS", "0")]), Err(AppError::Config(_))));
    assert!(matches!(load(&[("SESSION_TTL_MINUTES", "-5")]), Err(AppError::Config(_))));
  }

  #[test]
  fn session_ttl_is_bounded() {
    let longest = MAX_SESSION_TTL_MINUTES.to_string();
    let config = load(&[("SESSION_TTL_MINUTES", longest.as_str())]).unwrap();
    assert!(chrono::Utc::now().checked_add_signed(config.session_ttl()).is_some());

    let too_long = (MAX_SESSION_TTL_MINUTES + 1).to_string();
    assert!(matches!(load(&[("SESSION_TTL_MINUTES", too_long.as_str())]), Err(AppError::Config(_))));
    assert!(matches!(load(&[("SESSION_TTL_MINUTES", "1000000000000")]), Err(AppError::Config(_))));
    assert!(matches!(load(&[("SESSION_TTL_MINUTES", "0")]), Err(AppError::Config(_))));
  }
}
