// core/src/retry.rs

use crate::config::RetryConfig;
use crate::error::{MarketError, MarketResult};
use std::future::Future;
use tracing::{debug, warn};

/// Runs `attempt` until it succeeds, fails with something other than a store
/// conflict, or the configured attempts are used up.
///
/// Each call of `attempt` must re-read everything it depends on; a conflict
/// means the previous snapshot is stale.
pub(crate) async fn with_conflict_retry<T, F, Fut>(config: &RetryConfig, operation: &str, mut attempt: F) -> MarketResult<T>
where
  F: FnMut(u32) -> Fut,
  Fut: Future<Output = MarketResult<T>>,
{
  let max_attempts = config.attempts();
  let mut n = 1;
  loop {
    match attempt(n).await {
      Err(MarketError::Store(err)) if err.is_conflict() => {
        if n >= max_attempts {
          warn!(operation, attempts = n, error = %err, "Giving up after repeated write conflicts.");
          return Err(MarketError::TransactionConflict { attempts: n });
        }
        let delay = config.delay_after(n);
        debug!(operation, attempt = n, ?delay, error = %err, "Write conflict, retrying.");
        if !delay.is_zero() {
          tokio::time::sleep(delay).await;
        }
        n += 1;
      }
      other => return other,
    }
  }
}
