// core/src/error.rs
use crate::model::OrderStatus;
use crate::store::DocKey;
use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Failures reported by a `DocumentStore` backend.
#[derive(Debug, Error)]
pub enum StoreError {
  /// A precondition of a write batch did not hold; nothing was written.
  #[error("Write conflict on {key}: expected {expected}, found {found}")]
  Conflict { key: DocKey, expected: String, found: String },

  #[error("Store backend failure. Source: {source}")]
  Backend {
    #[source]
    source: AnyhowError,
  },
}

impl StoreError {
  pub fn backend(err: impl Into<AnyhowError>) -> Self {
    StoreError::Backend { source: err.into() }
  }

  pub fn is_conflict(&self) -> bool {
    matches!(self, StoreError::Conflict { .. })
  }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum MarketError {
  #[error("Insufficient stock for '{product_name}': {available} available, {requested} requested")]
  InsufficientStock {
    product_name: String,
    available: u32,
    requested: u32,
  },

  /// A document points at another one that no longer exists (a cart item whose product was deleted).
  #[error("{from} references missing {missing}")]
  MissingReference { from: String, missing: String },

  #[error("Authentication failed: {0}")]
  AuthFailure(String),

  #[error("{kind} not found: {id}")]
  NotFound { kind: &'static str, id: String },

  #[error("Transaction aborted after {attempts} conflicting attempt(s)")]
  TransactionConflict { attempts: u32 },

  #[error("Order {order_id} cannot move from '{from}' to '{to}'")]
  IllegalTransition {
    order_id: String,
    from: OrderStatus,
    to: OrderStatus,
  },

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Validation error: {0}")]
  Validation(String),

  #[error("Store error: {0}")]
  Store(#[from] StoreError),
}

impl MarketError {
  pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
    MarketError::NotFound {
      kind,
      id: id.to_string(),
    }
  }

  /// Failures the buyer can act on (retry, adjust the cart) as opposed to backend faults.
  pub fn is_user_facing(&self) -> bool {
    !matches!(self, MarketError::Store(_))
  }
}

pub type MarketResult<T, E = MarketError> = std::result::Result<T, E>;
