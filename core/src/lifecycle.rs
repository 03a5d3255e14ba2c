// core/src/lifecycle.rs

//! The order state machine.
//!
//! ```text
//! OrderPlaced ──seller──▶ OrderConfirmed ──seller──▶ Delivered
//!      │
//!      └──buyer | seller──▶ Canceled
//! ```
//!
//! Every legal move is listed in [`TRANSITIONS`]; anything else is rejected
//! whatever the client shows or hides.

use crate::error::{MarketError, MarketResult};
use crate::model::{OrderId, OrderStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The party asking for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actor {
  Buyer,
  Seller,
}

impl fmt::Display for Actor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Actor::Buyer => f.write_str("buyer"),
      Actor::Seller => f.write_str("seller"),
    }
  }
}

pub struct Transition {
  pub from: OrderStatus,
  pub to: OrderStatus,
  pub allowed: &'static [Actor],
}

pub const TRANSITIONS: &[Transition] = &[
  Transition {
    from: OrderStatus::OrderPlaced,
    to: OrderStatus::OrderConfirmed,
    allowed: &[Actor::Seller],
  },
  Transition {
    from: OrderStatus::OrderPlaced,
    to: OrderStatus::Canceled,
    allowed: &[Actor::Buyer, Actor::Seller],
  },
  Transition {
    from: OrderStatus::OrderConfirmed,
    to: OrderStatus::Delivered,
    allowed: &[Actor::Seller],
  },
];

pub fn find(from: OrderStatus, to: OrderStatus) -> Option<&'static Transition> {
  TRANSITIONS.iter().find(|t| t.from == from && t.to == to)
}

/// Checks that `actor` may move order `order_id` from `from` to `to`.
pub fn authorize(order_id: OrderId, from: OrderStatus, to: OrderStatus, actor: Actor) -> MarketResult<()> {
  let transition = find(from, to).ok_or_else(|| MarketError::IllegalTransition {
    order_id: order_id.to_string(),
    from,
    to,
  })?;
  if !transition.allowed.contains(&actor) {
    return Err(MarketError::Forbidden(format!(
      "a {} cannot move order {} from '{}' to '{}'",
      actor, order_id, from, to
    )));
  }
  Ok(())
}
