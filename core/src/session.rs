// core/src/session.rs

//! The signed-in account, passed explicitly to every operation.

use crate::error::{MarketError, MarketResult};
use crate::lifecycle::Actor;
use crate::model::{Order, Role, StoreId, User, UserId};

/// Who is acting. Built by the auth layer from a verified account.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
  pub user_id: UserId,
  pub display_name: String,
  pub role: Role,
}

/// The side of an order a session stands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Party {
  Buyer(UserId),
  Seller(StoreId),
}

impl Session {
  pub fn for_user(user: &User) -> Self {
    Self {
      user_id: user.id,
      display_name: user.display_name(),
      role: user.role.clone(),
    }
  }

  pub fn party(&self) -> Party {
    match self.role {
      Role::Buyer => Party::Buyer(self.user_id),
      Role::Seller { .. } => Party::Seller(StoreId::of_seller(self.user_id)),
    }
  }

  pub fn require_buyer(&self) -> MarketResult<UserId> {
    match self.role {
      Role::Buyer => Ok(self.user_id),
      Role::Seller { .. } => Err(MarketError::Forbidden("only buyer accounts can do this".to_string())),
    }
  }

  pub fn require_seller(&self) -> MarketResult<StoreId> {
    match self.role {
      Role::Seller { .. } => Ok(StoreId::of_seller(self.user_id)),
      Role::Buyer => Err(MarketError::Forbidden("only farmer accounts can do this".to_string())),
    }
  }
}

impl Party {
  /// How this party acts on `order`, or `None` if the order is not theirs.
  pub fn actor_on(&self, order: &Order) -> Option<Actor> {
    match *self {
      Party::Buyer(user) if order.buyer_id() == user => Some(Actor::Buyer),
      Party::Seller(store) if order.store_id() == store => Some(Actor::Seller),
      _ => None,
    }
  }
}
