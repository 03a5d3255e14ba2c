// server/src/seed.rs

//! Demo data for a fresh install: one farmer with a stocked store and one buyer.

use farmgate::{Marketplace, NewAccount, NewProduct, Role, Session, StoreProfile};
use tracing::{info, instrument};

use crate::errors::Result;
use crate::services::auth_service::hash_password;

pub const DEMO_FARMER_EMAIL: &str = "farmer@farmgate.test";
pub const DEMO_BUYER_EMAIL: &str = "buyer@farmgate.test";
pub const DEMO_PASSWORD: &str = "farmgate";

const DEMO_PRODUCTS: &[(&str, &str, i64, u32)] = &[
  ("Heirloom tomatoes", "vegetables", 450, 40),
  ("Free-range eggs (dozen)", "dairy & eggs", 600, 25),
  ("Raw honey 500g", "pantry", 1200, 12),
  ("Sweet potatoes 1kg", "vegetables", 300, 60),
];

/// Idempotent: does nothing if the demo farmer already exists.
#[instrument(name = "seed::demo_data", skip(market), err(Display))]
pub async fn seed_demo_data(market: &Marketplace) -> Result<()> {
  if market.accounts.by_email(DEMO_FARMER_EMAIL).await?.is_some() {
    info!("Demo data already present; skipping seed.");
    return Ok(());
  }

  let password_hash = hash_password(DEMO_PASSWORD)?;
  let farmer = market
    .accounts
    .register(NewAccount {
      email: DEMO_FARMER_EMAIL.to_string(),
      first_name: "Grace".to_string(),
      last_name: "Okafor".to_string(),
      phone_no: "08030000001".to_string(),
      address: "Plot 7, Farm Settlement Road".to_string(),
      role: Role::Seller {
        store: StoreProfile {
          name: "Sunrise Farm".to_string(),
          description: "Vegetables, eggs and honey from the valley.".to_string(),
          kind: "mixed".to_string(),
          address: "Plot 7, Farm Settlement Road".to_string(),
          avatar_url: None,
        },
      },
      password_hash: password_hash.clone(),
    })
    .await?;
  let farmer = Session::for_user(&farmer);

  for (name, category, price_cents, quantity) in DEMO_PRODUCTS {
    market
      .catalog
      .create(
        &farmer,
        NewProduct {
          name: name.to_string(),
          description: String::new(),
          category: Some(category.to_string()),
          price_cents: *price_cents,
          quantity: *quantity,
          image_url: None,
        },
      )
      .await?;
  }

  market
    .accounts
    .register(NewAccount {
      email: DEMO_BUYER_EMAIL.to_string(),
      first_name: "Bola".to_string(),
      last_name: "Ahmed".to_string(),
      phone_no: "08030000002".to_string(),
      address: "12 Market Street".to_string(),
      role: Role::Buyer,
      password_hash,
    })
    .await?;

  info!(products = DEMO_PRODUCTS.len(), "Demo data seeded.");
  Ok(())
}
