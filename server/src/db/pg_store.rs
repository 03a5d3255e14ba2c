// server/src/db/pg_store.rs

//! Postgres-backed `DocumentStore`.
//!
//! Each collection is a table holding the serialized document in a JSONB
//! `doc` column next to its `version` and the columns queries filter on.
//! A write batch runs in one transaction: every precondition row is locked
//! with `FOR UPDATE` and checked before any write is issued.
//!
//! The change feed is fed by commits made through this instance only.

use async_trait::async_trait;
use farmgate::{
  CartItem, CartItemId, DocKey, DocumentStore, Expect, Milestone, Order, OrderFilter, OrderId, Party, Product, ProductFilter,
  ProductId, StoreError, StoreResult, User, UserId, Versioned, WriteBatch,
};
use farmgate::store::Write;
use sqlx::postgres::{PgArguments, PgPool};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, trace};

const FEED_CAPACITY: usize = 1024;

const SCHEMA: &[&str] = &[
  r#"
  CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    email TEXT NOT NULL,
    doc JSONB NOT NULL,
    version BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
  )
  "#,
  "CREATE UNIQUE INDEX IF NOT EXISTS users_email_lower_key ON users (lower(email))",
  r#"
  CREATE TABLE IF NOT EXISTS products (
    id UUID PRIMARY KEY,
    store_id UUID NOT NULL,
    doc JSONB NOT NULL,
    version BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
  )
  "#,
  "CREATE INDEX IF NOT EXISTS products_store_idx ON products (store_id, created_at)",
  r#"
  CREATE TABLE IF NOT EXISTS cart_items (
    buyer_id UUID NOT NULL,
    id UUID NOT NULL,
    doc JSONB NOT NULL,
    version BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (buyer_id, id)
  )
  "#,
  r#"
  CREATE TABLE IF NOT EXISTS orders (
    id UUID PRIMARY KEY,
    buyer_id UUID NOT NULL,
    store_id UUID NOT NULL,
    status TEXT NOT NULL,
    doc JSONB NOT NULL,
    version BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
  )
  "#,
  "CREATE INDEX IF NOT EXISTS orders_buyer_idx ON orders (buyer_id, created_at)",
  "CREATE INDEX IF NOT EXISTS orders_store_idx ON orders (store_id, created_at)",
];

type DocRow<T> = (Json<T>, i64);

fn backend(err: sqlx::Error) -> StoreError {
  StoreError::backend(err)
}

fn to_version(raw: i64) -> StoreResult<u64> {
  u64::try_from(raw).map_err(StoreError::backend)
}

fn versioned<T>(row: DocRow<T>) -> StoreResult<Versioned<T>> {
  let (Json(value), version) = row;
  Ok(Versioned::new(value, to_version(version)?))
}

fn all_versioned<T>(rows: Vec<DocRow<T>>) -> StoreResult<Vec<Versioned<T>>> {
  rows.into_iter().map(versioned).collect()
}

/// Errors inside a commit that mean "someone else got there first" become
/// conflicts so the caller retries: a unique violation (concurrent insert of
/// the same key, or a taken email), a serialization failure or a deadlock.
fn commit_error(key: DocKey, err: sqlx::Error) -> StoreError {
  if let sqlx::Error::Database(ref db_err) = err {
    let contended = db_err.is_unique_violation() || matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"));
    if contended {
      return StoreError::Conflict {
        key,
        expected: "uncontended write".to_string(),
        found: db_err.constraint().unwrap_or(db_err.message()).to_string(),
      };
    }
  }
  backend(err)
}

fn describe(found: Option<u64>) -> String {
  found.map_or_else(|| "absent".to_string(), |v| format!("version {}", v))
}

pub struct PgStore {
  pool: PgPool,
  feed: broadcast::Sender<Order>,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    let (feed, _) = broadcast::channel(FEED_CAPACITY);
    Self { pool, feed }
  }

  /// Creates the tables and indexes if they do not exist yet.
  #[instrument(name = "pg_store::migrate", skip(self), err(Display))]
  pub async fn migrate(&self) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
      sqlx::query(statement).execute(&self.pool).await?;
    }
    info!("Document tables ready.");
    Ok(())
  }

  fn publish(&self, changed: Vec<Order>) {
    for order in changed {
      let receivers = self.feed.send(order).unwrap_or(0);
      trace!(receivers, "Published order change.");
    }
  }
}

async fn locked_version(tx: &mut Transaction<'_, Postgres>, key: &DocKey) -> StoreResult<Option<u64>> {
  let query = match key {
    DocKey::User(id) => sqlx::query_scalar::<_, i64>("SELECT version FROM users WHERE id = $1 FOR UPDATE")
      .bind(*id.as_uuid()),
    DocKey::Product(id) => sqlx::query_scalar::<_, i64>("SELECT version FROM products WHERE id = $1 FOR UPDATE")
      .bind(*id.as_uuid()),
    DocKey::CartItem(buyer, id) => {
      sqlx::query_scalar::<_, i64>("SELECT version FROM cart_items WHERE buyer_id = $1 AND id = $2 FOR UPDATE")
        .bind(*buyer.as_uuid())
        .bind(*id.as_uuid())
    }
    DocKey::Order(id) => sqlx::query_scalar::<_, i64>("SELECT version FROM orders WHERE id = $1 FOR UPDATE")
      .bind(*id.as_uuid()),
  };
  query
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| commit_error(*key, e))?
    .map(to_version)
    .transpose()
}

// A put expected to create its document is a plain INSERT: `FOR UPDATE`
// cannot lock a row that does not exist yet, so a concurrent insert of the
// same key must surface as a unique violation rather than take the
// `DO UPDATE` branch.
const USER_INSERT: &str = "INSERT INTO users (id, email, doc, version, created_at) VALUES ($1, $2, $3, 1, $4)";
const USER_UPSERT: &str = r#"
  INSERT INTO users (id, email, doc, version, created_at) VALUES ($1, $2, $3, 1, $4)
  ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email, doc = EXCLUDED.doc, version = users.version + 1
"#;
const PRODUCT_INSERT: &str = "INSERT INTO products (id, store_id, doc, version, created_at) VALUES ($1, $2, $3, 1, $4)";
const PRODUCT_UPSERT: &str = r#"
  INSERT INTO products (id, store_id, doc, version, created_at) VALUES ($1, $2, $3, 1, $4)
  ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc, version = products.version + 1
"#;
const CART_ITEM_INSERT: &str =
  "INSERT INTO cart_items (buyer_id, id, doc, version, created_at) VALUES ($1, $2, $3, 1, $4)";
const CART_ITEM_UPSERT: &str = r#"
  INSERT INTO cart_items (buyer_id, id, doc, version, created_at) VALUES ($1, $2, $3, 1, $4)
  ON CONFLICT (buyer_id, id) DO UPDATE SET doc = EXCLUDED.doc, version = cart_items.version + 1
"#;
const ORDER_INSERT: &str = r#"
  INSERT INTO orders (id, buyer_id, store_id, status, doc, version, created_at) VALUES ($1, $2, $3, $4, $5, 1, $6)
"#;
const ORDER_UPSERT: &str = r#"
  INSERT INTO orders (id, buyer_id, store_id, status, doc, version, created_at) VALUES ($1, $2, $3, $4, $5, 1, $6)
  ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, doc = EXCLUDED.doc, version = orders.version + 1
"#;

fn pick(create_only: bool, insert: &'static str, upsert: &'static str) -> &'static str {
  if create_only {
    insert
  } else {
    upsert
  }
}

fn write_query(write: &Write, create_only: bool) -> Query<'_, Postgres, PgArguments> {
  match write {
    Write::PutUser(user) => sqlx::query(pick(create_only, USER_INSERT, USER_UPSERT))
      .bind(*user.id.as_uuid())
      .bind(user.email.as_str())
      .bind(Json(user))
      .bind(user.created_at),
    Write::PutProduct(product) => sqlx::query(pick(create_only, PRODUCT_INSERT, PRODUCT_UPSERT))
      .bind(*product.id.as_uuid())
      .bind(*product.store_id.as_uuid())
      .bind(Json(product))
      .bind(product.created_at),
    Write::DeleteProduct(id) => sqlx::query("DELETE FROM products WHERE id = $1").bind(*id.as_uuid()),
    Write::PutCartItem(item) => sqlx::query(pick(create_only, CART_ITEM_INSERT, CART_ITEM_UPSERT))
      .bind(*item.buyer_id.as_uuid())
      .bind(*item.id.as_uuid())
      .bind(Json(item))
      .bind(item.created_at),
    Write::DeleteCartItem { buyer_id, id } => sqlx::query("DELETE FROM cart_items WHERE buyer_id = $1 AND id = $2")
      .bind(*buyer_id.as_uuid())
      .bind(*id.as_uuid()),
    Write::PutOrder(order) => sqlx::query(pick(create_only, ORDER_INSERT, ORDER_UPSERT))
      .bind(*order.id().as_uuid())
      .bind(*order.buyer_id().as_uuid())
      .bind(*order.store_id().as_uuid())
      .bind(order.status().as_str())
      .bind(Json(order))
      .bind(order.created_at()),
  }
}

#[async_trait]
impl DocumentStore for PgStore {
  async fn user(&self, id: UserId) -> StoreResult<Option<Versioned<User>>> {
    let row: Option<DocRow<User>> = sqlx::query_as("SELECT doc, version FROM users WHERE id = $1")
      .bind(*id.as_uuid())
      .fetch_optional(&self.pool)
      .await
      .map_err(backend)?;
    row.map(versioned).transpose()
  }

  async fn user_by_email(&self, email: &str) -> StoreResult<Option<Versioned<User>>> {
    let row: Option<DocRow<User>> = sqlx::query_as("SELECT doc, version FROM users WHERE lower(email) = lower($1)")
      .bind(email.trim())
      .fetch_optional(&self.pool)
      .await
      .map_err(backend)?;
    row.map(versioned).transpose()
  }

  async fn product(&self, id: ProductId) -> StoreResult<Option<Versioned<Product>>> {
    let row: Option<DocRow<Product>> = sqlx::query_as("SELECT doc, version FROM products WHERE id = $1")
      .bind(*id.as_uuid())
      .fetch_optional(&self.pool)
      .await
      .map_err(backend)?;
    row.map(versioned).transpose()
  }

  async fn products(&self, filter: ProductFilter) -> StoreResult<Vec<Versioned<Product>>> {
    let rows: Vec<DocRow<Product>> = match filter {
      ProductFilter::All => sqlx::query_as("SELECT doc, version FROM products ORDER BY created_at, id")
        .fetch_all(&self.pool)
        .await,
      ProductFilter::Store(store) => {
        sqlx::query_as("SELECT doc, version FROM products WHERE store_id = $1 ORDER BY created_at, id")
          .bind(*store.as_uuid())
          .fetch_all(&self.pool)
          .await
      }
    }
    .map_err(backend)?;
    all_versioned(rows)
  }

  async fn cart_item(&self, buyer: UserId, id: CartItemId) -> StoreResult<Option<Versioned<CartItem>>> {
    let row: Option<DocRow<CartItem>> =
      sqlx::query_as("SELECT doc, version FROM cart_items WHERE buyer_id = $1 AND id = $2")
        .bind(*buyer.as_uuid())
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
    row.map(versioned).transpose()
  }

  async fn cart(&self, buyer: UserId) -> StoreResult<Vec<Versioned<CartItem>>> {
    let rows: Vec<DocRow<CartItem>> =
      sqlx::query_as("SELECT doc, version FROM cart_items WHERE buyer_id = $1 ORDER BY created_at, id")
        .bind(*buyer.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
    all_versioned(rows)
  }

  async fn order(&self, id: OrderId) -> StoreResult<Option<Versioned<Order>>> {
    let row: Option<DocRow<Order>> = sqlx::query_as("SELECT doc, version FROM orders WHERE id = $1")
      .bind(*id.as_uuid())
      .fetch_optional(&self.pool)
      .await
      .map_err(backend)?;
    row.map(versioned).transpose()
  }

  async fn orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Versioned<Order>>> {
    let (column, party) = match filter.party {
      Party::Buyer(user) => ("buyer_id", *user.as_uuid()),
      Party::Seller(store) => ("store_id", *store.as_uuid()),
    };
    let statuses: Vec<String> = filter.statuses.iter().map(|s| s.as_str().to_string()).collect();
    let limit = filter.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
    // Newest first so LIMIT keeps the newest, then flipped back to oldest first.
    let sql = format!(
      "SELECT doc, version FROM orders WHERE {} = $1 AND (cardinality($2::text[]) = 0 OR status = ANY($2)) \
       ORDER BY created_at DESC, id DESC LIMIT $3",
      column
    );
    let mut rows: Vec<DocRow<Order>> = sqlx::query_as(&sql)
      .bind(party)
      .bind(statuses)
      .bind(limit)
      .fetch_all(&self.pool)
      .await
      .map_err(backend)?;
    rows.reverse();
    all_versioned(rows)
  }

  #[instrument(name = "pg_store::commit", skip_all, fields(writes = batch.writes().len()), err(Display))]
  async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
    let mut tx = self.pool.begin().await.map_err(backend)?;

    for (key, expect) in batch.preconditions() {
      let found = locked_version(&mut tx, key).await?;
      if !expect.holds(found) {
        debug!(%key, %expect, found = %describe(found), "Precondition failed; rolling back.");
        // Dropping the transaction rolls it back.
        return Err(StoreError::Conflict {
          key: *key,
          expected: expect.to_string(),
          found: describe(found),
        });
      }
    }

    let mut changed = Vec::new();
    for write in batch.writes() {
      let key = write.key();
      let create_only = batch
        .preconditions()
        .iter()
        .any(|(k, expect)| *k == key && *expect == Expect::Absent);
      write_query(write, create_only)
        .execute(&mut *tx)
        .await
        .map_err(|e| commit_error(key, e))?;
      if let Write::PutOrder(order) = write {
        changed.push(order.clone());
      }
    }

    tx.commit().await.map_err(backend)?;
    self.publish(changed);
    Ok(())
  }

  async fn claim_notification(&self, order: OrderId, milestone: Milestone) -> StoreResult<bool> {
    let claimed: Option<Json<Order>> = sqlx::query_scalar(
      r#"
      UPDATE orders
      SET doc = jsonb_set(doc, ARRAY['notificationSent', $2::text], 'true'::jsonb, true),
          version = version + 1
      WHERE id = $1 AND COALESCE((doc -> 'notificationSent' ->> $2::text)::boolean, false) = false
      RETURNING doc
      "#,
    )
    .bind(*order.as_uuid())
    .bind(milestone.flag_name())
    .fetch_optional(&self.pool)
    .await
    .map_err(backend)?;

    match claimed {
      Some(Json(updated)) => {
        self.publish(vec![updated]);
        Ok(true)
      }
      None => Ok(false),
    }
  }

  fn watch_orders(&self) -> broadcast::Receiver<Order> {
    self.feed.subscribe()
  }
}
