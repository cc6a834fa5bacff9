// payrecon/src/store/postgres.rs

//! Postgres-backed store. Schema lives in `server/schema.sql`.

use super::{Store, StoreError};
use crate::models::{
  Coupon, CustomerDetails, NewPayment, Order, OrderPatch, OrderStatus, PaymentMethod, PaymentPatch, PaymentStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, order_number, subtotal, discount, total, currency, status, payment_method, \
  session_id, payment_ref, gateway_raw, paid_at, delivered_at, coupon_code, coupon_applied, cart_fingerprint, \
  customer_name, customer_phone, customer_email, customer_address, customer_notes, created_at, updated_at";

const COUPON_COLUMNS: &str = "id, code, pct_off, amount_off, used_count, usage_limit, starts_at, ends_at, active";

/// Postgres "undefined_table".
const UNDEFINED_TABLE: &str = "42P01";

#[derive(Debug, FromRow)]
struct OrderRow {
  id: Uuid,
  order_number: Option<i64>,
  subtotal: Decimal,
  discount: Decimal,
  total: Decimal,
  currency: String,
  status: String,
  payment_method: String,
  session_id: Option<String>,
  payment_ref: Option<String>,
  gateway_raw: Option<Value>,
  paid_at: Option<DateTime<Utc>>,
  delivered_at: Option<DateTime<Utc>>,
  coupon_code: Option<String>,
  coupon_applied: bool,
  cart_fingerprint: Option<String>,
  customer_name: Option<String>,
  customer_phone: Option<String>,
  customer_email: Option<String>,
  customer_address: Option<String>,
  customer_notes: Option<String>,
  created_at: DateTime<Utc>,
  updated_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
  fn from(row: OrderRow) -> Self {
    Order {
      id: row.id,
      order_number: row.order_number,
      subtotal: row.subtotal,
      discount: row.discount,
      total: row.total,
      currency: row.currency,
      status: OrderStatus::from(row.status),
      payment_method: PaymentMethod::parse_lenient(&row.payment_method),
      session_id: row.session_id.filter(|s| !s.is_empty()),
      payment_ref: row.payment_ref.filter(|s| !s.is_empty()),
      gateway_raw: row.gateway_raw,
      paid_at: row.paid_at,
      delivered_at: row.delivered_at,
      coupon_code: row.coupon_code.filter(|s| !s.trim().is_empty()),
      coupon_applied: row.coupon_applied,
      cart_fingerprint: row.cart_fingerprint,
      customer: CustomerDetails {
        name: row.customer_name.unwrap_or_default(),
        phone: row.customer_phone.unwrap_or_default(),
        email: row.customer_email.unwrap_or_default(),
        address: row.customer_address.unwrap_or_default(),
        notes: row.customer_notes.unwrap_or_default(),
      },
      created_at: row.created_at,
      updated_at: row.updated_at,
    }
  }
}

#[derive(Debug, FromRow)]
struct CouponRow {
  id: Uuid,
  code: String,
  pct_off: Option<Decimal>,
  amount_off: Option<Decimal>,
  used_count: i64,
  usage_limit: Option<i64>,
  starts_at: Option<DateTime<Utc>>,
  ends_at: Option<DateTime<Utc>>,
  active: bool,
}

impl From<CouponRow> for Coupon {
  fn from(row: CouponRow) -> Self {
    Coupon {
      id: row.id,
      code: row.code,
      pct_off: row.pct_off,
      amount_off: row.amount_off,
      used_count: row.used_count,
      usage_limit: row.usage_limit,
      starts_at: row.starts_at,
      ends_at: row.ends_at,
      active: row.active,
    }
  }
}

fn payments_error(err: sqlx::Error, table: &'static str) -> StoreError {
  if let sqlx::Error::Database(db_err) = &err {
    if db_err.code().as_deref() == Some(UNDEFINED_TABLE) {
      return StoreError::MissingRelation(table);
    }
  }
  StoreError::Database(err)
}

#[derive(Debug, Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }
}

/// `UPDATE orders SET ... WHERE id = $n` for the fields present in `patch`.
/// Callers may append further `AND` guards.
fn order_update(id: Uuid, patch: &OrderPatch) -> QueryBuilder<'static, Postgres> {
  let mut qb = QueryBuilder::<Postgres>::new("UPDATE orders SET updated_at = now()");
  if let Some(status) = &patch.status {
    qb.push(", status = ").push_bind(status.as_str().to_string());
  }
  if let Some(paid_at) = patch.paid_at {
    qb.push(", paid_at = ").push_bind(paid_at);
  }
  if let Some(session_id) = &patch.session_id {
    qb.push(", session_id = ").push_bind(session_id.clone());
  }
  if let Some(payment_ref) = &patch.payment_ref {
    qb.push(", payment_ref = ").push_bind(payment_ref.clone());
  }
  if let Some(order_number) = patch.order_number {
    qb.push(", order_number = ").push_bind(order_number);
  }
  if let Some(raw) = &patch.gateway_raw {
    qb.push(", gateway_raw = ").push_bind(raw.clone());
  }
  qb.push(" WHERE id = ").push_bind(id);
  qb
}

#[async_trait]
impl Store for PgStore {
  #[instrument(name = "PgStore::probe_payments_schema", skip(self))]
  async fn probe_payments_schema(&self) -> Result<bool, StoreError> {
    let present: bool = sqlx::query_scalar(
      "SELECT to_regclass('payments') IS NOT NULL AND to_regclass('payment_events') IS NOT NULL",
    )
    .fetch_one(&self.pool)
    .await?;
    Ok(present)
  }

  #[instrument(name = "PgStore::fetch_order", skip(self), fields(order_id = %id))]
  async fn fetch_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
    let row = sqlx::query_as::<_, OrderRow>(&sql)
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(row.map(Order::from))
  }

  #[instrument(name = "PgStore::update_order", skip(self, patch), fields(order_id = %id))]
  async fn update_order(&self, id: Uuid, patch: &OrderPatch) -> Result<bool, StoreError> {
    let result = order_update(id, patch).build().execute(&self.pool).await?;
    Ok(result.rows_affected() > 0)
  }

  #[instrument(name = "PgStore::update_order_if_status", skip(self, patch), fields(order_id = %id, expected = %expected.as_str()))]
  async fn update_order_if_status(&self, id: Uuid, expected: &OrderStatus, patch: &OrderPatch) -> Result<bool, StoreError> {
    let mut qb = order_update(id, patch);
    qb.push(" AND status = ").push_bind(expected.as_str().to_string());
    let result = qb.build().execute(&self.pool).await?;
    Ok(result.rows_affected() > 0)
  }

  #[instrument(name = "PgStore::update_order_if_no_session", skip(self, patch), fields(order_id = %id))]
  async fn update_order_if_no_session(&self, id: Uuid, patch: &OrderPatch) -> Result<bool, StoreError> {
    let mut qb = order_update(id, patch);
    qb.push(" AND (session_id IS NULL OR session_id = '')");
    let result = qb.build().execute(&self.pool).await?;
    Ok(result.rows_affected() > 0)
  }

  #[instrument(name = "PgStore::set_coupon_applied_if", skip(self), fields(order_id = %id))]
  async fn set_coupon_applied_if(&self, id: Uuid, expected: bool, value: bool) -> Result<bool, StoreError> {
    let result = sqlx::query(
      "UPDATE orders SET coupon_applied = $1, updated_at = now() WHERE id = $2 AND coupon_applied = $3",
    )
    .bind(value)
    .bind(id)
    .bind(expected)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() == 1)
  }

  #[instrument(name = "PgStore::expire_pending_orders", skip(self, target), fields(target_status = %target))]
  async fn expire_pending_orders(&self, cutoff: DateTime<Utc>, target: &OrderStatus) -> Result<Vec<Uuid>, StoreError> {
    let ids: Vec<Uuid> = sqlx::query_scalar(
      "UPDATE orders SET status = $1, updated_at = now() \
       WHERE status = 'pending' AND paid_at IS NULL AND created_at < $2 \
       RETURNING id",
    )
    .bind(target.as_str())
    .bind(cutoff)
    .fetch_all(&self.pool)
    .await?;
    Ok(ids)
  }

  #[instrument(name = "PgStore::find_coupon_by_code", skip(self))]
  async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
    let sql = format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE lower(code) = lower($1) LIMIT 1");
    let row = sqlx::query_as::<_, CouponRow>(&sql)
      .bind(code.trim())
      .fetch_optional(&self.pool)
      .await?;
    Ok(row.map(Coupon::from))
  }

  #[instrument(name = "PgStore::increment_coupon_usage_if", skip(self), fields(coupon_id = %id))]
  async fn increment_coupon_usage_if(&self, id: Uuid, expected_used: i64) -> Result<bool, StoreError> {
    let result = sqlx::query("UPDATE coupons SET used_count = used_count + 1 WHERE id = $1 AND used_count = $2")
      .bind(id)
      .bind(expected_used)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() == 1)
  }

  #[instrument(name = "PgStore::insert_payment", skip(self, payment), fields(order_id = %payment.order_id))]
  async fn insert_payment(&self, payment: &NewPayment) -> Result<Uuid, StoreError> {
    let id: Uuid = sqlx::query_scalar(
      "INSERT INTO payments \
         (id, order_id, amount, currency, session_id, indicator_token, status, method, gateway_raw) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
       RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(payment.order_id)
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(&payment.session_id)
    .bind(&payment.indicator_token)
    .bind(payment.status.as_str())
    .bind(payment.method.as_str())
    .bind(&payment.gateway_raw)
    .fetch_one(&self.pool)
    .await
    .map_err(|e| payments_error(e, "payments"))?;
    Ok(id)
  }

  async fn latest_payment_for_session(&self, session_id: &str) -> Result<Option<Uuid>, StoreError> {
    sqlx::query_scalar("SELECT id FROM payments WHERE session_id = $1 ORDER BY created_at DESC LIMIT 1")
      .bind(session_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(|e| payments_error(e, "payments"))
  }

  async fn latest_payment_for_order(&self, order_id: Uuid) -> Result<Option<Uuid>, StoreError> {
    sqlx::query_scalar("SELECT id FROM payments WHERE order_id = $1 ORDER BY created_at DESC LIMIT 1")
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(|e| payments_error(e, "payments"))
  }

  #[instrument(name = "PgStore::update_payment", skip(self, patch), fields(payment_id = %id))]
  async fn update_payment(&self, id: Uuid, patch: &PaymentPatch) -> Result<(), StoreError> {
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE payments SET updated_at = now()");
    if let Some(status) = patch.status {
      qb.push(", status = ").push_bind(status.as_str());
    }
    if let Some(raw) = &patch.gateway_raw {
      qb.push(", gateway_raw = ").push_bind(raw.clone());
    }
    if let Some(txid) = &patch.gateway_transaction_id {
      qb.push(", gateway_transaction_id = ").push_bind(txid.clone());
    }
    if let Some(refno) = &patch.reference_no {
      qb.push(", reference_no = ").push_bind(refno.clone());
    }
    qb.push(" WHERE id = ").push_bind(id);

    qb.build()
      .execute(&self.pool)
      .await
      .map_err(|e| payments_error(e, "payments"))?;
    Ok(())
  }

  async fn update_payments_for_orders(&self, order_ids: &[Uuid], status: PaymentStatus) -> Result<u64, StoreError> {
    let result = sqlx::query("UPDATE payments SET status = $1, updated_at = now() WHERE order_id = ANY($2)")
      .bind(status.as_str())
      .bind(order_ids.to_vec())
      .execute(&self.pool)
      .await
      .map_err(|e| payments_error(e, "payments"))?;
    Ok(result.rows_affected())
  }

  async fn insert_payment_event(&self, payment_id: Uuid, event: &str, payload: Option<&Value>) -> Result<(), StoreError> {
    sqlx::query("INSERT INTO payment_events (id, payment_id, event, payload) VALUES ($1, $2, $3, $4)")
      .bind(Uuid::new_v4())
      .bind(payment_id)
      .bind(event)
      .bind(payload.cloned())
      .execute(&self.pool)
      .await
      .map_err(|e| payments_error(e, "payment_events"))?;
    Ok(())
  }
}
