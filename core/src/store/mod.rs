// payrecon/src/store/mod.rs

//! Row-level access to orders, coupons and the optional payments relations.
//!
//! Concurrency safety lives here: every contended write is a conditional
//! update keyed on a value the caller read earlier, never an in-process lock.

pub mod ledger;
pub mod memory;
pub mod postgres;

use crate::models::{Coupon, NewPayment, Order, OrderPatch, OrderStatus, PaymentPatch, PaymentStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub use ledger::PaymentLedger;
pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("Database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("Relation '{0}' does not exist")]
  MissingRelation(&'static str),

  #[error("Corrupt row in '{table}': {message}")]
  CorruptRow { table: &'static str, message: String },

  #[error("Store backend error: {0}")]
  Backend(#[source] anyhow::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
  /// Whether both `payments` and `payment_events` exist.
  async fn probe_payments_schema(&self) -> Result<bool, StoreError>;

  // --- orders ---
  async fn fetch_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

  /// Returns `false` when no such order exists.
  async fn update_order(&self, id: Uuid, patch: &OrderPatch) -> Result<bool, StoreError>;

  /// Applies `patch` only while the order's status still equals `expected`.
  /// Returns `false` when the order is gone or has moved on.
  async fn update_order_if_status(&self, id: Uuid, expected: &OrderStatus, patch: &OrderPatch) -> Result<bool, StoreError>;

  /// Applies `patch` only while the order has no session yet (null or empty).
  async fn update_order_if_no_session(&self, id: Uuid, patch: &OrderPatch) -> Result<bool, StoreError>;

  /// Sets `coupon_applied = value` only while it still equals `expected`.
  async fn set_coupon_applied_if(&self, id: Uuid, expected: bool, value: bool) -> Result<bool, StoreError>;

  /// Moves every pending, unpaid order created before `cutoff` to `target`
  /// in a single atomic update and returns the ids it touched.
  async fn expire_pending_orders(&self, cutoff: DateTime<Utc>, target: &OrderStatus) -> Result<Vec<Uuid>, StoreError>;

  // --- coupons ---
  async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError>;

  /// Increments `used_count` only while it still equals `expected_used`.
  async fn increment_coupon_usage_if(&self, id: Uuid, expected_used: i64) -> Result<bool, StoreError>;

  // --- payments (optional relations) ---
  async fn insert_payment(&self, payment: &NewPayment) -> Result<Uuid, StoreError>;

  async fn latest_payment_for_session(&self, session_id: &str) -> Result<Option<Uuid>, StoreError>;

  async fn latest_payment_for_order(&self, order_id: Uuid) -> Result<Option<Uuid>, StoreError>;

  async fn update_payment(&self, id: Uuid, patch: &PaymentPatch) -> Result<(), StoreError>;

  async fn update_payments_for_orders(&self, order_ids: &[Uuid], status: PaymentStatus) -> Result<u64, StoreError>;

  async fn insert_payment_event(&self, payment_id: Uuid, event: &str, payload: Option<&Value>) -> Result<(), StoreError>;
}
