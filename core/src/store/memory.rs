// payrecon/src/store/memory.rs

//! In-process store with the same conditional-update semantics as Postgres.
//! Used by tests and local runs without a database.

use super::{Store, StoreError};
use crate::models::{
  Coupon, NewPayment, Order, OrderPatch, OrderStatus, Payment, PaymentEvent, PaymentPatch, PaymentStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
  orders: HashMap<Uuid, Order>,
  coupons: HashMap<Uuid, Coupon>,
  payments: Vec<Payment>,
  events: Vec<PaymentEvent>,
}

#[derive(Debug)]
pub struct MemoryStore {
  tables: Mutex<Tables>,
  payments_available: AtomicBool,
  /// One-shot: bump this coupon's counter right before the next conditional
  /// increment, as a concurrent redemption from another order would.
  pending_interference: Mutex<Option<Uuid>>,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    Self {
      tables: Mutex::new(Tables::default()),
      payments_available: AtomicBool::new(true),
      pending_interference: Mutex::new(None),
    }
  }

  /// A deployment where the payments relations were never created.
  pub fn without_payments() -> Self {
    let store = Self::new();
    store.set_payments_available(false);
    store
  }

  /// Simulates the payments relations appearing or being dropped at runtime.
  pub fn set_payments_available(&self, available: bool) {
    self.payments_available.store(available, Ordering::SeqCst);
  }

  pub fn insert_order(&self, order: Order) {
    self.tables.lock().orders.insert(order.id, order);
  }

  pub fn insert_coupon(&self, coupon: Coupon) {
    self.tables.lock().coupons.insert(coupon.id, coupon);
  }

  pub fn order(&self, id: Uuid) -> Option<Order> {
    self.tables.lock().orders.get(&id).cloned()
  }

  pub fn coupon(&self, id: Uuid) -> Option<Coupon> {
    self.tables.lock().coupons.get(&id).cloned()
  }

  pub fn payments_for_order(&self, order_id: Uuid) -> Vec<Payment> {
    self
      .tables
      .lock()
      .payments
      .iter()
      .filter(|p| p.order_id == order_id)
      .cloned()
      .collect()
  }

  pub fn events_for_payment(&self, payment_id: Uuid) -> Vec<PaymentEvent> {
    self
      .tables
      .lock()
      .events
      .iter()
      .filter(|e| e.payment_id == payment_id)
      .cloned()
      .collect()
  }

  pub fn interfere_with_next_coupon_increment(&self, coupon_id: Uuid) {
    *self.pending_interference.lock() = Some(coupon_id);
  }

  fn ensure_payments(&self, table: &'static str) -> Result<(), StoreError> {
    if self.payments_available.load(Ordering::SeqCst) {
      Ok(())
    } else {
      Err(StoreError::MissingRelation(table))
    }
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn probe_payments_schema(&self) -> Result<bool, StoreError> {
    Ok(self.payments_available.load(Ordering::SeqCst))
  }

  async fn fetch_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
    Ok(self.order(id))
  }

  async fn update_order(&self, id: Uuid, patch: &OrderPatch) -> Result<bool, StoreError> {
    let mut tables = self.tables.lock();
    match tables.orders.get_mut(&id) {
      Some(order) => {
        order.apply(patch, Utc::now());
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn update_order_if_status(&self, id: Uuid, expected: &OrderStatus, patch: &OrderPatch) -> Result<bool, StoreError> {
    let mut tables = self.tables.lock();
    match tables.orders.get_mut(&id) {
      Some(order) if order.status == *expected => {
        order.apply(patch, Utc::now());
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn update_order_if_no_session(&self, id: Uuid, patch: &OrderPatch) -> Result<bool, StoreError> {
    let mut tables = self.tables.lock();
    match tables.orders.get_mut(&id) {
      Some(order) if order.session_id.as_deref().map_or(true, str::is_empty) => {
        order.apply(patch, Utc::now());
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn set_coupon_applied_if(&self, id: Uuid, expected: bool, value: bool) -> Result<bool, StoreError> {
    let mut tables = self.tables.lock();
    match tables.orders.get_mut(&id) {
      Some(order) if order.coupon_applied == expected => {
        order.coupon_applied = value;
        order.updated_at = Utc::now();
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn expire_pending_orders(&self, cutoff: DateTime<Utc>, target: &OrderStatus) -> Result<Vec<Uuid>, StoreError> {
    let now = Utc::now();
    let mut tables = self.tables.lock();
    let mut touched = Vec::new();
    for order in tables.orders.values_mut() {
      if order.status == OrderStatus::Pending && order.paid_at.is_none() && order.created_at < cutoff {
        order.status = target.clone();
        order.updated_at = now;
        touched.push(order.id);
      }
    }
    Ok(touched)
  }

  async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
    let wanted = code.trim().to_lowercase();
    Ok(
      self
        .tables
        .lock()
        .coupons
        .values()
        .find(|c| c.code.to_lowercase() == wanted)
        .cloned(),
    )
  }

  async fn increment_coupon_usage_if(&self, id: Uuid, expected_used: i64) -> Result<bool, StoreError> {
    let interference = self.pending_interference.lock().take();
    let mut tables = self.tables.lock();
    let Some(coupon) = tables.coupons.get_mut(&id) else {
      return Ok(false);
    };
    if interference == Some(id) {
      coupon.used_count += 1;
    }
    if coupon.used_count != expected_used {
      return Ok(false);
    }
    coupon.used_count += 1;
    Ok(true)
  }

  async fn insert_payment(&self, payment: &NewPayment) -> Result<Uuid, StoreError> {
    self.ensure_payments("payments")?;
    let now = Utc::now();
    let row = Payment {
      id: Uuid::new_v4(),
      order_id: payment.order_id,
      amount: payment.amount,
      currency: payment.currency.clone(),
      session_id: payment.session_id.clone(),
      indicator_token: payment.indicator_token.clone(),
      status: payment.status,
      method: payment.method,
      gateway_transaction_id: None,
      reference_no: None,
      gateway_raw: payment.gateway_raw.clone(),
      created_at: now,
      updated_at: now,
    };
    let id = row.id;
    self.tables.lock().payments.push(row);
    Ok(id)
  }

  async fn latest_payment_for_session(&self, session_id: &str) -> Result<Option<Uuid>, StoreError> {
    self.ensure_payments("payments")?;
    Ok(
      self
        .tables
        .lock()
        .payments
        .iter()
        .filter(|p| p.session_id.as_deref() == Some(session_id))
        .max_by_key(|p| p.created_at)
        .map(|p| p.id),
    )
  }

  async fn latest_payment_for_order(&self, order_id: Uuid) -> Result<Option<Uuid>, StoreError> {
    self.ensure_payments("payments")?;
    Ok(
      self
        .tables
        .lock()
        .payments
        .iter()
        .filter(|p| p.order_id == order_id)
        .max_by_key(|p| p.created_at)
        .map(|p| p.id),
    )
  }

  async fn update_payment(&self, id: Uuid, patch: &PaymentPatch) -> Result<(), StoreError> {
    self.ensure_payments("payments")?;
    let now = Utc::now();
    let mut tables = self.tables.lock();
    if let Some(payment) = tables.payments.iter_mut().find(|p| p.id == id) {
      payment.apply(patch, now);
    }
    Ok(())
  }

  async fn update_payments_for_orders(&self, order_ids: &[Uuid], status: PaymentStatus) -> Result<u64, StoreError> {
    self.ensure_payments("payments")?;
    let now = Utc::now();
    let mut tables = self.tables.lock();
    let mut touched = 0;
    for payment in tables.payments.iter_mut().filter(|p| order_ids.contains(&p.order_id)) {
      payment.status = status;
      payment.updated_at = now;
      touched += 1;
    }
    Ok(touched)
  }

  async fn insert_payment_event(&self, payment_id: Uuid, event: &str, payload: Option<&Value>) -> Result<(), StoreError> {
    self.ensure_payments("payment_events")?;
    self.tables.lock().events.push(PaymentEvent {
      id: Uuid::new_v4(),
      payment_id,
      event: event.to_string(),
      payload: payload.cloned(),
      created_at: Utc::now(),
    });
    Ok(())
  }
}
