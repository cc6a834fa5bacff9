// payrecon/src/store/ledger.rs

//! Soft writes against the optional payments relations.
//!
//! Nothing in here returns an error. When the startup probe finds the
//! relations missing every payment operation is a no-op; otherwise each
//! storage failure is logged and reported as an empty result so the order
//! path keeps working with a degraded audit trail.

use super::{Store, StoreError};
use crate::models::{NewPayment, PaymentEventKind, PaymentPatch, PaymentStatus};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct PaymentLedger {
  store: Arc<dyn Store>,
  enabled: bool,
}

fn swallow<T>(operation: &'static str, result: Result<T, StoreError>) -> Option<T> {
  match result {
    Ok(value) => Some(value),
    Err(err) => {
      warn!(operation, error = %err, "Payments ledger write failed; continuing without audit row.");
      None
    }
  }
}

impl PaymentLedger {
  /// Probes the store once. A failing probe counts as "not supported".
  pub async fn probe(store: Arc<dyn Store>) -> Self {
    let enabled = match store.probe_payments_schema().await {
      Ok(present) => present,
      Err(err) => {
        warn!(error = %err, "Payments schema probe failed; payment auditing disabled.");
        false
      }
    };
    info!(enabled, "Payments ledger initialised.");
    Self { store, enabled }
  }

  pub fn with_capability(store: Arc<dyn Store>, enabled: bool) -> Self {
    Self { store, enabled }
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  #[instrument(name = "PaymentLedger::create_payment_attempt", skip(self, attempt), fields(order_id = %attempt.order_id))]
  pub async fn create_payment_attempt(&self, attempt: NewPayment) -> Option<Uuid> {
    if !self.enabled {
      return None;
    }
    swallow("insert_payment", self.store.insert_payment(&attempt).await)
  }

  /// No-op without a payment id.
  pub async fn record_payment_event(&self, payment_id: Option<Uuid>, event: PaymentEventKind, payload: Option<Value>) {
    let Some(payment_id) = payment_id else {
      return;
    };
    if !self.enabled {
      return;
    }
    swallow(
      "insert_payment_event",
      self
        .store
        .insert_payment_event(payment_id, event.as_str(), payload.as_ref())
        .await,
    );
  }

  /// Most recent attempt for the session, falling back to the most recent for the order.
  pub async fn find_latest_payment_attempt(&self, session_id: Option<&str>, order_id: Option<Uuid>) -> Option<Uuid> {
    if !self.enabled {
      return None;
    }
    if let Some(session_id) = session_id.filter(|s| !s.is_empty()) {
      let by_session = swallow(
        "latest_payment_for_session",
        self.store.latest_payment_for_session(session_id).await,
      )
      .flatten();
      if by_session.is_some() {
        return by_session;
      }
    }
    let order_id = order_id?;
    swallow("latest_payment_for_order", self.store.latest_payment_for_order(order_id).await).flatten()
  }

  /// Patches the latest attempt, lazily creating one from the order's
  /// total when none exists, then appends `event` if given.
  #[instrument(name = "PaymentLedger::upsert_payment", skip(self, patch, event), fields(%order_id))]
  pub async fn upsert_payment_by_session_or_order(
    &self,
    session_id: Option<&str>,
    order_id: Uuid,
    patch: PaymentPatch,
    event: Option<(PaymentEventKind, Value)>,
  ) -> Option<Uuid> {
    if !self.enabled {
      return None;
    }

    let payment_id = match self.find_latest_payment_attempt(session_id, Some(order_id)).await {
      Some(id) => id,
      None => self.create_for_order(session_id, order_id, patch.status).await?,
    };

    swallow("update_payment", self.store.update_payment(payment_id, &patch).await)?;

    if let Some((kind, payload)) = event {
      self.record_payment_event(Some(payment_id), kind, Some(payload)).await;
    }
    Some(payment_id)
  }

  async fn create_for_order(
    &self,
    session_id: Option<&str>,
    order_id: Uuid,
    status: Option<PaymentStatus>,
  ) -> Option<Uuid> {
    let order = swallow("fetch_order", self.store.fetch_order(order_id).await).flatten()?;
    debug!(%order_id, "No payment attempt on record; creating one.");
    self
      .create_payment_attempt(NewPayment {
        order_id,
        amount: order.total,
        currency: order.currency.clone(),
        session_id: session_id.map(str::to_string),
        indicator_token: None,
        status: status.unwrap_or(PaymentStatus::Initiated),
        method: order.payment_method.for_attempt(),
        gateway_raw: None,
      })
      .await
  }

  /// Sets or clears `paid_at` on the order.
  pub async fn mark_order_paid(&self, order_id: Uuid, is_paid: bool) {
    let patch = crate::models::OrderPatch {
      paid_at: Some(is_paid.then(Utc::now)),
      ..Default::default()
    };
    swallow("mark_order_paid", self.store.update_order(order_id, &patch).await);
  }

  /// Stores the gateway's latest answer on the order.
  pub async fn set_order_gateway_raw(&self, order_id: Uuid, payload: Value) {
    let patch = crate::models::OrderPatch {
      gateway_raw: Some(payload),
      ..Default::default()
    };
    swallow("set_order_gateway_raw", self.store.update_order(order_id, &patch).await);
  }

  /// Mirrors an expiry sweep onto the orders' payment rows.
  pub async fn mirror_expired_orders(&self, order_ids: &[Uuid], status: PaymentStatus) -> u64 {
    if !self.enabled || order_ids.is_empty() {
      return 0;
    }
    swallow(
      "update_payments_for_orders",
      self.store.update_payments_for_orders(order_ids, status).await,
    )
    .unwrap_or(0)
  }
}
