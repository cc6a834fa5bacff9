// payrecon/src/engine/mod.rs

//! The reconciliation state machine.
//!
//! Each operation is a `Flow` over its own context. Mandatory steps touch the
//! order and the gateway; optional steps keep the payments audit trail and
//! the coupon counter, whose failures never fail the operation.

pub mod confirm;
pub mod coupons;
pub mod create_session;
pub mod error;
pub mod expire;
pub mod update_session;

use crate::config::ReconcileConfig;
use crate::coupon_counter::CouponCounter;
use crate::flow::{Flow, FlowError};
use crate::gateway::PaymentGateway;
use crate::models::Order;
use crate::store::{PaymentLedger, Store};
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub use confirm::{ConfirmRequest, ConfirmVia, Confirmation};
pub use coupons::CouponCheck;
pub use create_session::SessionHandle;
pub use error::{ErrorKind, ReconcileError};
pub use expire::{ExpireReport, ExpireTarget};
pub use update_session::{PaymentRedirect, RedirectSource};

/// Everything an operation needs, shared by all flow contexts.
pub struct Services {
  pub store: Arc<dyn Store>,
  pub ledger: PaymentLedger,
  pub gateway: Arc<dyn PaymentGateway>,
  pub coupons: CouponCounter,
  pub config: ReconcileConfig,
}

#[derive(Clone)]
pub struct Reconciler {
  services: Arc<Services>,
  create_flow: Arc<Flow<create_session::CreateSessionCtx, ReconcileError>>,
  update_flow: Arc<Flow<update_session::UpdateSessionCtx, ReconcileError>>,
  confirm_flow: Arc<Flow<confirm::ConfirmCtx, ReconcileError>>,
}

impl Reconciler {
  pub fn new(
    store: Arc<dyn Store>,
    ledger: PaymentLedger,
    gateway: Arc<dyn PaymentGateway>,
    config: ReconcileConfig,
  ) -> Self {
    let services = Arc::new(Services {
      coupons: CouponCounter::new(store.clone()),
      store,
      ledger,
      gateway,
      config,
    });
    Self {
      services,
      create_flow: Arc::new(create_session::build_flow()),
      update_flow: Arc::new(update_session::build_flow()),
      confirm_flow: Arc::new(confirm::build_flow()),
    }
  }

  pub fn services(&self) -> &Services {
    &self.services
  }
}

pub(crate) async fn fetch_order(services: &Services, order_id: Uuid) -> Result<Order, ReconcileError> {
  services
    .store
    .fetch_order(order_id)
    .await?
    .ok_or(ReconcileError::OrderNotFound(order_id))
}

pub(crate) fn missing(step_name: &'static str, what: &'static str) -> ReconcileError {
  ReconcileError::Flow(FlowError::MissingState { step_name, what })
}

static LAST_ORDER_REFERENCE: AtomicI64 = AtomicI64::new(0);

/// Millisecond timestamp, bumped when two sessions open in the same millisecond.
pub(crate) fn next_order_reference() -> i64 {
  let now = Utc::now().timestamp_millis();
  let mut last = LAST_ORDER_REFERENCE.load(Ordering::Relaxed);
  loop {
    let next = now.max(last + 1);
    match LAST_ORDER_REFERENCE.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
      Ok(_) => return next,
      Err(observed) => last = observed,
    }
  }
}

/// Keeps a derived reference inside the gateway's integer range.
pub(crate) fn fallback_order_reference() -> i64 {
  Utc::now().timestamp_millis() % 1_000_000_000
}
