// tests/common/mod.rs
#![allow(dead_code)] // Each test binary uses a different slice of these helpers

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use payrecon::config::{ReconcileConfig, RedirectFallback};
use payrecon::gateway::{
  CreatedSession, GatewayError, GatewayStatus, PaymentGateway, SessionRequest, SessionUpdate, SessionUpdateRequest,
  StatusReport,
};
use payrecon::models::{Coupon, Order};
use payrecon::{MemoryStore, PaymentLedger, Reconciler, Store};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::Level;
use uuid::Uuid;

// --- Helper for Tracing Setup ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Fixtures ---

pub fn amount(raw: &str) -> Decimal {
  Decimal::from_str(raw).unwrap()
}

pub fn pending_order(total: &str) -> Order {
  let mut order = Order::pending(amount(total), Utc::now() - ChronoDuration::minutes(5));
  order.customer.name = "Noura A".into();
  order.customer.phone = "+96551234567".into();
  order.customer.email = "noura@example.com".into();
  order
}

pub fn order_created_ago(total: &str, minutes: i64) -> Order {
  let mut order = pending_order(total);
  order.created_at = Utc::now() - ChronoDuration::minutes(minutes);
  order.updated_at = order.created_at;
  order
}

/// A pending order that already went through create-session.
pub fn order_with_session(total: &str, session_id: &str, indicator: &str) -> Order {
  let mut order = pending_order(total);
  order.session_id = Some(session_id.into());
  order.payment_ref = Some(indicator.into());
  order.order_number = Some(1_700_000_000_123);
  order
}

pub fn coupon(code: &str, used_count: i64, usage_limit: Option<i64>) -> Coupon {
  Coupon {
    id: Uuid::new_v4(),
    code: code.into(),
    pct_off: Some(Decimal::from(10)),
    amount_off: None,
    used_count,
    usage_limit,
    starts_at: None,
    ends_at: None,
    active: true,
  }
}

pub fn status_report(status_text: &str) -> StatusReport {
  StatusReport {
    raw: json!({ "Status": status_text }),
    status_text: status_text.to_lowercase(),
    status: GatewayStatus::classify(status_text),
    transaction_id: None,
    reference_no: None,
  }
}

pub fn test_config() -> ReconcileConfig {
  let fallback = RedirectFallback {
    template: None,
    static_pay_url: None,
    gateway_base_url: "https://gw.example".into(),
    developer_user: "dev1".into(),
  };
  let mut config = ReconcileConfig::new("https://shop.example", fallback);
  config.poll_interval = Duration::from_millis(10);
  config.forced_wait = Duration::from_millis(200);
  config
}

pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
  Utc::now() - ChronoDuration::minutes(minutes)
}

// --- Scripted gateway ---

/// In-process gateway answering from per-operation queues. An empty queue
/// falls back to a default answer; for status queries the last scripted
/// answer repeats.
///
/// `hold()` parks every create and status call until the returned `Notify`
/// fires, so tests can interleave two operations on one order.
#[derive(Default)]
pub struct ScriptedGateway {
  creates: Mutex<VecDeque<Result<CreatedSession, GatewayError>>>,
  updates: Mutex<VecDeque<Result<SessionUpdate, GatewayError>>>,
  statuses: Mutex<VecDeque<Result<StatusReport, GatewayError>>>,
  last_status: Mutex<Option<StatusReport>>,
  pub create_calls: AtomicUsize,
  pub update_calls: AtomicUsize,
  pub status_calls: AtomicUsize,
  pub last_create: Mutex<Option<SessionRequest>>,
  pub last_update: Mutex<Option<SessionUpdateRequest>>,
  gate: Mutex<Option<Arc<Notify>>>,
  /// Signalled when a call reaches the gate.
  pub entered: Notify,
}

impl ScriptedGateway {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn push_create(&self, answer: Result<CreatedSession, GatewayError>) {
    self.creates.lock().push_back(answer);
  }

  pub fn push_update(&self, answer: Result<SessionUpdate, GatewayError>) {
    self.updates.lock().push_back(answer);
  }

  pub fn push_status(&self, answer: Result<StatusReport, GatewayError>) {
    self.statuses.lock().push_back(answer);
  }

  pub fn hold(&self) -> Arc<Notify> {
    let gate = Arc::new(Notify::new());
    *self.gate.lock() = Some(gate.clone());
    gate
  }

  /// Calls made from now on pass straight through; parked ones stay parked.
  pub fn stop_holding(&self) {
    self.gate.lock().take();
  }

  async fn pass_gate(&self) {
    let gate = self.gate.lock().clone();
    if let Some(gate) = gate {
      self.entered.notify_one();
      gate.notified().await;
    }
  }

  pub fn calls(&self) -> (usize, usize, usize) {
    (
      self.create_calls.load(Ordering::SeqCst),
      self.update_calls.load(Ordering::SeqCst),
      self.status_calls.load(Ordering::SeqCst),
    )
  }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
  async fn create_session(&self, request: &SessionRequest) -> Result<CreatedSession, GatewayError> {
    let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
    *self.last_create.lock() = Some(request.clone());
    self.pass_gate().await;
    let scripted = self.creates.lock().pop_front();
    scripted.unwrap_or_else(|| {
      Ok(CreatedSession {
        session_id: format!("S-{n}"),
        indicator_token: format!("IND-{n}"),
        raw: json!({ "status": 1, "gatewayResponse": { "session_id": format!("S-{n}") } }),
      })
    })
  }

  async fn update_session(&self, request: &SessionUpdateRequest) -> Result<SessionUpdate, GatewayError> {
    self.update_calls.fetch_add(1, Ordering::SeqCst);
    *self.last_update.lock() = Some(request.clone());
    let scripted = self.updates.lock().pop_front();
    scripted.unwrap_or_else(|| {
      Ok(SessionUpdate::Payload {
        payment_url: None,
        raw: json!({ "status": 1 }),
      })
    })
  }

  async fn query_status(&self, _session_id: &str, _order_reference: Option<i64>) -> Result<StatusReport, GatewayError> {
    self.status_calls.fetch_add(1, Ordering::SeqCst);
    self.pass_gate().await;
    let scripted = self.statuses.lock().pop_front();
    match scripted {
      Some(Ok(report)) => {
        *self.last_status.lock() = Some(report.clone());
        Ok(report)
      }
      Some(Err(err)) => Err(err),
      None => Ok(self.last_status.lock().clone().unwrap_or_else(|| status_report("pending"))),
    }
  }
}

// --- Harness ---

pub struct Harness {
  pub store: Arc<MemoryStore>,
  pub gateway: Arc<ScriptedGateway>,
  pub reconciler: Reconciler,
}

impl Harness {
  pub async fn new() -> Self {
    Self::with_store(MemoryStore::new(), test_config()).await
  }

  pub async fn with_config(config: ReconcileConfig) -> Self {
    Self::with_store(MemoryStore::new(), config).await
  }

  pub async fn with_store(store: MemoryStore, config: ReconcileConfig) -> Self {
    let store = Arc::new(store);
    let dyn_store: Arc<dyn Store> = store.clone();
    let ledger = PaymentLedger::probe(dyn_store.clone()).await;
    let gateway = ScriptedGateway::new();
    let reconciler = Reconciler::new(dyn_store, ledger, gateway.clone(), config);
    Self {
      store,
      gateway,
      reconciler,
    }
  }

  pub fn seed(&self, order: Order) -> Uuid {
    let id = order.id;
    self.store.insert_order(order);
    id
  }

  pub fn order(&self, id: Uuid) -> Order {
    self.store.order(id).expect("order should exist")
  }
}
