// tests/common/mod.rs
#![allow(dead_code)] // Not every test binary uses every helper

use chrono::{Duration as ChronoDuration, Utc};
use payrecon::models::{Coupon, Order};
use payrecon::{ClickGateway, MemoryStore, PaymentLedger, Reconciler, Store};
use payrecon_server::config::AppConfig;
use payrecon_server::state::AppState;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::Level;
use uuid::Uuid;
use wiremock::MockServer;

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

/// Builds an actix test service over the context's state.
macro_rules! init_app {
  ($ctx:expr) => {
    actix_web::test::init_service(
      actix_web::App::new()
        .app_data(actix_web::web::Data::new($ctx.state.clone()))
        .configure(payrecon_server::web::configure_app_routes),
    )
    .await
  };
}

pub fn amount(raw: &str) -> Decimal {
  Decimal::from_str(raw).unwrap()
}

pub fn order_created_ago(total: &str, minutes: i64) -> Order {
  let mut order = Order::pending(amount(total), Utc::now() - ChronoDuration::minutes(minutes));
  order.customer.name = "Noura A".into();
  order.customer.phone = "+96551234567".into();
  order
}

pub fn pending_order(total: &str) -> Order {
  order_created_ago(total, 5)
}

pub fn order_with_session(total: &str, session_id: &str, indicator: &str) -> Order {
  let mut order = pending_order(total);
  order.session_id = Some(session_id.into());
  order.payment_ref = Some(indicator.into());
  order.order_number = Some(1_700_000_000_555);
  order
}

pub fn coupon(code: &str) -> Coupon {
  Coupon {
    id: Uuid::new_v4(),
    code: code.into(),
    pct_off: Some(Decimal::from(10)),
    amount_off: None,
    used_count: 0,
    usage_limit: None,
    starts_at: None,
    ends_at: None,
    active: true,
  }
}

/// App state wired to an in-memory store and a mocked Click endpoint.
pub struct TestContext {
  pub gateway: MockServer,
  pub store: Arc<MemoryStore>,
  pub config: AppConfig,
  pub state: AppState,
}

impl TestContext {
  pub async fn new() -> Self {
    Self::with_vars(&[]).await
  }

  pub async fn with_vars(extra: &[(&str, &str)]) -> Self {
    let gateway = MockServer::start().await;
    let mut vars: HashMap<String, String> = [
      ("DATABASE_URL", "postgres://unused/shop"),
      ("BASE_URL", "https://shop.example"),
      ("CLICK_DEVELOPER_USER", "dev1"),
      ("CLICK_KEY", "secret-key"),
      ("GATEWAY_TIMEOUT_SECS", "2"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    vars.insert("CLICK_BASE_URL".into(), gateway.uri());
    for (k, v) in extra {
      vars.insert(k.to_string(), v.to_string());
    }
    let config = AppConfig::from_lookup(|k| vars.get(k).cloned()).expect("test config should load");

    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn Store> = store.clone();
    let ledger = PaymentLedger::probe(dyn_store.clone()).await;
    let click = Arc::new(ClickGateway::new(config.gateway_config()).expect("mock gateway url is valid"));
    let reconciler = Reconciler::new(dyn_store, ledger, click, config.reconcile_config());

    Self {
      gateway,
      store,
      config,
      state: AppState { reconciler },
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
