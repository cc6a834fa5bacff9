// payrecon/src/config.rs

//! Explicit configuration handed to the gateway client and the engine at
//! construction time. Loading from the environment is the server's job.

use rust_decimal::Decimal;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://clickkw.com";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
  pub base_url: String,
  pub developer_user: String,
  pub api_key: String,
  /// Per-request timeout, independent of any polling window.
  pub timeout: Duration,
}

impl GatewayConfig {
  pub fn new(base_url: impl Into<String>, developer_user: impl Into<String>, api_key: impl Into<String>) -> Self {
    Self {
      base_url: base_url.into(),
      developer_user: developer_user.into(),
      api_key: api_key.into(),
      timeout: Duration::from_secs(10),
    }
  }
}

/// Where to send the customer when the gateway returns no payment URL.
#[derive(Debug, Clone, Default)]
pub struct RedirectFallback {
  /// Supports `{session_id}` and `{developer_user}` placeholders.
  pub template: Option<String>,
  /// Static landing page that accepts a prefilled query string.
  pub static_pay_url: Option<String>,
  pub gateway_base_url: String,
  pub developer_user: String,
}

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
  /// Storefront origin used for gateway return URLs.
  pub storefront_base_url: String,
  /// Orders below this total cannot open or update a session. Zero disables the check.
  pub min_order_amount: Decimal,
  pub pending_ttl_minutes: i64,
  pub poll_interval: Duration,
  /// Polling window applied to forced re-checks when the caller gives none.
  pub forced_wait: Duration,
  /// Hard upper bound on any polling window.
  pub max_wait: Duration,
  pub redirect_fallback: RedirectFallback,
}

impl ReconcileConfig {
  pub fn new(storefront_base_url: impl Into<String>, redirect_fallback: RedirectFallback) -> Self {
    Self {
      storefront_base_url: storefront_base_url.into(),
      min_order_amount: Decimal::ZERO,
      pending_ttl_minutes: 60,
      poll_interval: Duration::from_secs(1),
      forced_wait: Duration::from_secs(10),
      max_wait: Duration::from_secs(60),
      redirect_fallback,
    }
  }

  pub fn return_url(&self, order_id: Uuid, lang: Option<&str>) -> String {
    let base = self.storefront_base_url.trim_end_matches('/');
    match lang {
      Some(lang) => format!("{base}/checkout/return?orderId={order_id}&lang={lang}"),
      None => format!("{base}/checkout/return?orderId={order_id}"),
    }
  }

  /// Zero or missing means "use the default for this kind of call".
  pub fn polling_window(&self, requested_secs: Option<u64>, forced: bool) -> Duration {
    let requested = requested_secs.filter(|s| *s > 0).map(Duration::from_secs);
    let default = if forced { self.forced_wait } else { Duration::ZERO };
    requested.unwrap_or(default).min(self.max_wait)
  }
}
