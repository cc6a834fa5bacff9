// payrecon_server/src/config.rs

use crate::errors::{ApiError, Result};
use dotenvy::dotenv;
use payrecon::{GatewayConfig, ReconcileConfig, RedirectFallback};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CLICK_BASE_URL: &str = "https://clickkw.com";

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub database_max_connections: u32,

  /// Public storefront URL the gateway sends customers back to.
  pub base_url: String,

  pub click_base_url: String,
  pub click_developer_user: String,
  pub click_key: String,
  pub click_payment_url_template: Option<String>,
  pub click_static_pay_url: Option<String>,
  pub gateway_timeout: Duration,

  pub min_order_amount: Decimal,
  pub pending_ttl_minutes: i64,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present
    Self::from_lookup(|name| env::var(name).ok())
  }

  /// Builds the config from any variable source. Blank values count as unset.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let get_opt = |var_name: &str| lookup(var_name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let get_env = |var_name: &str| {
      get_opt(var_name).ok_or_else(|| ApiError::Config(format!("Missing environment variable '{}'", var_name)))
    };

    let server_host = get_opt("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
    let server_port = get_opt("SERVER_PORT")
      .unwrap_or_else(|| "8080".to_string())
      .parse::<u16>()
      .map_err(|e| ApiError::Config(format!("Invalid SERVER_PORT: {}", e)))?;
    let database_url = get_env("DATABASE_URL")?;
    let database_max_connections = get_opt("DATABASE_MAX_CONNECTIONS")
      .unwrap_or_else(|| "5".to_string())
      .parse::<u32>()
      .map_err(|e| ApiError::Config(format!("Invalid DATABASE_MAX_CONNECTIONS: {}", e)))?;
    let base_url = get_env("BASE_URL")?;

    let click_base_url = get_opt("CLICK_BASE_URL").unwrap_or_else(|| DEFAULT_CLICK_BASE_URL.to_string());
    let click_developer_user = get_env("CLICK_DEVELOPER_USER")?;
    let click_key = get_env("CLICK_KEY")?;
    let click_payment_url_template = get_opt("CLICK_PAYMENT_URL_TEMPLATE");
    let click_static_pay_url = get_opt("CLICK_STATIC_PAY_URL");
    let gateway_timeout = get_opt("GATEWAY_TIMEOUT_SECS")
      .unwrap_or_else(|| "10".to_string())
      .parse::<u64>()
      .map(Duration::from_secs)
      .map_err(|e| ApiError::Config(format!("Invalid GATEWAY_TIMEOUT_SECS: {}", e)))?;

    let min_order_amount = get_opt("MIN_ORDER_KWD")
      .map(|raw| Decimal::from_str(&raw))
      .transpose()
      .map_err(|e| ApiError::Config(format!("Invalid MIN_ORDER_KWD: {}", e)))?
      .unwrap_or(Decimal::ZERO);
    let pending_ttl_minutes = get_opt("PAYMENT_PENDING_TTL_MIN")
      .unwrap_or_else(|| "60".to_string())
      .parse::<i64>()
      .map_err(|e| ApiError::Config(format!("Invalid PAYMENT_PENDING_TTL_MIN: {}", e)))?;

    tracing::info!("Application configuration loaded successfully.");

    Ok(Self {
      server_host,
      server_port,
      database_url,
      database_max_connections,
      base_url,
      click_base_url,
      click_developer_user,
      click_key,
      click_payment_url_template,
      click_static_pay_url,
      gateway_timeout,
      min_order_amount,
      pending_ttl_minutes,
    })
  }

  pub fn gateway_config(&self) -> GatewayConfig {
    let mut config = GatewayConfig::new(&self.click_base_url, &self.click_developer_user, &self.click_key);
    config.timeout = self.gateway_timeout;
    config
  }

  pub fn reconcile_config(&self) -> ReconcileConfig {
    let fallback = RedirectFallback {
      template: self.click_payment_url_template.clone(),
      static_pay_url: self.click_static_pay_url.clone(),
      gateway_base_url: self.click_base_url.clone(),
      developer_user: self.click_developer_user.clone(),
    };
    let mut config = ReconcileConfig::new(&self.base_url, fallback);
    config.min_order_amount = self.min_order_amount;
    config.pending_ttl_minutes = self.pending_ttl_minutes;
    config
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  fn required() -> Vec<(&'static str, &'static str)> {
    vec![
      ("DATABASE_URL", "postgres://localhost/shop"),
      ("BASE_URL", "https://shop.example"),
      ("CLICK_DEVELOPER_USER", "dev1"),
      ("CLICK_KEY", "secret"),
    ]
  }

  #[test]
  fn defaults_fill_optional_values() {
    let env = vars(&required());
    let cfg = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
    assert_eq!(cfg.server_port, 8080);
    assert_eq!(cfg.database_max_connections, 5);
    assert_eq!(cfg.click_base_url, DEFAULT_CLICK_BASE_URL);
    assert_eq!(cfg.pending_ttl_minutes, 60);
    assert_eq!(cfg.min_order_amount, Decimal::ZERO);
    assert_eq!(cfg.gateway_timeout, Duration::from_secs(10));
    assert!(cfg.click_payment_url_template.is_none());
  }

  #[test]
  fn missing_gateway_credentials_fail() {
    let mut pairs = required();
    pairs.retain(|(k, _)| *k != "CLICK_KEY");
    let env = vars(&pairs);
    let err = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
    assert!(err.to_string().contains("CLICK_KEY"));
  }

  #[test]
  fn blank_values_count_as_unset() {
    let mut pairs = required();
    pairs.push(("CLICK_STATIC_PAY_URL", "  "));
    pairs.push(("MIN_ORDER_KWD", "2.5"));
    let env = vars(&pairs);
    let cfg = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
    assert!(cfg.click_static_pay_url.is_none());
    assert_eq!(cfg.reconcile_config().min_order_amount, Decimal::from_str("2.5").unwrap());
  }
}
