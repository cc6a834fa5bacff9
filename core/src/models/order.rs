// payrecon/src/models/order.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Order lifecycle. Statuses the engine does not know about are kept
/// verbatim so administrative values survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
  Pending,
  Paid,
  Failed,
  Cancelled,
  Other(String),
}

impl OrderStatus {
  pub fn as_str(&self) -> &str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Paid => "paid",
      OrderStatus::Failed => "failed",
      OrderStatus::Cancelled => "cancelled",
      OrderStatus::Other(s) => s.as_str(),
    }
  }

  pub fn is_paid(&self) -> bool {
    matches!(self, OrderStatus::Paid)
  }

  /// Maps the human-readable token the gateway appends to its browser
  /// return URL. Unknown tokens pass through unchanged.
  pub fn from_return_message(message: &str) -> Self {
    match message.trim().to_ascii_lowercase().as_str() {
      "success" => OrderStatus::Paid,
      "error" | "wrong" | "fail" | "failed" | "rejected" => OrderStatus::Failed,
      "cancel" | "cancelled" => OrderStatus::Cancelled,
      other => OrderStatus::from(other.to_string()),
    }
  }
}

impl From<String> for OrderStatus {
  fn from(value: String) -> Self {
    match value.as_str() {
      "pending" => OrderStatus::Pending,
      "paid" => OrderStatus::Paid,
      "failed" => OrderStatus::Failed,
      "cancelled" => OrderStatus::Cancelled,
      _ => OrderStatus::Other(value),
    }
  }
}

impl From<OrderStatus> for String {
  fn from(value: OrderStatus) -> Self {
    value.as_str().to_string()
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
  #[default]
  Card,
  Knet,
  Cod,
}

impl PaymentMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      PaymentMethod::Card => "CARD",
      PaymentMethod::Knet => "KNET",
      PaymentMethod::Cod => "COD",
    }
  }

  /// Case-insensitive; anything unrecognised is a card payment.
  pub fn parse_lenient(raw: &str) -> Self {
    match raw.trim().to_ascii_uppercase().as_str() {
      "KNET" => PaymentMethod::Knet,
      "COD" => PaymentMethod::Cod,
      _ => PaymentMethod::Card,
    }
  }

  /// Payment attempts only ever record an online method.
  pub fn for_attempt(self) -> Self {
    match self {
      PaymentMethod::Knet => PaymentMethod::Knet,
      _ => PaymentMethod::Card,
    }
  }
}

/// Contact fields forwarded to the gateway and used to prefill landing pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
  pub name: String,
  pub phone: String,
  pub email: String,
  pub address: String,
  pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
  pub id: Uuid,
  /// Gateway-side order reference, written when a session is opened.
  pub order_number: Option<i64>,
  pub subtotal: Decimal,
  pub discount: Decimal,
  pub total: Decimal,
  pub currency: String,
  pub status: OrderStatus,
  pub payment_method: PaymentMethod,
  pub session_id: Option<String>,
  /// Indicator token returned when the session was created.
  pub payment_ref: Option<String>,
  pub gateway_raw: Option<Value>,
  pub paid_at: Option<DateTime<Utc>>,
  pub delivered_at: Option<DateTime<Utc>>,
  pub coupon_code: Option<String>,
  pub coupon_applied: bool,
  pub cart_fingerprint: Option<String>,
  pub customer: CustomerDetails,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Order {
  /// A fresh pending order as the storefront would insert it.
  pub fn pending(total: Decimal, created_at: DateTime<Utc>) -> Self {
    Self {
      id: Uuid::new_v4(),
      order_number: None,
      subtotal: total,
      discount: Decimal::ZERO,
      total,
      currency: crate::money::DEFAULT_CURRENCY.to_string(),
      status: OrderStatus::Pending,
      payment_method: PaymentMethod::Card,
      session_id: None,
      payment_ref: None,
      gateway_raw: None,
      paid_at: None,
      delivered_at: None,
      coupon_code: None,
      coupon_applied: false,
      cart_fingerprint: None,
      customer: CustomerDetails::default(),
      created_at,
      updated_at: created_at,
    }
  }

  /// Applies a patch the way the stores do, so both backends agree.
  pub fn apply(&mut self, patch: &OrderPatch, now: DateTime<Utc>) {
    if let Some(status) = &patch.status {
      self.status = status.clone();
    }
    if let Some(paid_at) = patch.paid_at {
      self.paid_at = paid_at;
    }
    if let Some(session_id) = &patch.session_id {
      self.session_id = Some(session_id.clone());
    }
    if let Some(payment_ref) = &patch.payment_ref {
      self.payment_ref = Some(payment_ref.clone());
    }
    if let Some(order_number) = patch.order_number {
      self.order_number = Some(order_number);
    }
    if let Some(raw) = &patch.gateway_raw {
      self.gateway_raw = Some(raw.clone());
    }
    self.updated_at = now;
  }
}

/// Sparse order update. `None` leaves a column untouched; `paid_at` uses a
/// nested option so it can be cleared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPatch {
  pub status: Option<OrderStatus>,
  pub paid_at: Option<Option<DateTime<Utc>>>,
  pub session_id: Option<String>,
  pub payment_ref: Option<String>,
  pub order_number: Option<i64>,
  pub gateway_raw: Option<Value>,
}

impl OrderPatch {
  pub fn is_empty(&self) -> bool {
    self == &OrderPatch::default()
  }
}
