// payrecon/src/models/payment.rs

use super::order::PaymentMethod;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
  Initiated,
  Captured,
  Failed,
  Redirected,
}

impl PaymentStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      PaymentStatus::Initiated => "initiated",
      PaymentStatus::Captured => "captured",
      PaymentStatus::Failed => "failed",
      PaymentStatus::Redirected => "redirected",
    }
  }

  pub fn parse(raw: &str) -> Option<Self> {
    match raw {
      "initiated" => Some(PaymentStatus::Initiated),
      "captured" => Some(PaymentStatus::Captured),
      "failed" => Some(PaymentStatus::Failed),
      "redirected" => Some(PaymentStatus::Redirected),
      _ => None,
    }
  }
}

/// One attempt to pay an order through a gateway session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
  pub id: Uuid,
  pub order_id: Uuid,
  pub amount: Decimal,
  pub currency: String,
  pub session_id: Option<String>,
  pub indicator_token: Option<String>,
  pub status: PaymentStatus,
  pub method: PaymentMethod,
  pub gateway_transaction_id: Option<String>,
  pub reference_no: Option<String>,
  pub gateway_raw: Option<Value>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
  pub order_id: Uuid,
  pub amount: Decimal,
  pub currency: String,
  pub session_id: Option<String>,
  pub indicator_token: Option<String>,
  pub status: PaymentStatus,
  pub method: PaymentMethod,
  pub gateway_raw: Option<Value>,
}

/// Only the `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentPatch {
  pub status: Option<PaymentStatus>,
  pub gateway_raw: Option<Value>,
  pub gateway_transaction_id: Option<String>,
  pub reference_no: Option<String>,
}

impl Payment {
  pub fn apply(&mut self, patch: &PaymentPatch, now: DateTime<Utc>) {
    if let Some(status) = patch.status {
      self.status = status;
    }
    if let Some(raw) = &patch.gateway_raw {
      self.gateway_raw = Some(raw.clone());
    }
    if let Some(txid) = &patch.gateway_transaction_id {
      self.gateway_transaction_id = Some(txid.clone());
    }
    if let Some(refno) = &patch.reference_no {
      self.reference_no = Some(refno.clone());
    }
    self.updated_at = now;
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventKind {
  SessionCreated,
  SessionUpdated,
  Redirected,
  StatusChecked,
}

impl PaymentEventKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      PaymentEventKind::SessionCreated => "session_created",
      PaymentEventKind::SessionUpdated => "session_updated",
      PaymentEventKind::Redirected => "redirected",
      PaymentEventKind::StatusChecked => "status_checked",
    }
  }
}

/// Append-only audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
  pub id: Uuid,
  pub payment_id: Uuid,
  pub event: String,
  pub payload: Option<Value>,
  pub created_at: DateTime<Utc>,
}
