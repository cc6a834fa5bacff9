// payrecon/src/gateway/mod.rs

//! Outbound calls to the Click payment gateway.

pub mod click;
pub mod normalize;

use crate::models::CustomerDetails;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

pub use click::ClickGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
  #[default]
  En,
  Ar,
}

impl Lang {
  /// Only Arabic is recognised; everything else is English.
  pub fn parse(raw: &str) -> Self {
    if raw.trim().eq_ignore_ascii_case("ar") {
      Lang::Ar
    } else {
      Lang::En
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Lang::En => "en",
      Lang::Ar => "ar",
    }
  }
}

#[derive(Debug, Clone)]
pub struct SessionRequest {
  /// Must be unique per attempt; the gateway rejects reused references.
  pub order_reference: i64,
  pub amount: Decimal,
  pub return_url: String,
  pub customer: CustomerDetails,
  pub lang: Lang,
}

#[derive(Debug, Clone)]
pub struct SessionUpdateRequest {
  pub session_id: String,
  pub order_reference: i64,
  pub amount: Decimal,
  pub return_url: String,
  pub customer: CustomerDetails,
  pub lang: Lang,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedSession {
  pub session_id: String,
  pub indicator_token: String,
  pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
  /// The gateway pointed us somewhere with a `Location` header. `http_status`
  /// is set for 3xx answers and absent for a 200 that carried the header.
  Redirect { location: String, http_status: Option<u16> },
  /// A JSON body, with the payment URL if one could be found in it.
  Payload { payment_url: Option<String>, raw: Value },
}

impl SessionUpdate {
  pub fn raw(&self) -> Value {
    match self {
      SessionUpdate::Redirect {
        location,
        http_status: Some(status),
      } => json!({ "location": location, "status": status }),
      SessionUpdate::Redirect { location, http_status: None } => json!({ "location": location }),
      SessionUpdate::Payload { raw, .. } => raw.clone(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
  Success,
  Failed,
  Pending,
}

impl GatewayStatus {
  /// Case-insensitive. Anything that is neither a success nor an explicit failure is pending.
  pub fn classify(status_text: &str) -> Self {
    match status_text.trim().to_ascii_lowercase().as_str() {
      "success" => GatewayStatus::Success,
      "failed" | "fail" | "rejected" => GatewayStatus::Failed,
      _ => GatewayStatus::Pending,
    }
  }

  pub fn is_definitive(&self) -> bool {
    !matches!(self, GatewayStatus::Pending)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
  pub raw: Value,
  /// Lower-cased status text as the gateway sent it.
  pub status_text: String,
  pub status: GatewayStatus,
  pub transaction_id: Option<String>,
  pub reference_no: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOperation {
  CreateSession,
  UpdateSession,
  PaymentStatus,
}

impl GatewayOperation {
  pub fn failure_code(&self) -> &'static str {
    match self {
      GatewayOperation::CreateSession => "click_create_session_failed",
      GatewayOperation::UpdateSession => "click_update_session_failed",
      GatewayOperation::PaymentStatus => "paymentstatus_http_error",
    }
  }
}

/// Every variant means "the gateway could not be reached or understood";
/// none of them says anything about whether the customer paid.
#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("Gateway request timed out")]
  Timeout,

  #[error("Gateway transport error: {0}")]
  Transport(#[source] reqwest::Error),

  #[error("Gateway responded with HTTP {status}")]
  Status { status: u16, body: String },

  #[error("Malformed gateway response: {0}")]
  Malformed(String),

  #[error("Gateway rejected the request: {message}")]
  Rejected { message: String },

  #[error("All {attempts} gateway endpoints failed; last error: {last}")]
  Exhausted {
    attempts: usize,
    #[source]
    last: Box<GatewayError>,
  },

  #[error("Invalid gateway base URL: {0}")]
  InvalidBaseUrl(String),
}

impl From<reqwest::Error> for GatewayError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      GatewayError::Timeout
    } else {
      GatewayError::Transport(err)
    }
  }
}

impl GatewayError {
  /// HTTP status of the failing response, looking through `Exhausted`.
  pub fn http_status(&self) -> Option<u16> {
    match self {
      GatewayError::Status { status, .. } => Some(*status),
      GatewayError::Exhausted { last, .. } => last.http_status(),
      _ => None,
    }
  }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  async fn create_session(&self, request: &SessionRequest) -> Result<CreatedSession, GatewayError>;

  async fn update_session(&self, request: &SessionUpdateRequest) -> Result<SessionUpdate, GatewayError>;

  async fn query_status(&self, session_id: &str, order_reference: Option<i64>) -> Result<StatusReport, GatewayError>;
}
