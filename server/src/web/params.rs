// payrecon_server/src/web/params.rs

//! Request parameters. Every endpoint reads the query string on GET and a
//! JSON body on POST, and both shapes deserialize into the same structs.

use crate::errors::ApiError;
use actix_web::web;
use payrecon::money::{amount_from_f64, coerce_amount};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

/// A loosely typed value: JSON bodies send real booleans and numbers,
/// query strings send text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
  Bool(bool),
  Int(i64),
  Float(f64),
  Text(String),
}

impl ParamValue {
  /// `true`, `1`, `"1"` and `"true"` (any case).
  pub fn is_truthy(&self) -> bool {
    match self {
      ParamValue::Bool(b) => *b,
      ParamValue::Int(n) => *n == 1,
      ParamValue::Float(f) => *f == 1.0,
      ParamValue::Text(s) => {
        let s = s.trim();
        s == "1" || s.eq_ignore_ascii_case("true")
      }
    }
  }

  /// Truncates toward zero. Non-numeric input reads as absent; range checks
  /// belong to the caller.
  pub fn as_i64(&self) -> Option<i64> {
    let value = match self {
      ParamValue::Int(n) => *n as f64,
      ParamValue::Float(f) => *f,
      ParamValue::Text(s) => s.trim().parse::<f64>().ok()?,
      ParamValue::Bool(_) => return None,
    };
    value.is_finite().then(|| value.trunc() as i64)
  }

  pub fn as_amount(&self) -> Option<Decimal> {
    match self {
      ParamValue::Int(n) => Some(Decimal::from(*n)),
      ParamValue::Float(f) => Some(amount_from_f64(*f)),
      ParamValue::Text(s) if !s.trim().is_empty() => Some(coerce_amount(s)),
      _ => None,
    }
  }
}

pub fn flag(value: &Option<ParamValue>) -> bool {
  value.as_ref().is_some_and(ParamValue::is_truthy)
}

pub fn non_empty(value: Option<String>) -> Option<String> {
  value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn order_id(raw: Option<String>) -> Result<Uuid, ApiError> {
  let raw = non_empty(raw).ok_or(ApiError::MissingParameter("orderId"))?;
  Uuid::parse_str(&raw).map_err(|e| ApiError::InvalidParameter {
    name: "orderId",
    reason: e.to_string(),
  })
}

/// Prefers a JSON body when one was sent and parsed.
pub fn pick<T>(query: web::Query<T>, body: Option<web::Json<T>>) -> T {
  match body {
    Some(body) => body.into_inner(),
    None => query.into_inner(),
  }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionParams {
  #[serde(rename = "orderId")]
  pub order_id: Option<String>,
  pub force: Option<ParamValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSessionParams {
  #[serde(rename = "orderId")]
  pub order_id: Option<String>,
  #[serde(rename = "sessionId")]
  pub session_id: Option<String>,
  pub lang: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmParams {
  #[serde(rename = "orderId")]
  pub order_id: Option<String>,
  #[serde(rename = "sessionId")]
  pub session_id: Option<String>,
  pub indicator_status: Option<String>,
  pub force: Option<ParamValue>,
  #[serde(rename = "failIfPending")]
  pub fail_if_pending: Option<ParamValue>,
  pub message: Option<String>,
  pub message_type: Option<String>,
  pub wait: Option<ParamValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
  #[serde(rename = "orderId")]
  pub order_id: Option<String>,
  #[serde(rename = "sessionId")]
  pub session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExpireParams {
  pub minutes: Option<ParamValue>,
  pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CouponParams {
  pub code: Option<String>,
  pub subtotal: Option<ParamValue>,
}
