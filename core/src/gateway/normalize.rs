// payrecon/src/gateway/normalize.rs

//! Field lookups for gateway payloads. The provider spells the same value
//! several ways across endpoints and deployments; every fallback chain lives
//! here and nowhere else.

use super::{GatewayStatus, StatusReport};
use serde_json::Value;

const PAYMENT_URL_FIELDS: &[&str] = &["payment_url", "paymentUrl", "redirect_url", "redirectUrl", "url"];
const STATUS_FIELDS: &[&str] = &["Status", "status", "Response", "response"];
const TRANSACTION_ID_FIELDS: &[&str] = &["transaction_id", "TransactionId", "TxnId"];
const REFERENCE_NO_FIELDS: &[&str] = &["reference_no", "ReferenceNo"];

/// Text of a scalar that carries a value: non-empty strings, non-zero numbers, `true`.
fn scalar_text(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
    Value::Bool(true) => Some("true".to_string()),
    _ => None,
  }
}

/// First of `keys` on `value` that carries a value.
fn first_text(value: &Value, keys: &[&str]) -> Option<String> {
  keys.iter().find_map(|key| value.get(*key).and_then(scalar_text))
}

/// `(session_id, indicator_token)` from a create-session response.
pub fn created_session(raw: &Value) -> Option<(String, String)> {
  let inner = raw.get("gatewayResponse").unwrap_or(&Value::Null);
  let session_id = first_text(inner, &["session_id"]).or_else(|| first_text(raw, &["session_id", "sessionId"]))?;
  let indicator =
    first_text(inner, &["indicator_status"]).or_else(|| first_text(raw, &["indicator_status", "indicator"]))?;
  Some((session_id, indicator))
}

/// Payment URL from a session-update body, preferring the nested response object.
pub fn payment_url(raw: &Value) -> Option<String> {
  raw
    .get("gatewayResponse")
    .and_then(|inner| first_text(inner, PAYMENT_URL_FIELDS))
    .or_else(|| first_text(raw, PAYMENT_URL_FIELDS))
}

/// A 200 body whose numeric `status` is zero or negative is an error in
/// disguise. A present-but-null or empty status counts as zero.
pub fn embedded_error(raw: &Value) -> Option<String> {
  let status = raw.get("status")?;
  let is_error = match status {
    Value::Null | Value::Bool(false) => true,
    Value::Number(n) => n.as_f64().is_some_and(|v| v <= 0.0),
    Value::String(s) if s.trim().is_empty() => true,
    Value::String(s) => s.trim().parse::<f64>().is_ok_and(|v| v <= 0.0),
    _ => false,
  };
  if !is_error {
    return None;
  }
  Some(first_text(raw, &["message"]).unwrap_or_else(|| raw.to_string()))
}

pub fn status_report(raw: Value) -> StatusReport {
  let status_text = first_text(&raw, STATUS_FIELDS).unwrap_or_default().to_lowercase();
  StatusReport {
    status: GatewayStatus::classify(&status_text),
    transaction_id: first_text(&raw, TRANSACTION_ID_FIELDS),
    reference_no: first_text(&raw, REFERENCE_NO_FIELDS),
    status_text,
    raw,
  }
}
