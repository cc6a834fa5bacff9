// payrecon_server/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use payrecon::money::to_wire;
use payrecon::{ErrorKind, GatewayError, ReconcileError};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("Missing parameter: {0}")]
  MissingParameter(&'static str),

  #[error("Invalid parameter '{name}': {reason}")]
  InvalidParameter { name: &'static str, reason: String },

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error(transparent)]
  Reconcile(#[from] ReconcileError),
}

impl ApiError {
  fn gateway_body(code: &str, source: &GatewayError) -> Value {
    let mut body = json!({ "error": code, "detail": source.to_string() });
    if let Some(status) = source.http_status() {
      body["status"] = json!(status);
    }
    body
  }
}

impl ResponseError for ApiError {
  fn status_code(&self) -> StatusCode {
    match self {
      ApiError::MissingParameter(_) | ApiError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
      ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
      ApiError::Reconcile(err) => match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::GatewayUnreachable => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    let body = match self {
      ApiError::MissingParameter(name) => json!({ "error": "missing_parameter", "parameter": name }),
      ApiError::InvalidParameter { name, reason } => {
        json!({ "error": "invalid_parameter", "parameter": name, "detail": reason })
      }
      ApiError::Reconcile(ReconcileError::AmountBelowMinimum { minimum }) => {
        json!({ "error": "amount_below_minimum", "min": to_wire(*minimum) })
      }
      ApiError::Reconcile(err @ ReconcileError::Gateway { source, .. }) => {
        tracing::warn!(api_error = %self, "Gateway unreachable.");
        Self::gateway_body(err.code(), source)
      }
      ApiError::Reconcile(err) if status != StatusCode::INTERNAL_SERVER_ERROR => json!({ "error": err.code() }),
      _ => {
        // The cause stays in the log; the client only gets the id to quote.
        let error_id = Uuid::new_v4();
        tracing::error!(%error_id, api_error = ?self, "Responding with internal error");
        json!({ "error": "internal_error", "errorId": error_id })
      }
    };
    HttpResponse::build(status).json(body)
  }
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;
