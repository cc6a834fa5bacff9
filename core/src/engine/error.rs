// payrecon/src/engine/error.rs

use crate::flow::FlowError;
use crate::gateway::{GatewayError, GatewayOperation};
use crate::store::StoreError;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// How a failure should be presented to whoever asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// Caller input or order state rules the request out. Nothing was written.
  Validation,
  NotFound,
  /// The gateway could not be reached or understood. The order is untouched and a retry is safe.
  GatewayUnreachable,
  Internal,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
  #[error("Order not found: {0}")]
  OrderNotFound(Uuid),

  #[error("Order already paid")]
  AlreadyPaid,

  #[error("Order total must be positive")]
  InvalidAmount,

  #[error("Order total is below the minimum of {minimum}")]
  AmountBelowMinimum { minimum: Decimal },

  #[error("No gateway session is available for this order")]
  NoSession,

  #[error("Gateway call '{}' failed: {source}", operation.failure_code())]
  Gateway {
    operation: GatewayOperation,
    #[source]
    source: GatewayError,
  },

  #[error("Store error: {0}")]
  Store(#[from] StoreError),

  #[error("Flow error: {0}")]
  Flow(#[from] FlowError),
}

impl ReconcileError {
  pub(crate) fn gateway(operation: GatewayOperation) -> impl FnOnce(GatewayError) -> Self {
    move |source| ReconcileError::Gateway { operation, source }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      ReconcileError::AlreadyPaid
      | ReconcileError::InvalidAmount
      | ReconcileError::AmountBelowMinimum { .. }
      | ReconcileError::NoSession => ErrorKind::Validation,
      ReconcileError::OrderNotFound(_) => ErrorKind::NotFound,
      ReconcileError::Gateway { .. } => ErrorKind::GatewayUnreachable,
      ReconcileError::Store(_) | ReconcileError::Flow(_) => ErrorKind::Internal,
    }
  }

  /// Stable machine-readable code for response bodies.
  pub fn code(&self) -> &'static str {
    match self {
      ReconcileError::OrderNotFound(_) => "order_not_found",
      ReconcileError::AlreadyPaid => "already_paid",
      ReconcileError::InvalidAmount => "invalid_amount",
      ReconcileError::AmountBelowMinimum { .. } => "amount_below_minimum",
      ReconcileError::NoSession => "no_session_id_for_order",
      ReconcileError::Gateway { operation, .. } => operation.failure_code(),
      ReconcileError::Store(_) | ReconcileError::Flow(_) => "internal_error",
    }
  }
}
