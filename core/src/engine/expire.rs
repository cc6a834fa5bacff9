// payrecon/src/engine/expire.rs

use super::{ReconcileError, Reconciler};
use crate::models::{OrderStatus, PaymentStatus};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

/// What stale pending orders become.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpireTarget {
  #[default]
  Failed,
  Cancelled,
}

impl ExpireTarget {
  /// Only an explicit `cancelled` cancels; anything else fails the orders.
  pub fn parse(raw: Option<&str>) -> Self {
    match raw.map(|s| s.trim().to_ascii_lowercase()) {
      Some(s) if s == "cancelled" => ExpireTarget::Cancelled,
      _ => ExpireTarget::Failed,
    }
  }

  pub fn order_status(&self) -> OrderStatus {
    match self {
      ExpireTarget::Failed => OrderStatus::Failed,
      ExpireTarget::Cancelled => OrderStatus::Cancelled,
    }
  }

  /// Payment rows have no cancelled state; a cancelled order's attempt goes back to initiated.
  pub fn payment_status(&self) -> PaymentStatus {
    match self {
      ExpireTarget::Failed => PaymentStatus::Failed,
      ExpireTarget::Cancelled => PaymentStatus::Initiated,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpireReport {
  pub updated: usize,
  pub status: OrderStatus,
  pub cutoff: DateTime<Utc>,
  #[serde(skip)]
  pub order_ids: Vec<Uuid>,
  #[serde(skip)]
  pub payments_updated: u64,
}

impl Reconciler {
  /// Moves pending, unpaid orders older than the threshold to `target`.
  ///
  /// A missing or zero threshold uses the configured TTL; the result is never below one minute.
  #[instrument(name = "Reconciler::expire_stale_pending", skip(self))]
  pub async fn expire_stale_pending(
    &self,
    minutes: Option<i64>,
    target: ExpireTarget,
  ) -> Result<ExpireReport, ReconcileError> {
    let services = &self.services;
    let minutes = match minutes {
      Some(m) if m != 0 => m,
      _ => services.config.pending_ttl_minutes,
    }
    .max(1);
    let cutoff = Duration::try_minutes(minutes)
      .and_then(|age| Utc::now().checked_sub_signed(age))
      .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let status = target.order_status();

    let order_ids = services.store.expire_pending_orders(cutoff, &status).await?;
    let payments_updated = services
      .ledger
      .mirror_expired_orders(&order_ids, target.payment_status())
      .await;

    info!(updated = order_ids.len(), payments_updated, %cutoff, %status, "Expired stale pending orders.");
    Ok(ExpireReport {
      updated: order_ids.len(),
      status,
      cutoff,
      order_ids,
      payments_updated,
    })
  }
}
