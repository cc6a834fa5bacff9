// payrecon/src/engine/confirm.rs

use super::{fetch_order, missing, ReconcileError, Reconciler, Services};
use crate::coupon_counter::CouponOutcome;
use crate::flow::{ContextData, Flow, SkipCondition, StepControl};
use crate::gateway::{GatewayOperation, GatewayStatus, StatusReport};
use crate::models::{Order, OrderPatch, OrderStatus, PaymentEventKind, PaymentPatch, PaymentStatus};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Caller hints for a confirmation. Everything is optional.
#[derive(Debug, Clone, Default)]
pub struct ConfirmRequest {
  /// Overrides the session stored on the order.
  pub session_id: Option<String>,
  /// Indicator token echoed back on the return URL.
  pub indicator: Option<String>,
  /// Human-readable status token from the return URL. Skips the status query.
  pub message: Option<String>,
  pub message_type: Option<String>,
  /// Re-check even a paid order, and poll while the gateway says pending.
  pub force_recheck: bool,
  /// Treat a pending answer as a failure.
  pub fail_if_pending: bool,
  pub wait_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmVia {
  /// The order was already paid; nothing was asked of the gateway.
  AlreadyPaid,
  ReturnMessage,
  StatusQuery,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Confirmation {
  pub status: OrderStatus,
  pub gateway: Option<Value>,
  pub indicator_mismatch: bool,
  pub via: ConfirmVia,
  pub coupon: Option<CouponOutcome>,
}

pub(crate) struct ConfirmCtx {
  services: Arc<Services>,
  order_id: Uuid,
  request: ConfirmRequest,
  bypass_fast_path: bool,
  order: Option<Order>,
  session_id: Option<String>,
  indicator_mismatch: bool,
  via: Option<ConfirmVia>,
  /// `None` when the answer was ambiguous.
  proposed: Option<OrderStatus>,
  payment_status: Option<PaymentStatus>,
  gateway_payload: Option<Value>,
  report: Option<StatusReport>,
  next_status: Option<OrderStatus>,
  coupon: Option<CouponOutcome>,
}

impl ConfirmCtx {
  fn has_message(&self) -> bool {
    self.request.message.as_deref().is_some_and(|m| !m.trim().is_empty())
  }
}

fn skip_when(predicate: fn(&ConfirmCtx) -> bool) -> Option<SkipCondition<ConfirmCtx>> {
  Some(Arc::new(move |ctx: ContextData<ConfirmCtx>| predicate(&ctx.read())))
}

pub(crate) fn build_flow() -> Flow<ConfirmCtx, ReconcileError> {
  let mut flow = Flow::new(
    "confirm",
    &[
      ("load_order", false, None),
      (
        "paid_fast_path",
        false,
        skip_when(|c| c.bypass_fast_path || c.request.force_recheck),
      ),
      ("resolve_session", false, None),
      ("apply_return_message", false, skip_when(|c| !c.has_message())),
      ("query_gateway", false, skip_when(|c| c.has_message())),
      ("decide_transition", false, None),
      ("write_order_status", false, None),
      ("sync_payment_row", true, None),
      (
        "count_coupon_usage",
        true,
        skip_when(|c| !c.next_status.as_ref().is_some_and(OrderStatus::is_paid)),
      ),
    ],
  );
  flow.on_step("load_order", load_order);
  flow.on_step("paid_fast_path", paid_fast_path);
  flow.on_step("resolve_session", resolve_session);
  flow.on_step("apply_return_message", apply_return_message);
  flow.on_step("query_gateway", query_gateway);
  flow.on_step("decide_transition", decide_transition);
  flow.on_step("write_order_status", write_order_status);
  flow.on_step("sync_payment_row", sync_payment_row);
  flow.on_step("count_coupon_usage", count_coupon_usage);
  flow
}

async fn load_order(ctx: ContextData<ConfirmCtx>) -> Result<StepControl, ReconcileError> {
  let (services, order_id) = {
    let guard = ctx.read();
    (guard.services.clone(), guard.order_id)
  };
  let order = fetch_order(&services, order_id).await?;
  ctx.write().order = Some(order);
  Ok(StepControl::Continue)
}

async fn paid_fast_path(ctx: ContextData<ConfirmCtx>) -> Result<StepControl, ReconcileError> {
  let (services, order_id, needs_backfill) = {
    let guard = ctx.read();
    let order = guard.order.as_ref().ok_or_else(|| missing("paid_fast_path", "order"))?;
    if !order.status.is_paid() {
      return Ok(StepControl::Continue);
    }
    (guard.services.clone(), order.id, order.paid_at.is_none())
  };

  if needs_backfill {
    debug!(%order_id, "Paid order has no paid_at; backfilling.");
    services.ledger.mark_order_paid(order_id, true).await;
  }

  let mut guard = ctx.write();
  guard.via = Some(ConfirmVia::AlreadyPaid);
  guard.next_status = Some(OrderStatus::Paid);
  Ok(StepControl::Stop)
}

async fn resolve_session(ctx: ContextData<ConfirmCtx>) -> Result<StepControl, ReconcileError> {
  let mut guard = ctx.write();
  let order = guard.order.as_ref().ok_or_else(|| missing("resolve_session", "order"))?;

  let session_id = guard
    .request
    .session_id
    .clone()
    .or_else(|| order.session_id.clone())
    .filter(|s| !s.is_empty())
    .ok_or(ReconcileError::NoSession)?;

  let stored = order.payment_ref.as_deref().filter(|s| !s.is_empty());
  let echoed = guard.request.indicator.as_deref().filter(|s| !s.is_empty());
  let mismatch = matches!((stored, echoed), (Some(a), Some(b)) if a != b);
  if mismatch {
    warn!(order_id = %order.id, "Indicator token does not match the one issued; relying on the gateway.");
  }

  guard.session_id = Some(session_id);
  guard.indicator_mismatch = mismatch;
  Ok(StepControl::Continue)
}

async fn apply_return_message(ctx: ContextData<ConfirmCtx>) -> Result<StepControl, ReconcileError> {
  let mut guard = ctx.write();
  let message = guard.request.message.clone().unwrap_or_default().trim().to_ascii_lowercase();
  let proposed = OrderStatus::from_return_message(&message);

  guard.payment_status = match proposed {
    OrderStatus::Paid => Some(PaymentStatus::Captured),
    OrderStatus::Failed => Some(PaymentStatus::Failed),
    _ => None,
  };
  guard.gateway_payload = Some(json!({
    "via": "return_message",
    "message": message,
    "message_type": guard.request.message_type,
  }));
  guard.proposed = Some(proposed);
  guard.via = Some(ConfirmVia::ReturnMessage);
  Ok(StepControl::Continue)
}

async fn query_gateway(ctx: ContextData<ConfirmCtx>) -> Result<StepControl, ReconcileError> {
  let (services, session_id, order_reference, window) = {
    let guard = ctx.read();
    let order = guard.order.as_ref().ok_or_else(|| missing("query_gateway", "order"))?;
    let session_id = guard.session_id.clone().ok_or_else(|| missing("query_gateway", "session id"))?;
    let window = guard
      .services
      .config
      .polling_window(guard.request.wait_seconds, guard.request.force_recheck);
    (guard.services.clone(), session_id, order.order_number, window)
  };

  let started = Instant::now();
  let mut attempts = 1u32;
  let mut report = services
    .gateway
    .query_status(&session_id, order_reference)
    .await
    .map_err(ReconcileError::gateway(GatewayOperation::PaymentStatus))?;

  while !report.status.is_definitive() && started.elapsed() < window {
    sleep(services.config.poll_interval).await;
    attempts += 1;
    report = services
      .gateway
      .query_status(&session_id, order_reference)
      .await
      .map_err(ReconcileError::gateway(GatewayOperation::PaymentStatus))?;
  }
  debug!(attempts, status = ?report.status, raw_status = %report.status_text, "Gateway status settled.");

  let mut guard = ctx.write();
  let (proposed, payment_status) = match report.status {
    GatewayStatus::Success => (Some(OrderStatus::Paid), Some(PaymentStatus::Captured)),
    GatewayStatus::Failed => (Some(OrderStatus::Failed), Some(PaymentStatus::Failed)),
    GatewayStatus::Pending => (None, None),
  };
  guard.proposed = proposed;
  guard.payment_status = payment_status;
  guard.gateway_payload = Some(report.raw.clone());
  guard.report = Some(report);
  guard.via = Some(ConfirmVia::StatusQuery);
  Ok(StepControl::Continue)
}

/// Ambiguous answers keep the current status unless the caller asked to fail
/// them. A paid order only leaves `paid` on a forced recheck.
pub(crate) fn next_status(
  current: &OrderStatus,
  proposed: Option<OrderStatus>,
  fail_if_pending: bool,
  force_recheck: bool,
) -> OrderStatus {
  let next = match proposed {
    Some(status) => status,
    None if fail_if_pending => OrderStatus::Failed,
    None => current.clone(),
  };
  if current.is_paid() && !next.is_paid() && !force_recheck {
    return OrderStatus::Paid;
  }
  next
}

async fn decide_transition(ctx: ContextData<ConfirmCtx>) -> Result<StepControl, ReconcileError> {
  let mut guard = ctx.write();
  let current = guard
    .order
    .as_ref()
    .map(|o| o.status.clone())
    .ok_or_else(|| missing("decide_transition", "order"))?;
  let proposed = guard.proposed.clone();
  let next = next_status(
    &current,
    proposed.clone(),
    guard.request.fail_if_pending,
    guard.request.force_recheck,
  );

  if current.is_paid() && proposed.as_ref().is_some_and(|p| !p.is_paid()) && next.is_paid() {
    warn!(order_id = %guard.order_id, "Refusing to move a paid order without a forced recheck.");
    guard.payment_status = None;
  }
  guard.next_status = Some(next);
  Ok(StepControl::Continue)
}

/// The write is guarded on the status read by `load_order`. When another
/// confirmation got there first, its result stands and this run reports the
/// stored status without touching the payment row or the coupon.
async fn write_order_status(ctx: ContextData<ConfirmCtx>) -> Result<StepControl, ReconcileError> {
  let (services, order_id, expected, patch, next) = {
    let guard = ctx.read();
    let order = guard.order.as_ref().ok_or_else(|| missing("write_order_status", "order"))?;
    let next = guard
      .next_status
      .clone()
      .ok_or_else(|| missing("write_order_status", "next status"))?;

    let paid_at = match (next.is_paid(), order.paid_at) {
      (true, None) => Some(Some(Utc::now())),
      (false, Some(_)) if order.status.is_paid() => Some(None),
      _ => None,
    };
    let session_id = guard
      .session_id
      .clone()
      .filter(|s| next.is_paid() && order.session_id.as_deref() != Some(s.as_str()));

    let patch = OrderPatch {
      status: Some(next.clone()),
      paid_at,
      session_id,
      gateway_raw: guard.gateway_payload.clone(),
      ..Default::default()
    };
    (guard.services.clone(), guard.order_id, order.status.clone(), patch, next)
  };

  if !services.store.update_order_if_status(order_id, &expected, &patch).await? {
    let stored = fetch_order(&services, order_id).await?;
    warn!(
      %order_id,
      expected = %expected,
      stored = %stored.status,
      "Order status changed while confirming; keeping the stored status."
    );
    let mut guard = ctx.write();
    guard.next_status = Some(stored.status);
    guard.payment_status = None;
    return Ok(StepControl::Stop);
  }
  info!(%order_id, status = %next, "Order status written.");
  Ok(StepControl::Continue)
}

async fn sync_payment_row(ctx: ContextData<ConfirmCtx>) -> Result<StepControl, ReconcileError> {
  let (services, order_id, session_id, patch, payload) = {
    let guard = ctx.read();
    let payload = guard.gateway_payload.clone().unwrap_or(Value::Null);
    let report = guard.report.as_ref();
    let patch = PaymentPatch {
      status: guard.payment_status,
      gateway_raw: Some(payload.clone()),
      gateway_transaction_id: report.and_then(|r| r.transaction_id.clone()),
      reference_no: report.and_then(|r| r.reference_no.clone()),
    };
    (guard.services.clone(), guard.order_id, guard.session_id.clone(), patch, payload)
  };

  services
    .ledger
    .upsert_payment_by_session_or_order(
      session_id.as_deref(),
      order_id,
      patch,
      Some((PaymentEventKind::StatusChecked, payload)),
    )
    .await;
  Ok(StepControl::Continue)
}

async fn count_coupon_usage(ctx: ContextData<ConfirmCtx>) -> Result<StepControl, ReconcileError> {
  let (services, order_id) = {
    let guard = ctx.read();
    (guard.services.clone(), guard.order_id)
  };
  let outcome = services.coupons.apply_usage(order_id).await?;
  ctx.write().coupon = Some(outcome);
  Ok(StepControl::Continue)
}

impl Reconciler {
  /// Settles an order against the gateway after the customer returns.
  ///
  /// A gateway failure is returned as an error and leaves the order untouched.
  #[instrument(name = "Reconciler::confirm", skip(self, request), fields(%order_id, force = request.force_recheck))]
  pub async fn confirm(&self, order_id: Uuid, request: ConfirmRequest) -> Result<Confirmation, ReconcileError> {
    self.run_confirm(order_id, request, false).await
  }

  /// One status query, no polling and no paid fast path. Never regresses a paid order.
  #[instrument(name = "Reconciler::verify", skip(self, session_id), fields(%order_id))]
  pub async fn verify(&self, order_id: Uuid, session_id: Option<String>) -> Result<Confirmation, ReconcileError> {
    let request = ConfirmRequest {
      session_id,
      ..Default::default()
    };
    self.run_confirm(order_id, request, true).await
  }

  async fn run_confirm(
    &self,
    order_id: Uuid,
    request: ConfirmRequest,
    bypass_fast_path: bool,
  ) -> Result<Confirmation, ReconcileError> {
    let ctx = ContextData::new(ConfirmCtx {
      services: self.services.clone(),
      order_id,
      request,
      bypass_fast_path,
      order: None,
      session_id: None,
      indicator_mismatch: false,
      via: None,
      proposed: None,
      payment_status: None,
      gateway_payload: None,
      report: None,
      next_status: None,
      coupon: None,
    });

    self.confirm_flow.run(ctx.clone()).await?;

    let mut guard = ctx.write();
    let status = guard.next_status.take().ok_or_else(|| missing("confirm", "next status"))?;
    let via = guard.via.ok_or_else(|| missing("confirm", "confirmation path"))?;
    Ok(Confirmation {
      status,
      gateway: guard.gateway_payload.take(),
      indicator_mismatch: guard.indicator_mismatch,
      via,
      coupon: guard.coupon.take(),
    })
  }
}
