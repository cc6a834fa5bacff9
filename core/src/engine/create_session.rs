// payrecon/src/engine/create_session.rs

use super::{fetch_order, missing, next_order_reference, ReconcileError, Reconciler, Services};
use crate::flow::{ContextData, Flow, FlowOutcome, StepControl};
use crate::gateway::{CreatedSession, GatewayOperation, Lang, SessionRequest};
use crate::models::{NewPayment, Order, OrderPatch, PaymentEventKind, PaymentStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// The session the storefront should hand to the gateway's payment page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
  pub session_id: String,
  /// Echoed back on the return URL; compared on confirm to flag tampering.
  pub indicator_token: Option<String>,
  pub reused: bool,
}

pub(crate) struct CreateSessionCtx {
  services: Arc<Services>,
  order_id: Uuid,
  force: bool,
  order: Option<Order>,
  order_reference: Option<i64>,
  created: Option<CreatedSession>,
  handle: Option<SessionHandle>,
}

pub(crate) fn build_flow() -> Flow<CreateSessionCtx, ReconcileError> {
  let mut flow = Flow::new(
    "create_session",
    &[
      ("load_order", false, None),
      ("check_eligibility", false, None),
      ("validate_amount", false, None),
      ("open_gateway_session", false, None),
      ("persist_session", false, None),
      ("record_payment_attempt", true, None),
    ],
  );
  flow.on_step("load_order", load_order);
  flow.on_step("check_eligibility", check_eligibility);
  flow.on_step("validate_amount", validate_amount);
  flow.on_step("open_gateway_session", open_gateway_session);
  flow.on_step("persist_session", persist_session);
  flow.on_step("record_payment_attempt", record_payment_attempt);
  flow
}

/// Enforces the positive total and the configured minimum.
pub(crate) fn check_amount(total: Decimal, minimum: Decimal) -> Result<(), ReconcileError> {
  if total <= Decimal::ZERO {
    return Err(ReconcileError::InvalidAmount);
  }
  if minimum > Decimal::ZERO && total < minimum {
    return Err(ReconcileError::AmountBelowMinimum { minimum });
  }
  Ok(())
}

async fn load_order(ctx: ContextData<CreateSessionCtx>) -> Result<StepControl, ReconcileError> {
  let (services, order_id) = {
    let guard = ctx.read();
    (guard.services.clone(), guard.order_id)
  };
  let order = fetch_order(&services, order_id).await?;
  ctx.write().order = Some(order);
  Ok(StepControl::Continue)
}

async fn check_eligibility(ctx: ContextData<CreateSessionCtx>) -> Result<StepControl, ReconcileError> {
  let mut guard = ctx.write();
  let force = guard.force;
  let order = guard.order.as_ref().ok_or_else(|| missing("check_eligibility", "order"))?;

  if order.status.is_paid() && !force {
    return Err(ReconcileError::AlreadyPaid);
  }

  // An open session is handed back as-is; the gateway has no cheap way to tell us it expired.
  if let Some(session_id) = order.session_id.clone().filter(|s| !s.is_empty()) {
    info!(order_id = %order.id, %session_id, "Reusing existing gateway session.");
    let indicator_token = order.payment_ref.clone();
    guard.handle = Some(SessionHandle {
      session_id,
      indicator_token,
      reused: true,
    });
    return Ok(StepControl::Stop);
  }
  Ok(StepControl::Continue)
}

async fn validate_amount(ctx: ContextData<CreateSessionCtx>) -> Result<StepControl, ReconcileError> {
  let guard = ctx.read();
  let order = guard.order.as_ref().ok_or_else(|| missing("validate_amount", "order"))?;
  check_amount(order.total, guard.services.config.min_order_amount)?;
  Ok(StepControl::Continue)
}

async fn open_gateway_session(ctx: ContextData<CreateSessionCtx>) -> Result<StepControl, ReconcileError> {
  let (services, request) = {
    let guard = ctx.read();
    let order = guard.order.as_ref().ok_or_else(|| missing("open_gateway_session", "order"))?;
    let request = SessionRequest {
      order_reference: next_order_reference(),
      amount: order.total,
      return_url: guard.services.config.return_url(order.id, None),
      customer: order.customer.clone(),
      lang: Lang::En,
    };
    (guard.services.clone(), request)
  };

  let created = services
    .gateway
    .create_session(&request)
    .await
    .map_err(ReconcileError::gateway(GatewayOperation::CreateSession))?;

  let mut guard = ctx.write();
  guard.order_reference = Some(request.order_reference);
  guard.created = Some(created);
  Ok(StepControl::Continue)
}

async fn persist_session(ctx: ContextData<CreateSessionCtx>) -> Result<StepControl, ReconcileError> {
  let (services, order_id, patch) = {
    let guard = ctx.read();
    let created = guard.created.as_ref().ok_or_else(|| missing("persist_session", "created session"))?;
    let patch = OrderPatch {
      session_id: Some(created.session_id.clone()),
      payment_ref: Some(created.indicator_token.clone()),
      order_number: guard.order_reference,
      ..Default::default()
    };
    (guard.services.clone(), guard.order_id, patch)
  };

  // Guarded so two concurrent creates cannot both attach a session.
  if !services.store.update_order_if_no_session(order_id, &patch).await? {
    let stored = fetch_order(&services, order_id).await?;
    let session_id = stored
      .session_id
      .filter(|s| !s.is_empty())
      .ok_or_else(|| missing("persist_session", "stored session"))?;
    warn!(%order_id, %session_id, "Another request attached a session first; returning it.");
    ctx.write().handle = Some(SessionHandle {
      session_id,
      indicator_token: stored.payment_ref,
      reused: true,
    });
    return Ok(StepControl::Stop);
  }

  let mut guard = ctx.write();
  let created = guard.created.as_ref().ok_or_else(|| missing("persist_session", "created session"))?;
  let handle = SessionHandle {
    session_id: created.session_id.clone(),
    indicator_token: Some(created.indicator_token.clone()),
    reused: false,
  };
  guard.handle = Some(handle);
  Ok(StepControl::Continue)
}

async fn record_payment_attempt(ctx: ContextData<CreateSessionCtx>) -> Result<StepControl, ReconcileError> {
  let (services, attempt, raw) = {
    let guard = ctx.read();
    let order = guard.order.as_ref().ok_or_else(|| missing("record_payment_attempt", "order"))?;
    let created = guard
      .created
      .as_ref()
      .ok_or_else(|| missing("record_payment_attempt", "created session"))?;
    let attempt = NewPayment {
      order_id: order.id,
      amount: order.total,
      currency: order.currency.clone(),
      session_id: Some(created.session_id.clone()),
      indicator_token: Some(created.indicator_token.clone()),
      status: PaymentStatus::Initiated,
      method: order.payment_method.for_attempt(),
      gateway_raw: Some(created.raw.clone()),
    };
    (guard.services.clone(), attempt, created.raw.clone())
  };

  let payment_id = services.ledger.create_payment_attempt(attempt).await;
  services
    .ledger
    .record_payment_event(payment_id, PaymentEventKind::SessionCreated, Some(raw))
    .await;
  Ok(StepControl::Continue)
}

impl Reconciler {
  /// Opens a gateway session for a pending order, or returns the one it already has.
  ///
  /// `force` only lifts the already-paid guard; an existing session is still reused.
  #[instrument(name = "Reconciler::create_session", skip(self), fields(%order_id))]
  pub async fn create_session(&self, order_id: Uuid, force: bool) -> Result<SessionHandle, ReconcileError> {
    let ctx = ContextData::new(CreateSessionCtx {
      services: self.services.clone(),
      order_id,
      force,
      order: None,
      order_reference: None,
      created: None,
      handle: None,
    });

    let outcome = self.create_flow.run(ctx.clone()).await?;
    let handle = ctx.write().handle.take();
    let handle = handle.ok_or_else(|| missing("create_session", "session handle"))?;
    if outcome == FlowOutcome::Completed {
      info!(session_id = %handle.session_id, "Gateway session created.");
    }
    Ok(handle)
  }
}
