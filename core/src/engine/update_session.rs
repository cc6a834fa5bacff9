// payrecon/src/engine/update_session.rs

use super::create_session::check_amount;
use super::{fallback_order_reference, fetch_order, missing, ReconcileError, Reconciler, Services};
use crate::config::RedirectFallback;
use crate::flow::{ContextData, Flow, StepControl};
use crate::gateway::{GatewayOperation, Lang, SessionUpdate, SessionUpdateRequest};
use crate::models::{Order, PaymentEventKind, PaymentPatch, PaymentStatus};
use crate::money::round_to_currency;
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Where the payment URL came from, most trustworthy first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectSource {
  GatewayRedirect,
  GatewayPayload,
  Template,
  StaticPage,
  DefaultPattern,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRedirect {
  pub url: String,
  pub source: RedirectSource,
  /// What the gateway actually said, as stored on the order.
  pub payload: Value,
}

impl PaymentRedirect {
  pub fn from_gateway(&self) -> bool {
    matches!(self.source, RedirectSource::GatewayRedirect | RedirectSource::GatewayPayload)
  }
}

pub(crate) struct UpdateSessionCtx {
  services: Arc<Services>,
  order_id: Uuid,
  session_hint: Option<String>,
  lang: Lang,
  order: Option<Order>,
  session_id: Option<String>,
  order_reference: Option<i64>,
  update: Option<SessionUpdate>,
  redirect: Option<PaymentRedirect>,
}

pub(crate) fn build_flow() -> Flow<UpdateSessionCtx, ReconcileError> {
  let mut flow = Flow::new(
    "update_session",
    &[
      ("load_order", false, None),
      ("resolve_session", false, None),
      ("validate_amount", false, None),
      ("call_gateway", false, None),
      ("persist_gateway_raw", false, None),
      ("record_payment_update", true, None),
      ("resolve_redirect", false, None),
    ],
  );
  flow.on_step("load_order", load_order);
  flow.on_step("resolve_session", resolve_session);
  flow.on_step("validate_amount", validate_amount);
  flow.on_step("call_gateway", call_gateway);
  flow.on_step("persist_gateway_raw", persist_gateway_raw);
  flow.on_step("record_payment_update", record_payment_update);
  flow.on_step("resolve_redirect", resolve_redirect);
  flow
}

async fn load_order(ctx: ContextData<UpdateSessionCtx>) -> Result<StepControl, ReconcileError> {
  let (services, order_id) = {
    let guard = ctx.read();
    (guard.services.clone(), guard.order_id)
  };
  let order = fetch_order(&services, order_id).await?;
  ctx.write().order = Some(order);
  Ok(StepControl::Continue)
}

async fn resolve_session(ctx: ContextData<UpdateSessionCtx>) -> Result<StepControl, ReconcileError> {
  let mut guard = ctx.write();
  let stored = guard.order.as_ref().and_then(|o| o.session_id.clone());
  let session_id = guard
    .session_hint
    .clone()
    .or(stored)
    .filter(|s| !s.is_empty())
    .ok_or(ReconcileError::NoSession)?;
  guard.session_id = Some(session_id);
  Ok(StepControl::Continue)
}

async fn validate_amount(ctx: ContextData<UpdateSessionCtx>) -> Result<StepControl, ReconcileError> {
  let guard = ctx.read();
  let order = guard.order.as_ref().ok_or_else(|| missing("validate_amount", "order"))?;
  check_amount(order.total, guard.services.config.min_order_amount)?;
  Ok(StepControl::Continue)
}

async fn call_gateway(ctx: ContextData<UpdateSessionCtx>) -> Result<StepControl, ReconcileError> {
  let (services, request) = {
    let guard = ctx.read();
    let order = guard.order.as_ref().ok_or_else(|| missing("call_gateway", "order"))?;
    let session_id = guard.session_id.clone().ok_or_else(|| missing("call_gateway", "session id"))?;
    let request = SessionUpdateRequest {
      session_id,
      order_reference: order.order_number.unwrap_or_else(fallback_order_reference),
      amount: order.total,
      return_url: guard.services.config.return_url(order.id, Some(guard.lang.as_str())),
      customer: order.customer.clone(),
      lang: guard.lang,
    };
    (guard.services.clone(), request)
  };

  let update = services
    .gateway
    .update_session(&request)
    .await
    .map_err(ReconcileError::gateway(GatewayOperation::UpdateSession))?;

  let mut guard = ctx.write();
  guard.order_reference = Some(request.order_reference);
  guard.update = Some(update);
  Ok(StepControl::Continue)
}

async fn persist_gateway_raw(ctx: ContextData<UpdateSessionCtx>) -> Result<StepControl, ReconcileError> {
  let (services, order_id, raw) = {
    let guard = ctx.read();
    let update = guard.update.as_ref().ok_or_else(|| missing("persist_gateway_raw", "gateway answer"))?;
    (guard.services.clone(), guard.order_id, update.raw())
  };
  services.ledger.set_order_gateway_raw(order_id, raw).await;
  Ok(StepControl::Continue)
}

async fn record_payment_update(ctx: ContextData<UpdateSessionCtx>) -> Result<StepControl, ReconcileError> {
  let (services, order_id, session_id, kind, raw) = {
    let guard = ctx.read();
    let update = guard
      .update
      .as_ref()
      .ok_or_else(|| missing("record_payment_update", "gateway answer"))?;
    let kind = match update {
      SessionUpdate::Redirect { .. } => PaymentEventKind::Redirected,
      SessionUpdate::Payload { .. } => PaymentEventKind::SessionUpdated,
    };
    (guard.services.clone(), guard.order_id, guard.session_id.clone(), kind, update.raw())
  };

  let patch = PaymentPatch {
    status: Some(PaymentStatus::Redirected),
    gateway_raw: Some(raw.clone()),
    ..Default::default()
  };
  services
    .ledger
    .upsert_payment_by_session_or_order(session_id.as_deref(), order_id, patch, Some((kind, raw)))
    .await;
  Ok(StepControl::Continue)
}

async fn resolve_redirect(ctx: ContextData<UpdateSessionCtx>) -> Result<StepControl, ReconcileError> {
  let mut guard = ctx.write();
  let update = guard.update.as_ref().ok_or_else(|| missing("resolve_redirect", "gateway answer"))?;
  let payload = update.raw();

  let redirect = match update {
    SessionUpdate::Redirect { location, .. } => PaymentRedirect {
      url: location.clone(),
      source: RedirectSource::GatewayRedirect,
      payload,
    },
    SessionUpdate::Payload {
      payment_url: Some(url), ..
    } => PaymentRedirect {
      url: url.clone(),
      source: RedirectSource::GatewayPayload,
      payload,
    },
    SessionUpdate::Payload { payment_url: None, .. } => {
      let order = guard.order.as_ref().ok_or_else(|| missing("resolve_redirect", "order"))?;
      let session_id = guard.session_id.as_deref().ok_or_else(|| missing("resolve_redirect", "session id"))?;
      let (url, source) = fallback_redirect(
        &guard.services.config.redirect_fallback,
        order,
        session_id,
        guard.order_reference,
        guard.lang,
      );
      warn!(order_id = %order.id, ?source, "Gateway answer carried no payment URL; using fallback.");
      PaymentRedirect { url, source, payload }
    }
  };
  guard.redirect = Some(redirect);
  Ok(StepControl::Continue)
}

/// Builds a payment URL when the gateway did not give us one.
pub(crate) fn fallback_redirect(
  fallback: &RedirectFallback,
  order: &Order,
  session_id: &str,
  order_reference: Option<i64>,
  lang: Lang,
) -> (String, RedirectSource) {
  if let Some(template) = fallback.template.as_deref().filter(|t| !t.trim().is_empty()) {
    let url = template
      .replace("{session_id}", session_id)
      .replace("{developer_user}", &fallback.developer_user);
    return (url, RedirectSource::Template);
  }

  if let Some(base) = fallback.static_pay_url.as_deref().filter(|u| !u.trim().is_empty()) {
    match Url::parse(base.trim()) {
      Ok(mut url) => {
        let c = &order.customer;
        let amount = round_to_currency(order.total).normalize().to_string();
        let reference = order_reference.map(|r| r.to_string()).unwrap_or_default();
        url
          .query_pairs_mut()
          .append_pair("full_name", &c.name)
          .append_pair("name", &c.name)
          .append_pair("customer_name", &c.name)
          .append_pair("phone", &c.phone)
          .append_pair("customer_phone", &c.phone)
          .append_pair("email", &c.email)
          .append_pair("customer_email", &c.email)
          .append_pair("address", &c.address)
          .append_pair("customer_address", &c.address)
          .append_pair("amount", &amount)
          .append_pair("order_amount", &amount)
          .append_pair("lang", lang.as_str())
          .append_pair("order_id", &reference);
        return (url.to_string(), RedirectSource::StaticPage);
      }
      Err(e) => warn!(error = %e, "Static payment page URL is not valid; skipping it."),
    }
  }

  let base = fallback.gateway_base_url.trim_end_matches('/');
  (format!("{base}/payment/{session_id}"), RedirectSource::DefaultPattern)
}

impl Reconciler {
  /// Pushes the current amount, customer details and language to the order's
  /// gateway session and works out where to send the customer.
  #[instrument(name = "Reconciler::update_session", skip(self, session_id), fields(%order_id, lang = lang.as_str()))]
  pub async fn update_session(
    &self,
    order_id: Uuid,
    session_id: Option<String>,
    lang: Lang,
  ) -> Result<PaymentRedirect, ReconcileError> {
    let ctx = ContextData::new(UpdateSessionCtx {
      services: self.services.clone(),
      order_id,
      session_hint: session_id,
      lang,
      order: None,
      session_id: None,
      order_reference: None,
      update: None,
      redirect: None,
    });

    self.update_flow.run(ctx.clone()).await?;
    let redirect = ctx.write().redirect.take();
    let redirect = redirect.ok_or_else(|| missing("update_session", "redirect"))?;
    info!(source = ?redirect.source, "Payment redirect resolved.");
    Ok(redirect)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;
  use rust_decimal::Decimal;
  use std::str::FromStr;

  fn order() -> Order {
    let mut order = Order::pending(Decimal::from_str("12.5").unwrap(), Utc::now());
    order.customer.name = "Sara Q".into();
    order.customer.phone = "+96550000000".into();
    order
  }

  fn fallback() -> RedirectFallback {
    RedirectFallback {
      template: None,
      static_pay_url: None,
      gateway_base_url: "https://gw.example/".into(),
      developer_user: "dev1".into(),
    }
  }

  #[test]
  fn template_wins_over_other_fallbacks() {
    let mut cfg = fallback();
    cfg.template = Some("https://pay.example/{developer_user}/{session_id}".into());
    cfg.static_pay_url = Some("https://static.example/pay".into());
    let (url, source) = fallback_redirect(&cfg, &order(), "S1", Some(42), Lang::En);
    assert_eq!(url, "https://pay.example/dev1/S1");
    assert_eq!(source, RedirectSource::Template);
  }

  #[test]
  fn static_page_is_prefilled() {
    let mut cfg = fallback();
    cfg.static_pay_url = Some("https://static.example/pay".into());
    let (url, source) = fallback_redirect(&cfg, &order(), "S1", Some(42), Lang::Ar);
    assert_eq!(source, RedirectSource::StaticPage);
    let parsed = Url::parse(&url).unwrap();
    let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    assert!(pairs.contains(&("customer_name".into(), "Sara Q".into())));
    assert!(pairs.contains(&("amount".into(), "12.5".into())));
    assert!(pairs.contains(&("lang".into(), "ar".into())));
    assert!(pairs.contains(&("order_id".into(), "42".into())));
  }

  #[test]
  fn default_pattern_is_last_resort() {
    let mut cfg = fallback();
    cfg.static_pay_url = Some("not a url".into());
    let (url, source) = fallback_redirect(&cfg, &order(), "S1", None, Lang::En);
    assert_eq!(url, "https://gw.example/payment/S1");
    assert_eq!(source, RedirectSource::DefaultPattern);
  }
}
