// payrecon_server/src/web/handlers/payment_handlers.rs

use actix_web::http::header;
use actix_web::{web, HttpResponse};
use payrecon::{ConfirmRequest, Confirmation, ExpireTarget, Lang};
use serde_json::json;
use tracing::{info, instrument};

use crate::errors::Result;
use crate::state::AppState;
use crate::web::params::{
  self, flag, non_empty, pick, ConfirmParams, CreateSessionParams, ExpireParams, UpdateSessionParams, VerifyParams,
};

#[instrument(name = "handler::create_session", skip_all)]
pub async fn create_session_handler(
  app_state: web::Data<AppState>,
  query: web::Query<CreateSessionParams>,
  body: Option<web::Json<CreateSessionParams>>,
) -> Result<HttpResponse> {
  let req = pick(query, body);
  let order_id = params::order_id(req.order_id)?;
  let handle = app_state.reconciler.create_session(order_id, flag(&req.force)).await?;
  Ok(HttpResponse::Ok().json(handle))
}

/// Browser entry point: sends the customer straight to the payment page.
#[instrument(name = "handler::update_session_redirect", skip_all)]
pub async fn update_session_redirect_handler(
  app_state: web::Data<AppState>,
  query: web::Query<UpdateSessionParams>,
) -> Result<HttpResponse> {
  let req = query.into_inner();
  let order_id = params::order_id(req.order_id)?;
  let lang = Lang::parse(req.lang.as_deref().unwrap_or_default());
  let redirect = app_state
    .reconciler
    .update_session(order_id, non_empty(req.session_id), lang)
    .await?;

  info!(%order_id, source = ?redirect.source, "Redirecting customer to payment page.");
  Ok(
    HttpResponse::SeeOther()
      .insert_header((header::LOCATION, redirect.url))
      .finish(),
  )
}

#[instrument(name = "handler::update_session", skip_all)]
pub async fn update_session_json_handler(
  app_state: web::Data<AppState>,
  query: web::Query<UpdateSessionParams>,
  body: Option<web::Json<UpdateSessionParams>>,
) -> Result<HttpResponse> {
  let req = pick(query, body);
  let order_id = params::order_id(req.order_id)?;
  let lang = Lang::parse(req.lang.as_deref().unwrap_or_default());
  let redirect = app_state
    .reconciler
    .update_session(order_id, non_empty(req.session_id), lang)
    .await?;

  let body = if redirect.from_gateway() {
    json!({
      "paymentUrl": redirect.url,
      "redirectUrl": redirect.url,
      "payload": redirect.payload,
    })
  } else {
    json!({
      "ok": true,
      "redirectUrl": redirect.url,
      "payload": redirect.payload,
      "fallback": redirect.source,
    })
  };
  Ok(HttpResponse::Ok().json(body))
}

fn confirmation_body(confirmation: Confirmation) -> serde_json::Value {
  let mut body = json!({
    "status": confirmation.status,
    "gateway": confirmation.gateway,
  });
  if confirmation.indicator_mismatch {
    body["indicator_mismatch"] = json!(true);
  }
  body
}

async fn confirm(app_state: &AppState, req: ConfirmParams) -> Result<HttpResponse> {
  let order_id = params::order_id(req.order_id)?;
  let request = ConfirmRequest {
    session_id: non_empty(req.session_id),
    indicator: non_empty(req.indicator_status),
    message: non_empty(req.message),
    message_type: non_empty(req.message_type),
    force_recheck: flag(&req.force),
    fail_if_pending: flag(&req.fail_if_pending),
    wait_seconds: req.wait.as_ref().and_then(|w| w.as_i64()).and_then(|w| u64::try_from(w).ok()),
  };
  let confirmation = app_state.reconciler.confirm(order_id, request).await?;
  Ok(HttpResponse::Ok().json(confirmation_body(confirmation)))
}

#[instrument(name = "handler::confirm", skip_all)]
pub async fn confirm_get_handler(
  app_state: web::Data<AppState>,
  query: web::Query<ConfirmParams>,
) -> Result<HttpResponse> {
  confirm(&app_state, query.into_inner()).await
}

#[instrument(name = "handler::confirm", skip_all)]
pub async fn confirm_post_handler(
  app_state: web::Data<AppState>,
  query: web::Query<ConfirmParams>,
  body: Option<web::Json<ConfirmParams>>,
) -> Result<HttpResponse> {
  confirm(&app_state, pick(query, body)).await
}

#[instrument(name = "handler::verify", skip_all)]
pub async fn verify_handler(
  app_state: web::Data<AppState>,
  query: web::Query<VerifyParams>,
  body: Option<web::Json<VerifyParams>>,
) -> Result<HttpResponse> {
  let req = pick(query, body);
  let order_id = params::order_id(req.order_id)?;
  let confirmation = app_state
    .reconciler
    .verify(order_id, non_empty(req.session_id))
    .await?;
  Ok(HttpResponse::Ok().json(json!({
    "status": confirmation.status,
    "gateway": confirmation.gateway,
  })))
}

#[instrument(name = "handler::expire_pendings", skip_all)]
pub async fn expire_pendings_handler(
  app_state: web::Data<AppState>,
  query: web::Query<ExpireParams>,
  body: Option<web::Json<ExpireParams>>,
) -> Result<HttpResponse> {
  let req = pick(query, body);
  let minutes = req.minutes.as_ref().and_then(|m| m.as_i64());
  let target = ExpireTarget::parse(req.status.as_deref());
  let report = app_state.reconciler.expire_stale_pending(minutes, target).await?;
  Ok(HttpResponse::Ok().json(json!({
    "ok": true,
    "updated": report.updated,
    "status": report.status,
    "cutoff": report.cutoff,
  })))
}
