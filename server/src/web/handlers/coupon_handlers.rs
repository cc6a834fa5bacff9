// payrecon_server/src/web/handlers/coupon_handlers.rs

use actix_web::{web, HttpResponse};
use payrecon::money::to_wire;
use payrecon::CouponCheck;
use serde_json::json;
use tracing::instrument;

use crate::errors::{ApiError, Result};
use crate::state::AppState;
use crate::web::params::{non_empty, CouponParams};

#[instrument(name = "handler::validate_coupon", skip_all)]
pub async fn validate_coupon_handler(
  app_state: web::Data<AppState>,
  query: web::Query<CouponParams>,
) -> Result<HttpResponse> {
  let req = query.into_inner();
  let code = non_empty(req.code).ok_or(ApiError::MissingParameter("code"))?;
  let subtotal = req.subtotal.as_ref().and_then(|s| s.as_amount());

  let body = match app_state.reconciler.validate_coupon(&code, subtotal).await? {
    CouponCheck::Valid { coupon, discount } => json!({
      "valid": true,
      "code": coupon.code,
      "pctOff": coupon.pct_off.map(to_wire),
      "amountOff": coupon.amount_off.map(to_wire),
      "discount": discount.map(to_wire),
    }),
    CouponCheck::Invalid { reason } => json!({
      "valid": false,
      "reason": reason.code(),
    }),
  };
  Ok(HttpResponse::Ok().json(body))
}
