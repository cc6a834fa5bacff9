// tests/coupon_api_tests.rs
#[macro_use]
mod common;

use actix_web::http::StatusCode;
use actix_web::test;
use common::*;
use serde_json::{json, Value};
use serial_test::serial;

#[actix_web::test]
#[serial]
async fn valid_coupon_with_subtotal() {
  setup_tracing();
  let ctx = TestContext::new().await;
  ctx.store.insert_coupon(coupon("EID10"));
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::get()
      .uri("/api/coupons/validate?code=eid10&subtotal=50")
      .to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["valid"], true);
  assert_eq!(body["code"], "EID10");
  assert_eq!(body["pctOff"], json!(10.0));
  assert_eq!(body["amountOff"], Value::Null);
  assert_eq!(body["discount"], json!(5.0));
}

#[actix_web::test]
#[serial]
async fn unknown_and_exhausted_coupons() {
  setup_tracing();
  let ctx = TestContext::new().await;
  let mut used_up = coupon("ONCE");
  used_up.usage_limit = Some(1);
  used_up.used_count = 1;
  ctx.store.insert_coupon(used_up);
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::get().uri("/api/coupons/validate?code=NOPE").to_request(),
  )
  .await;
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body, json!({ "valid": false, "reason": "not_found" }));

  let resp = test::call_service(
    &app,
    test::TestRequest::get().uri("/api/coupons/validate?code=ONCE").to_request(),
  )
  .await;
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body, json!({ "valid": false, "reason": "limit_reached" }));
}

#[actix_web::test]
#[serial]
async fn code_is_required() {
  setup_tracing();
  let ctx = TestContext::new().await;
  let app = init_app!(ctx);

  let resp = test::call_service(&app, test::TestRequest::get().uri("/api/coupons/validate").to_request()).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body, json!({ "error": "missing_parameter", "parameter": "code" }));
}
