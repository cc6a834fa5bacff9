// tests/payment_api_tests.rs
#[macro_use]
mod common;

use actix_web::http::{header, StatusCode};
use actix_web::test;
use common::*;
use payrecon::models::OrderStatus;
use serde_json::{json, Value};
use serial_test::serial;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[actix_web::test]
#[serial]
async fn health_check() {
  setup_tracing();
  let ctx = TestContext::new().await;
  let app = init_app!(ctx);

  let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body, json!({ "status": "ok" }));
}

#[actix_web::test]
#[serial]
async fn create_session_parameter_errors() {
  setup_tracing();
  let ctx = TestContext::new().await;
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::post().uri("/api/payments/create-session").to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body, json!({ "error": "missing_parameter", "parameter": "orderId" }));

  let resp = test::call_service(
    &app,
    test::TestRequest::post()
      .uri("/api/payments/create-session")
      .set_json(json!({ "orderId": "not-a-uuid" }))
      .to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["error"], "invalid_parameter");

  let resp = test::call_service(
    &app,
    test::TestRequest::post()
      .uri("/api/payments/create-session")
      .set_json(json!({ "orderId": uuid::Uuid::new_v4() }))
      .to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body, json!({ "error": "order_not_found" }));
}

#[actix_web::test]
#[serial]
async fn create_session_opens_gateway_session() {
  setup_tracing();
  let ctx = TestContext::new().await;
  Mock::given(method("POST"))
    .and(path("/api/developer/gatedeveloper/dev1"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
      "status": 1,
      "gatewayResponse": { "session_id": "S-abc", "indicator_status": "IND-xyz" }
    })))
    .expect(1)
    .mount(&ctx.gateway)
    .await;
  let order_id = ctx.seed(pending_order("12.5"));
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::post()
      .uri(&format!("/api/payments/create-session?orderId={order_id}"))
      .to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(
    body,
    json!({ "sessionId": "S-abc", "indicatorToken": "IND-xyz", "reused": false })
  );
  assert_eq!(ctx.order(order_id).payment_ref.as_deref(), Some("IND-xyz"));
}

#[actix_web::test]
#[serial]
async fn create_session_gateway_failure_is_bad_gateway() {
  setup_tracing();
  let ctx = TestContext::new().await;
  Mock::given(method("POST"))
    .respond_with(ResponseTemplate::new(500).set_body_string("down"))
    .mount(&ctx.gateway)
    .await;
  let order_id = ctx.seed(pending_order("12.5"));
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::post()
      .uri("/api/payments/create-session")
      .set_json(json!({ "orderId": order_id }))
      .to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["error"], "click_create_session_failed");
  assert_eq!(body["status"], 500);
  assert!(ctx.order(order_id).session_id.is_none());
}

#[actix_web::test]
#[serial]
async fn create_session_below_minimum() {
  setup_tracing();
  let ctx = TestContext::with_vars(&[("MIN_ORDER_KWD", "5")]).await;
  let order_id = ctx.seed(pending_order("3"));
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::post()
      .uri("/api/payments/create-session")
      .set_json(json!({ "orderId": order_id }))
      .to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body, json!({ "error": "amount_below_minimum", "min": 5.0 }));
}

#[actix_web::test]
#[serial]
async fn update_session_get_redirects_browser() {
  setup_tracing();
  let ctx = TestContext::new().await;
  Mock::given(method("POST"))
    .and(path("/api/developer/gatedeveloper/sessionupdate/dev1/ar"))
    .respond_with(ResponseTemplate::new(302).insert_header("Location", "https://pay.example/S-1"))
    .mount(&ctx.gateway)
    .await;
  let order_id = ctx.seed(order_with_session("10", "S-1", "IND-1"));
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::get()
      .uri(&format!("/api/payments/update-session?orderId={order_id}&lang=ar"))
      .to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::SEE_OTHER);
  assert_eq!(
    resp.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()),
    Some("https://pay.example/S-1")
  );
}

#[actix_web::test]
#[serial]
async fn update_session_post_reports_fallback() {
  setup_tracing();
  let ctx = TestContext::new().await;
  Mock::given(method("POST"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": 1 })))
    .mount(&ctx.gateway)
    .await;
  let order_id = ctx.seed(order_with_session("10", "S-1", "IND-1"));
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::post()
      .uri("/api/payments/update-session")
      .set_json(json!({ "orderId": order_id }))
      .to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["ok"], true);
  assert_eq!(body["fallback"], "default_pattern");
  assert_eq!(body["redirectUrl"], format!("{}/payment/S-1", ctx.gateway.uri()));
  assert_eq!(body["payload"], json!({ "status": 1 }));
}

#[actix_web::test]
#[serial]
async fn update_session_post_returns_gateway_url() {
  setup_tracing();
  let ctx = TestContext::new().await;
  Mock::given(method("POST"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": 1, "url": "https://pay.example/u" })))
    .mount(&ctx.gateway)
    .await;
  let order_id = ctx.seed(order_with_session("10", "S-1", "IND-1"));
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::post()
      .uri("/api/payments/update-session")
      .set_json(json!({ "orderId": order_id }))
      .to_request(),
  )
  .await;
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["paymentUrl"], "https://pay.example/u");
  assert_eq!(body["redirectUrl"], "https://pay.example/u");
  assert!(body.get("fallback").is_none());
}

#[actix_web::test]
#[serial]
async fn update_session_without_session() {
  setup_tracing();
  let ctx = TestContext::new().await;
  let order_id = ctx.seed(pending_order("10"));
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::post()
      .uri("/api/payments/update-session")
      .set_json(json!({ "orderId": order_id }))
      .to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body, json!({ "error": "no_session_id_for_order" }));
}

#[actix_web::test]
#[serial]
async fn confirm_get_with_return_message() {
  setup_tracing();
  let ctx = TestContext::new().await;
  let order_id = ctx.seed(order_with_session("10", "S-1", "IND-1"));
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::get()
      .uri(&format!(
        "/api/payments/confirm?orderId={order_id}&message=Success&indicator_status=IND-other"
      ))
      .to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["status"], "paid");
  assert_eq!(body["indicator_mismatch"], true);
  assert_eq!(body["gateway"]["via"], "return_message");
  assert_eq!(ctx.order(order_id).status, OrderStatus::Paid);
}

#[actix_web::test]
#[serial]
async fn confirm_post_fails_pending_when_asked() {
  setup_tracing();
  let ctx = TestContext::new().await;
  Mock::given(method("POST"))
    .and(path("/api/developer/gatedeveloper/paymentstatus/dev1"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "processing" })))
    .expect(1)
    .mount(&ctx.gateway)
    .await;
  let order_id = ctx.seed(order_with_session("10", "S-1", "IND-1"));
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::post()
      .uri("/api/payments/confirm")
      .set_json(json!({ "orderId": order_id, "failIfPending": true }))
      .to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["status"], "failed");
  assert_eq!(body["gateway"], json!({ "status": "processing" }));
  assert!(body.get("indicator_mismatch").is_none());
}

#[actix_web::test]
#[serial]
async fn confirm_gateway_error_leaves_order_pending() {
  setup_tracing();
  let ctx = TestContext::new().await;
  Mock::given(method("POST"))
    .respond_with(ResponseTemplate::new(503))
    .mount(&ctx.gateway)
    .await;
  let order_id = ctx.seed(order_with_session("10", "S-1", "IND-1"));
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::get()
      .uri(&format!("/api/payments/confirm?orderId={order_id}"))
      .to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["error"], "paymentstatus_http_error");
  assert_eq!(body["status"], 503);
  assert_eq!(ctx.order(order_id).status, OrderStatus::Pending);
}

#[actix_web::test]
#[serial]
async fn verify_reports_gateway_answer() {
  setup_tracing();
  let ctx = TestContext::new().await;
  Mock::given(method("POST"))
    .and(path("/api/developer/gatedeveloper/paymentstatus/dev1"))
    .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Status": "success", "TransactionId": "TX" })))
    .expect(1)
    .mount(&ctx.gateway)
    .await;
  let order_id = ctx.seed(order_with_session("10", "S-1", "IND-1"));
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::get()
      .uri(&format!("/api/payments/verify?orderId={order_id}"))
      .to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["status"], "paid");
  assert_eq!(body["gateway"]["TransactionId"], "TX");
  assert!(ctx.order(order_id).paid_at.is_some());
}

#[actix_web::test]
#[serial]
async fn expire_pendings_with_query_parameters() {
  setup_tracing();
  let ctx = TestContext::new().await;
  let stale = ctx.seed(order_created_ago("10", 45));
  let fresh = ctx.seed(order_created_ago("10", 10));
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::get()
      .uri("/api/payments/expire-pendings?minutes=30&status=cancelled")
      .to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["ok"], true);
  assert_eq!(body["updated"], 1);
  assert_eq!(body["status"], "cancelled");
  assert!(body["cutoff"].is_string());
  assert_eq!(ctx.order(stale).status, OrderStatus::Cancelled);
  assert_eq!(ctx.order(fresh).status, OrderStatus::Pending);
}

#[actix_web::test]
#[serial]
async fn expire_pendings_negative_threshold_means_one_minute() {
  setup_tracing();
  let ctx = TestContext::new().await;
  let stale = ctx.seed(order_created_ago("10", 5));
  let fresh = ctx.seed(order_created_ago("10", 0));
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::get()
      .uri("/api/payments/expire-pendings?minutes=-5")
      .to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["updated"], 1);
  assert_eq!(ctx.order(stale).status, OrderStatus::Failed);
  assert_eq!(ctx.order(fresh).status, OrderStatus::Pending);
}

#[actix_web::test]
#[serial]
async fn unrouted_method_is_rejected() {
  setup_tracing();
  let ctx = TestContext::new().await;
  let app = init_app!(ctx);

  let resp = test::call_service(
    &app,
    test::TestRequest::put().uri("/api/payments/confirm").to_request(),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}
