// payrecon_server/src/web/routes.rs

use actix_web::web;

use crate::web::handlers::{coupon_handlers, payment_handlers};

async fn health_check_handler() -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Resources answer 405 for methods they do not route.
pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.route("/health", web::get().to(health_check_handler)).service(
    web::scope("/api")
      .service(
        web::scope("/payments")
          .service(web::resource("/create-session").route(web::post().to(payment_handlers::create_session_handler)))
          .service(
            web::resource("/update-session")
              .route(web::get().to(payment_handlers::update_session_redirect_handler))
              .route(web::post().to(payment_handlers::update_session_json_handler)),
          )
          .service(
            web::resource("/confirm")
              .route(web::get().to(payment_handlers::confirm_get_handler))
              .route(web::post().to(payment_handlers::confirm_post_handler)),
          )
          .service(
            web::resource("/verify")
              .route(web::get().to(payment_handlers::verify_handler))
              .route(web::post().to(payment_handlers::verify_handler)),
          )
          .service(
            web::resource("/expire-pendings")
              .route(web::get().to(payment_handlers::expire_pendings_handler))
              .route(web::post().to(payment_handlers::expire_pendings_handler)),
          ),
      )
      .service(
        web::scope("/coupons").service(web::resource("/validate").route(web::get().to(coupon_handlers::validate_coupon_handler))),
      ),
  );
}
