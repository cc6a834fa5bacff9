// payrecon_server/src/web/handlers/mod.rs

pub mod coupon_handlers;
pub mod payment_handlers;
