// payrecon/src/lib.rs

//! Payrecon: order and payment reconciliation for the Click payment gateway.
//!
//! The crate drives one order through its gateway lifecycle:
//!  - Opening a payment session, or handing back the one the order already has.
//!  - Pushing order details to the session and resolving the customer's payment URL.
//!  - Confirming the outcome from a return message or from the gateway's status endpoint.
//!  - Expiring orders that stayed pending for too long.
//!
//! Each operation is a small `Flow` of named steps over a shared context.
//! Orders live behind the `Store` trait; the payments audit relations are
//! optional and written through `PaymentLedger`, which never fails an operation.

pub mod config;
pub mod coupon_counter;
pub mod engine;
pub mod flow;
pub mod gateway;
pub mod models;
pub mod money;
pub mod store;

// --- Re-exports for the Public API ---

pub use crate::config::{GatewayConfig, ReconcileConfig, RedirectFallback};
pub use crate::coupon_counter::{CouponCounter, CouponOutcome};
pub use crate::engine::{
  ConfirmRequest, ConfirmVia, Confirmation, CouponCheck, ErrorKind, ExpireReport, ExpireTarget, PaymentRedirect,
  ReconcileError, Reconciler, RedirectSource, SessionHandle,
};
pub use crate::flow::{ContextData, Flow, FlowError, FlowOutcome, StepControl};
pub use crate::gateway::{ClickGateway, GatewayError, GatewayStatus, Lang, PaymentGateway};
pub use crate::models::{Order, OrderStatus, PaymentMethod, PaymentStatus};
pub use crate::store::{MemoryStore, PaymentLedger, PgStore, Store, StoreError};
