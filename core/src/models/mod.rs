// payrecon/src/models/mod.rs

pub mod coupon;
pub mod order;
pub mod payment;

pub use coupon::{Coupon, CouponRejection};
pub use order::{CustomerDetails, Order, OrderPatch, OrderStatus, PaymentMethod};
pub use payment::{NewPayment, Payment, PaymentEvent, PaymentEventKind, PaymentPatch, PaymentStatus};
