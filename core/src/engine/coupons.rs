// payrecon/src/engine/coupons.rs

use super::{ReconcileError, Reconciler};
use crate::models::{Coupon, CouponRejection};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::instrument;

#[derive(Debug, Clone, PartialEq)]
pub enum CouponCheck {
  Valid {
    coupon: Coupon,
    /// Present when a subtotal was supplied.
    discount: Option<Decimal>,
  },
  Invalid {
    reason: CouponRejection,
  },
}

impl Reconciler {
  /// Checks a code a shopper typed at checkout. Read-only; usage is only counted on payment.
  #[instrument(name = "Reconciler::validate_coupon", skip(self))]
  pub async fn validate_coupon(&self, code: &str, subtotal: Option<Decimal>) -> Result<CouponCheck, ReconcileError> {
    let code = code.trim();
    if code.is_empty() {
      return Ok(CouponCheck::Invalid {
        reason: CouponRejection::NotFound,
      });
    }

    let Some(coupon) = self.services.store.find_coupon_by_code(code).await? else {
      return Ok(CouponCheck::Invalid {
        reason: CouponRejection::NotFound,
      });
    };

    if let Err(reason) = coupon.check_redeemable(Utc::now()) {
      return Ok(CouponCheck::Invalid { reason });
    }

    let discount = subtotal.map(|s| coupon.discount_for(s));
    Ok(CouponCheck::Valid { coupon, discount })
  }
}
