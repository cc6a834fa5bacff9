// payrecon/src/coupon_counter.rs

//! Counts a coupon redemption exactly once per paid order.
//!
//! The order's `coupon_applied` flag and the coupon's `used_count` are two
//! rows with no shared transaction, so the pair is updated with two
//! conditional writes: flag first, then counter. Losing the counter race
//! rolls the flag back. If that rollback also fails the order is left with
//! the flag set and no increment, which never over-counts.

use crate::models::Coupon;
use crate::store::{Store, StoreError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CouponOutcome {
  Applied { coupon_id: Uuid, used_count: i64 },
  AlreadyApplied,
  LimitReached,
  CouponUpdateFailed,
  NoCoupon,
  CouponNotFound,
}

#[derive(Clone)]
pub struct CouponCounter {
  store: Arc<dyn Store>,
}

impl CouponCounter {
  pub fn new(store: Arc<dyn Store>) -> Self {
    Self { store }
  }

  #[instrument(name = "CouponCounter::apply_usage", skip(self))]
  pub async fn apply_usage(&self, order_id: Uuid) -> Result<CouponOutcome, StoreError> {
    let Some(order) = self.store.fetch_order(order_id).await? else {
      warn!("Order vanished before coupon usage could be counted.");
      return Ok(CouponOutcome::NoCoupon);
    };
    if order.coupon_applied {
      return Ok(CouponOutcome::AlreadyApplied);
    }
    let Some(code) = order.coupon_code.as_deref() else {
      return Ok(CouponOutcome::NoCoupon);
    };

    let Some(coupon) = self.store.find_coupon_by_code(code).await? else {
      warn!(coupon_code = %code, "Order references an unknown coupon.");
      return Ok(CouponOutcome::CouponNotFound);
    };
    if coupon.limit_reached() {
      info!(coupon_code = %coupon.code, used = coupon.used_count, "Coupon usage limit reached.");
      return Ok(CouponOutcome::LimitReached);
    }

    if !self.store.set_coupon_applied_if(order_id, false, true).await? {
      return Ok(CouponOutcome::AlreadyApplied);
    }

    match self.store.increment_coupon_usage_if(coupon.id, coupon.used_count).await {
      Ok(true) => {
        let used_count = coupon.used_count + 1;
        info!(coupon_code = %coupon.code, used_count, "Coupon usage counted.");
        Ok(CouponOutcome::Applied {
          coupon_id: coupon.id,
          used_count,
        })
      }
      Ok(false) => {
        warn!(coupon_code = %coupon.code, "Coupon counter moved underneath us; rolling back order flag.");
        self.roll_back_flag(order_id, &coupon).await;
        Ok(CouponOutcome::CouponUpdateFailed)
      }
      Err(err) => {
        self.roll_back_flag(order_id, &coupon).await;
        Err(err)
      }
    }
  }

  async fn roll_back_flag(&self, order_id: Uuid, coupon: &Coupon) {
    match self.store.set_coupon_applied_if(order_id, true, false).await {
      Ok(true) => {}
      Ok(false) => warn!(%order_id, coupon_code = %coupon.code, "Coupon flag already cleared during rollback."),
      Err(err) => error!(
        %order_id,
        coupon_code = %coupon.code,
        error = %err,
        "Coupon flag rollback failed; order keeps coupon_applied without an increment."
      ),
    }
  }
}
