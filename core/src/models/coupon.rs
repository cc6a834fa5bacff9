// payrecon/src/models/coupon.rs

use crate::money::round_to_currency;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
  pub id: Uuid,
  /// Unique, compared case-insensitively.
  pub code: String,
  pub pct_off: Option<Decimal>,
  pub amount_off: Option<Decimal>,
  pub used_count: i64,
  /// `None` means unlimited.
  pub usage_limit: Option<i64>,
  pub starts_at: Option<DateTime<Utc>>,
  pub ends_at: Option<DateTime<Utc>>,
  pub active: bool,
}

/// Why a coupon cannot be redeemed right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
  NotFound,
  Inactive,
  NotStarted,
  Expired,
  LimitReached,
}

impl CouponRejection {
  pub fn code(&self) -> &'static str {
    match self {
      CouponRejection::NotFound => "not_found",
      CouponRejection::Inactive => "inactive",
      CouponRejection::NotStarted => "not_started",
      CouponRejection::Expired => "expired",
      CouponRejection::LimitReached => "limit_reached",
    }
  }
}

impl fmt::Display for CouponRejection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.code())
  }
}

impl Coupon {
  pub fn limit_reached(&self) -> bool {
    self.usage_limit.is_some_and(|limit| self.used_count >= limit)
  }

  pub fn check_redeemable(&self, now: DateTime<Utc>) -> Result<(), CouponRejection> {
    if !self.active {
      return Err(CouponRejection::Inactive);
    }
    if self.starts_at.is_some_and(|starts| now < starts) {
      return Err(CouponRejection::NotStarted);
    }
    if self.ends_at.is_some_and(|ends| now > ends) {
      return Err(CouponRejection::Expired);
    }
    if self.limit_reached() {
      return Err(CouponRejection::LimitReached);
    }
    Ok(())
  }

  /// Percent and fixed parts stack, capped at the subtotal.
  pub fn discount_for(&self, subtotal: Decimal) -> Decimal {
    let pct = self.pct_off.unwrap_or(Decimal::ZERO) / Decimal::ONE_HUNDRED * subtotal;
    let fixed = self.amount_off.unwrap_or(Decimal::ZERO);
    let raw = (pct + fixed).max(Decimal::ZERO).min(subtotal.max(Decimal::ZERO));
    round_to_currency(raw)
  }
}
