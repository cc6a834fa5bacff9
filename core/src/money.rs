// payrecon/src/money.rs

//! Currency amounts. Everything is carried as `Decimal` and rounded to the
//! three fractional digits of the store currency.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;
use std::str::FromStr;

pub const CURRENCY_SCALE: u32 = 3;

pub const DEFAULT_CURRENCY: &str = "KWD";

/// Rounds to currency precision, half away from zero.
pub fn round_to_currency(value: Decimal) -> Decimal {
  value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Coerces free-form text to a rounded amount. Anything unparseable is zero.
pub fn coerce_amount(raw: &str) -> Decimal {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Decimal::ZERO;
  }
  let parsed = Decimal::from_str(trimmed)
    .or_else(|_| Decimal::from_scientific(trimmed))
    .ok()
    .or_else(|| trimmed.parse::<f64>().ok().and_then(finite_decimal));
  parsed.map(round_to_currency).unwrap_or(Decimal::ZERO)
}

/// NaN and infinities become zero.
pub fn amount_from_f64(value: f64) -> Decimal {
  finite_decimal(value).map(round_to_currency).unwrap_or(Decimal::ZERO)
}

/// Accepts JSON numbers and numeric strings; every other shape is zero.
pub fn amount_from_json(value: &Value) -> Decimal {
  match value {
    Value::Number(n) => n.as_f64().map(amount_from_f64).unwrap_or(Decimal::ZERO),
    Value::String(s) => coerce_amount(s),
    _ => Decimal::ZERO,
  }
}

/// The gateway expects amounts as JSON numbers, not strings.
pub fn to_wire(amount: Decimal) -> Value {
  let rounded = round_to_currency(amount);
  rounded
    .to_f64()
    .and_then(serde_json::Number::from_f64)
    .map(Value::Number)
    .unwrap_or_else(|| Value::from(0))
}

fn finite_decimal(value: f64) -> Option<Decimal> {
  if value.is_finite() {
    Decimal::from_f64(value)
  } else {
    None
  }
}
