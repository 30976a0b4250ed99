//! Fixed-decimal amount formatting.
//!
//! Every amount handed to a deposit executor goes through here: round to
//! cents, floor to 6-decimal base units, render back with two decimals.
//! Uses `Decimal` so the floor at the base-unit boundary is exact.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::AllocatorError;

/// Decimals of the stablecoin's base unit.
pub const BASE_UNIT_DECIMALS: u32 = 6;
/// Decimals kept in whole-unit amounts.
pub const DISPLAY_DECIMALS: u32 = 2;

const BASE_UNIT_SCALE: Decimal = dec!(1000000);

/// Round to cents, then floor to integer base units.
fn base_units(amount: f64) -> Result<Decimal, AllocatorError> {
    if !amount.is_finite() {
        return Err(AllocatorError::InvalidAmount(format!(
            "{amount} is not a finite number"
        )));
    }
    let value = Decimal::from_f64(amount).ok_or_else(|| {
        AllocatorError::InvalidAmount(format!("{amount} is out of range"))
    })?;
    let cents = value.round_dp_with_strategy(DISPLAY_DECIMALS, RoundingStrategy::MidpointAwayFromZero);
    let base = cents.checked_mul(BASE_UNIT_SCALE).ok_or_else(|| {
        AllocatorError::InvalidAmount(format!("{amount} is too large to express in base units"))
    })?;
    Ok(base.floor())
}

/// Render base units as a fixed 2-decimal whole-unit string.
fn render(base: Decimal) -> String {
    let whole = (base / BASE_UNIT_SCALE).round_dp(DISPLAY_DECIMALS);
    // Avoid "-0.00" so the output parses back to the same string.
    let whole = if whole.is_zero() { Decimal::ZERO } else { whole };
    format!("{whole:.2}")
}

/// Convert `amount` into an exchange-safe fixed-decimal string.
///
/// `to_whole_units(500.004) == "500.00"`. Idempotent on its own output.
pub fn to_whole_units(amount: f64) -> Result<String, AllocatorError> {
    Ok(render(base_units(amount)?))
}

/// The same conversion, returning integer base units (10⁻⁶ of a unit).
/// Negative amounts are rejected.
pub fn to_base_units(amount: f64) -> Result<u64, AllocatorError> {
    let base = base_units(amount)?;
    base.to_u64().ok_or_else(|| {
        AllocatorError::InvalidAmount(format!("{amount} cannot be expressed in base units"))
    })
}

/// Render integer base units as whole units with two decimals.
pub fn format_base_units(base: u64) -> String {
    render(Decimal::from(base))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
