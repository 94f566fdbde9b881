//! # Money Module
//!
//! Decimal arithmetic helpers for monetary values.
//!
//! ## Why Decimal?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Overhead allocation multiplies every cost by a share like 0.4 and     │
//! │  sums the pieces again. With f64 the pieces stop adding up.            │
//! │                                                                         │
//! │  OUR SOLUTION: rust_decimal::Decimal                                    │
//! │    96-bit mantissa, base-10 scale, exact for + - ×                     │
//! │    Division is exact up to 28 significant digits and deterministic     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in the engine rounds. Rounding is a presentation concern and
//! happens only through [`round_money`].
//!
//! ## Usage
//! ```rust
//! use pantry_core::money::{line_total, safe_div};
//! use rust_decimal::Decimal;
//!
//! let price = Decimal::new(1200, 2); // 12.00
//! assert_eq!(line_total(price, 5).unwrap(), Decimal::new(6000, 2));
//!
//! // Zero denominators never panic
//! assert_eq!(safe_div(price, Decimal::ZERO), Decimal::ZERO);
//! ```

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{CoreError, CoreResult};

/// One hundred, for percentage math.
pub const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Allowed deviation from 100% when validating allocation percentages.
pub const ALLOCATION_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Multiplies a unit price by a quantity.
///
/// ## Errors
/// `CoreError::InvariantViolation` when the product leaves the decimal range.
///
/// ## Example
/// ```rust
/// use pantry_core::money::line_total;
/// use rust_decimal::Decimal;
///
/// let unit_price = Decimal::new(299, 2); // 2.99
/// assert_eq!(line_total(unit_price, 3).unwrap(), Decimal::new(897, 2));
/// assert!(line_total(Decimal::MAX, 2).is_err());
/// ```
#[inline]
pub fn line_total(unit_price: Decimal, quantity: i64) -> CoreResult<Decimal> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| CoreError::invariant(format!("{} x {} overflows", unit_price, quantity)))
}

/// Adds two amounts, failing instead of overflowing.
#[inline]
pub fn checked_add(a: Decimal, b: Decimal) -> CoreResult<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| CoreError::invariant(format!("{} + {} overflows", a, b)))
}

/// Sums amounts, failing instead of overflowing.
pub fn checked_sum(amounts: impl IntoIterator<Item = Decimal>) -> CoreResult<Decimal> {
    amounts.into_iter().try_fold(Decimal::ZERO, checked_add)
}

/// Divides, returning zero when the denominator is zero.
///
/// Ratios in the costing engine are shares of totals that may legitimately
/// be empty (no inventory, no stock on hand). Those cases yield zero instead
/// of an error, and overflow also collapses to zero.
#[inline]
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        return Decimal::ZERO;
    }
    numerator.checked_div(denominator).unwrap_or(Decimal::ZERO)
}

/// Returns `part` as a percentage of `whole` (0 when `whole` is zero).
///
/// ## Example
/// ```rust
/// use pantry_core::money::percentage;
/// use rust_decimal::Decimal;
///
/// assert_eq!(percentage(Decimal::from(40), Decimal::from(200)), Decimal::from(20));
/// assert_eq!(percentage(Decimal::from(40), Decimal::ZERO), Decimal::ZERO);
/// ```
#[inline]
pub fn percentage(part: Decimal, whole: Decimal) -> Decimal {
    safe_div(part, whole)
        .checked_mul(HUNDRED)
        .unwrap_or(Decimal::ZERO)
}

/// Rounds for display using Bankers Rounding (round half to even).
///
/// ## Bankers Rounding Explained
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────┐
/// │  Standard rounding always rounds 0.5 UP, causing systematic bias:  │
/// │    0.125 → 0.13, 0.135 → 0.14                                       │
/// │                                                                     │
/// │  Bankers Rounding rounds 0.5 to nearest EVEN digit:                │
/// │    0.125 → 0.12, 0.135 → 0.14                                       │
/// └─────────────────────────────────────────────────────────────────────┘
/// ```
#[inline]
pub fn round_money(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven)
}

/// Formats a value with two decimal places (for logs and receipts).
pub fn format_money(value: Decimal) -> String {
    format!("{:.2}", round_money(value, 2))
}

// =============================================================================
// Unit Tests
// =============================================================================
