//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Fixed-Point Decimals?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    19.995 × 0.30 = 5.998499999999999  ❌ rounds DOWN to 5.99            │
//! │                                                                         │
//! │  OUR SOLUTION: rust_decimal                                             │
//! │    19.995 × 0.30 = 5.9985 (exact)     ✅ rounds half-up to 6.00         │
//! │                                                                         │
//! │  Intermediate values keep full precision. Rounding to cents happens     │
//! │  exactly ONCE, at the end of a calculation.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use clipper_core::money::Money;
//!
//! let price = Money::from_cents(4550); // $45.50
//! let doubled = price * 2;              // $91.00
//! assert_eq!(doubled.to_cents(), 9100);
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use std::str::FromStr;

use crate::types::CommissionRate;

/// Number of decimal places money is rounded to.
pub const MONEY_DECIMAL_PLACES: u32 = 2;

/// Rounds a decimal half-up to two places.
///
/// "Half-up" here means midpoints move away from zero, so `5.9985 → 6.00`
/// and `6.825 → 6.83`. Every monetary result in the crate goes through this
/// function exactly once.
#[inline]
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the shop's currency.
///
/// ## Design Decisions
/// - **Decimal (not cents)**: inputs such as `19.995` keep their sub-cent
///   precision until the final rounding step.
/// - **Persisted as cents**: every stored amount has already been rounded,
///   so the database layer uses [`Money::to_cents`] / [`Money::from_cents`].
///
/// ## Where Money Flows
/// ```text
/// Service.base_price ──► PricingRuleEngine ──► ServicePayment.amount
///                                                   │
/// OrderLineItem.line_total ──┐                      ▼
///                            ├──► CommissionCalculator ──► CommissionResult
/// PosTransaction.subtotal ───┘                      │
///                                                   ▼
///                                   PayoutAccumulator ──► PayoutSummary
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Wraps an arbitrary-precision decimal amount.
    #[inline]
    pub const fn new(amount: Decimal) -> Self {
        Money(amount)
    }

    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use clipper_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.to_string(), "$10.99");
    /// ```
    #[inline]
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, MONEY_DECIMAL_PLACES))
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    /// Returns the underlying decimal amount.
    #[inline]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Rounds the amount half-up to whole cents.
    ///
    /// ## Example
    /// ```rust
    /// use clipper_core::money::Money;
    ///
    /// let raw: Money = "5.9985".parse().unwrap();
    /// assert_eq!(raw.round_half_up().to_string(), "$6.00");
    /// ```
    #[inline]
    pub fn round_half_up(&self) -> Money {
        Money(round_half_up(self.0))
    }

    /// Returns the value in cents, rounding half-up first.
    ///
    /// Amounts outside the `i64` cent range collapse to zero; validation
    /// caps real amounts far below that.
    pub fn to_cents(&self) -> i64 {
        (round_half_up(self.0) * Decimal::ONE_HUNDRED)
            .to_i64()
            .unwrap_or_default()
    }

    /// Checks if the value is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checks if the value is strictly negative.
    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Checks if the value is strictly positive.
    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Multiplies by a commission rate WITHOUT rounding.
    ///
    /// Callers round the final result once via [`Money::round_half_up`].
    #[inline]
    pub fn apply_rate(&self, rate: CommissionRate) -> Money {
        Money(self.0 * rate.value())
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub fn multiply_quantity(&self, qty: u32) -> Money {
        Money(self.0 * Decimal::from(qty))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows the amount rounded to cents, for logs and the CLI.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = round_half_up(self.0);
        let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
            "-"
        } else {
            ""
        };
        write!(f, "{}${:.2}", sign, rounded.abs())
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Money)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money(value)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: u32) -> Self {
        self.multiply_quantity(qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
