//! # Commission Calculation
//!
//! Turns (type, amount, rate, quantity) into a commission result.
//!
//! ## Two Directions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SERVICE / POS  →  PlatformSplit                                        │
//! │                                                                         │
//! │    base          = amount × quantity                                    │
//! │    platform_fee  = round(base × rate)   (raised to the minimum fee)     │
//! │    barber_amount = round(base) − platform_fee                           │
//! │                                                                         │
//! │  RETAIL         →  BarberCommission                                     │
//! │                                                                         │
//! │    line_total        = round(amount × quantity)                         │
//! │    commission_amount = round(line_total × rate)                         │
//! │                                                                         │
//! │  Rounding: half-up to cents, once per output value.                     │
//! │  platform_fee + barber_amount == round(base), always.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use clipper_core::commission::{CommissionCalculator, CommissionInput};
//! use clipper_core::money::Money;
//! use clipper_core::CommissionType;
//!
//! let calc = CommissionCalculator::default();
//! let input = CommissionInput::new(
//!     CommissionType::Service,
//!     Money::from_cents(10000),
//!     "0.30".parse().unwrap(),
//! );
//! let result = calc.calculate(&input).unwrap();
//!
//! assert_eq!(result.commission_amount(), Money::from_cents(3000));
//! assert_eq!(result.barber_amount(), Some(Money::from_cents(7000)));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::money::Money;
use crate::types::{CommissionRate, CommissionType, TransactionKind};
use crate::validation::{validate_amount, validate_quantity};

// =============================================================================
// Minimum Fees
// =============================================================================

/// Floor for the platform fee on standard transactions.
///
/// Zero disables the floor. Retail has no entry because retail commissions
/// flow to the barber, not the platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinimumFees {
    #[serde(default)]
    pub service: Money,
    #[serde(default)]
    pub pos: Money,
}

impl MinimumFees {
    pub fn for_type(&self, commission_type: CommissionType) -> Money {
        match commission_type {
            CommissionType::Service => self.service,
            CommissionType::Pos => self.pos,
            CommissionType::Retail => Money::zero(),
        }
    }
}

// =============================================================================
// Input / Result
// =============================================================================

/// One commission calculation request.
#[derive(Debug, Clone)]
pub struct CommissionInput {
    pub commission_type: CommissionType,
    pub amount: Money,
    pub rate: CommissionRate,
    pub quantity: u32,
    pub kind: TransactionKind,
}

impl CommissionInput {
    /// Quantity defaults to 1, kind to `Standard`.
    pub fn new(commission_type: CommissionType, amount: Money, rate: CommissionRate) -> Self {
        CommissionInput {
            commission_type,
            amount,
            rate,
            quantity: 1,
            kind: TransactionKind::Standard,
        }
    }

    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn kind(mut self, kind: TransactionKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Result of a commission calculation.
///
/// The variant says who the commission amount belongs to:
/// the platform (`PlatformSplit`) or the barber (`BarberCommission`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommissionResult {
    /// SERVICE and POS: the sale is split between platform and barber.
    PlatformSplit {
        base_amount: Money,
        platform_fee: Money,
        barber_amount: Money,
        rate_applied: CommissionRate,
        commission_type: CommissionType,
        calculated_at: DateTime<Utc>,
    },
    /// RETAIL: the barber earns a cut of the line total.
    BarberCommission {
        line_total: Money,
        commission_amount: Money,
        rate_applied: CommissionRate,
        calculated_at: DateTime<Utc>,
    },
}

impl CommissionResult {
    /// The commission figure that gets cached on the source record.
    ///
    /// Platform fee for splits, barber earnings for retail.
    pub fn commission_amount(&self) -> Money {
        match self {
            CommissionResult::PlatformSplit { platform_fee, .. } => *platform_fee,
            CommissionResult::BarberCommission {
                commission_amount, ..
            } => *commission_amount,
        }
    }

    /// The rounded amount the commission was computed on.
    pub fn base_amount(&self) -> Money {
        match self {
            CommissionResult::PlatformSplit { base_amount, .. } => *base_amount,
            CommissionResult::BarberCommission { line_total, .. } => *line_total,
        }
    }

    /// The barber's share of a split; `None` for retail.
    pub fn barber_amount(&self) -> Option<Money> {
        match self {
            CommissionResult::PlatformSplit { barber_amount, .. } => Some(*barber_amount),
            CommissionResult::BarberCommission { .. } => None,
        }
    }

    pub fn rate_applied(&self) -> CommissionRate {
        match self {
            CommissionResult::PlatformSplit { rate_applied, .. }
            | CommissionResult::BarberCommission { rate_applied, .. } => *rate_applied,
        }
    }

    pub fn commission_type(&self) -> CommissionType {
        match self {
            CommissionResult::PlatformSplit {
                commission_type, ..
            } => *commission_type,
            CommissionResult::BarberCommission { .. } => CommissionType::Retail,
        }
    }

    pub fn calculated_at(&self) -> DateTime<Utc> {
        match self {
            CommissionResult::PlatformSplit { calculated_at, .. }
            | CommissionResult::BarberCommission { calculated_at, .. } => *calculated_at,
        }
    }
}

// =============================================================================
// Calculator
// =============================================================================

/// Stateless commission calculator.
///
/// Holds only configuration (minimum fees). Every call is a pure function of
/// its input plus the timestamp it is given.
#[derive(Debug, Clone, Default)]
pub struct CommissionCalculator {
    minimum_fees: MinimumFees,
}

impl CommissionCalculator {
    pub fn new(minimum_fees: MinimumFees) -> Self {
        CommissionCalculator { minimum_fees }
    }

    pub fn minimum_fees(&self) -> &MinimumFees {
        &self.minimum_fees
    }

    /// Calculates a commission stamped with the current time.
    pub fn calculate(&self, input: &CommissionInput) -> CoreResult<CommissionResult> {
        self.calculate_at(input, Utc::now())
    }

    /// Calculates a commission stamped with `at`.
    ///
    /// ## Errors
    /// Negative or oversized amount, zero quantity.
    pub fn calculate_at(
        &self,
        input: &CommissionInput,
        at: DateTime<Utc>,
    ) -> CoreResult<CommissionResult> {
        validate_amount("amount", input.amount)?;
        validate_quantity(input.quantity)?;

        let base = input.amount.multiply_quantity(input.quantity);
        let rounded_base = base.round_half_up();

        match input.commission_type {
            CommissionType::Retail => Ok(CommissionResult::BarberCommission {
                line_total: rounded_base,
                commission_amount: base.apply_rate(input.rate).round_half_up(),
                rate_applied: input.rate,
                calculated_at: at,
            }),
            CommissionType::Service | CommissionType::Pos => {
                let mut platform_fee = base.apply_rate(input.rate).round_half_up();

                if input.kind == TransactionKind::Standard {
                    let minimum = self.minimum_fees.for_type(input.commission_type);
                    if platform_fee < minimum {
                        platform_fee = minimum.min(rounded_base);
                    }
                }

                Ok(CommissionResult::PlatformSplit {
                    base_amount: rounded_base,
                    platform_fee,
                    barber_amount: rounded_base - platform_fee,
                    rate_applied: input.rate,
                    commission_type: input.commission_type,
                    calculated_at: at,
                })
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
