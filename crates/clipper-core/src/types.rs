//! # Domain Types
//!
//! Core domain types shared by every commission component.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ CommissionType  │   │ CommissionRate  │   │ CommissionState │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Service        │   │  Decimal [0,1]  │   │  Uncommitted    │       │
//! │  │  Retail         │   │  0.30 = 30%     │   │  Committed      │       │
//! │  │  Pos            │   │                 │   │  Paid           │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  Commission-bearing records                                            │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  OrderLineItem  │   │ PosTransaction  │   │ ServicePayment  │       │
//! │  │  (RETAIL)       │   │  (POS)          │   │  (SERVICE)      │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │  PayoutPeriod   │   │     Payout      │                             │
//! │  │  [start, end)   │   │  persisted run  │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::validation::validate_rate;

// =============================================================================
// Commission Type
// =============================================================================

/// Which revenue stream a commission comes from.
///
/// The type also fixes the DIRECTION of the commission amount:
/// - `Service` / `Pos`: the commission is the platform's cut of the sale
/// - `Retail`: the commission is what the selling barber earns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum CommissionType {
    /// Booked services (haircuts, shaves).
    Service,
    /// Retail products sold through online orders.
    Retail,
    /// In-shop point-of-sale transactions.
    Pos,
}

impl CommissionType {
    /// All commission types in a stable order.
    pub const ALL: [CommissionType; 3] = [
        CommissionType::Service,
        CommissionType::Retail,
        CommissionType::Pos,
    ];

    /// Returns the storage / wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionType::Service => "service",
            CommissionType::Retail => "retail",
            CommissionType::Pos => "pos",
        }
    }

    /// Returns true when the commission is deducted by the platform.
    pub fn is_platform_fee(&self) -> bool {
        matches!(self, CommissionType::Service | CommissionType::Pos)
    }
}

impl fmt::Display for CommissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommissionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "service" => Ok(CommissionType::Service),
            "retail" => Ok(CommissionType::Retail),
            "pos" => Ok(CommissionType::Pos),
            other => Err(CoreError::UnknownCommissionType(other.to_string())),
        }
    }
}

// =============================================================================
// Commission Rate
// =============================================================================

/// A commission rate as a decimal fraction in `[0, 1]`.
///
/// ## Why a newtype?
/// Once constructed, a rate is known to be in bounds. Functions that take a
/// `CommissionRate` never re-check, and there is no way to build one from an
/// out-of-range decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct CommissionRate(Decimal);

impl CommissionRate {
    /// Zero rate.
    pub const ZERO: CommissionRate = CommissionRate(Decimal::ZERO);

    /// Creates a rate, rejecting anything outside `[0, 1]`.
    pub fn new(value: Decimal) -> Result<Self, ValidationError> {
        validate_rate(value)?;
        Ok(CommissionRate(value.normalize()))
    }

    /// Returns the fraction.
    #[inline]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    /// Checks if the rate is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl TryFrom<Decimal> for CommissionRate {
    type Error = ValidationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        CommissionRate::new(value)
    }
}

impl From<CommissionRate> for Decimal {
    fn from(rate: CommissionRate) -> Self {
        rate.0
    }
}

impl FromStr for CommissionRate {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|e| ValidationError::InvalidFormat {
            field: "rate".to_string(),
            reason: e.to_string(),
        })?;
        CommissionRate::new(value)
    }
}

impl fmt::Display for CommissionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Transaction Kind
// =============================================================================

/// How a service or POS payment was taken.
///
/// Only `Standard` transactions are raised to the minimum platform fee.
/// Booking deposits are partial prepayments and are charged the plain rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    #[default]
    Standard,
    Deposit,
}

impl FromStr for TransactionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(TransactionKind::Standard),
            "deposit" => Ok(TransactionKind::Deposit),
            other => Err(ValidationError::InvalidFormat {
                field: "transaction_type".to_string(),
                reason: format!("unknown transaction type '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Commission State
// =============================================================================

/// Lifecycle of a commission-bearing record.
///
/// ```text
/// UNCOMMITTED ──(commission computed)──► COMMITTED ──(payout run)──► PAID
/// (rate=0 or amount=0)                   (paid=false)                (paid=true)
/// ```
///
/// The transition to `Paid` is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionState {
    Uncommitted,
    Committed,
    Paid,
}

impl CommissionState {
    /// Derives the state from the cached commission fields.
    pub fn of(amount: Money, rate: Option<CommissionRate>, paid: bool) -> Self {
        if paid {
            return CommissionState::Paid;
        }
        match rate {
            Some(r) if !r.is_zero() && !amount.is_zero() => CommissionState::Committed,
            _ => CommissionState::Uncommitted,
        }
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Status of a retail order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Paid,
    Refunded,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

/// A retail order placed with a shop and attributed to a selling barber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub barber_id: String,
    pub location_id: Option<String>,
    pub status: OrderStatus,
    /// Settlement timestamp; set when the payment is confirmed.
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A line of a retail order.
///
/// ## Snapshot Pattern
/// `commission_rate` is captured when the order is paid and never changes.
/// Rate edits made afterwards do not reach historical commissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: String,
    pub order_id: String,
    pub product_id: Option<String>,
    /// Natural storage order within the order.
    pub position: i64,
    pub quantity: u32,
    pub unit_price: Money,
    /// Quantity × unit price, after any line-level discount.
    pub line_total: Money,
    /// Rate snapshot; `None` until the order's commissions are calculated.
    pub commission_rate: Option<CommissionRate>,
    /// Barber-earned commission; zero is the "not computed" sentinel.
    pub commission_amount: Money,
    pub commission_paid: bool,
    pub commission_paid_at: Option<DateTime<Utc>>,
    pub payout_id: Option<String>,
}

impl OrderLineItem {
    /// Returns the lifecycle state of this line's commission.
    pub fn commission_state(&self) -> CommissionState {
        CommissionState::of(
            self.commission_amount,
            self.commission_rate,
            self.commission_paid,
        )
    }
}

// =============================================================================
// POS Transactions
// =============================================================================

/// Status of a point-of-sale transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PosStatus {
    #[default]
    Pending,
    Settled,
    Voided,
}

impl PosStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PosStatus::Pending => "pending",
            PosStatus::Settled => "settled",
            PosStatus::Voided => "voided",
        }
    }
}

/// A single-line in-shop sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosTransaction {
    pub id: String,
    pub barber_id: String,
    pub location_id: Option<String>,
    pub product_id: Option<String>,
    pub subtotal: Money,
    pub kind: TransactionKind,
    pub status: PosStatus,
    pub settled_at: Option<DateTime<Utc>>,
    pub commission_rate: Option<CommissionRate>,
    /// Platform fee; zero is the "not computed" sentinel.
    pub commission_amount: Money,
    /// The barber's share of the subtotal.
    pub barber_amount: Money,
    pub commission_paid: bool,
    pub commission_paid_at: Option<DateTime<Utc>>,
    pub payout_id: Option<String>,
}

impl PosTransaction {
    /// Committed once a split is cached, even when the fee itself is zero
    /// (0% rate): the barber's share is what gets paid out.
    pub fn commission_state(&self) -> CommissionState {
        if self.commission_paid {
            return CommissionState::Paid;
        }
        let computed = !(self.commission_amount.is_zero() && self.barber_amount.is_zero());
        match self.commission_rate {
            Some(_) if computed => CommissionState::Committed,
            _ => CommissionState::Uncommitted,
        }
    }
}

// =============================================================================
// Service Payments
// =============================================================================

/// Status of a booking payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

/// A payment for a booked service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePayment {
    pub id: String,
    pub barber_id: String,
    pub appointment_id: Option<String>,
    pub service_id: Option<String>,
    pub amount: Money,
    pub kind: TransactionKind,
    pub status: PaymentStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub commission_rate: Option<CommissionRate>,
    pub platform_fee: Money,
    pub barber_amount: Money,
    /// Set when the payment's barber amount has been paid out.
    pub payout_id: Option<String>,
}

impl ServicePayment {
    /// Returns true once the platform/barber split has been cached.
    pub fn is_split(&self) -> bool {
        self.commission_rate.is_some()
    }
}

// =============================================================================
// Payouts
// =============================================================================

/// The window a payout covers: `[start, end)` for one barber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutPeriod {
    pub barber_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PayoutPeriod {
    /// Creates a period, rejecting empty or inverted ranges.
    pub fn new(
        barber_id: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let barber_id = barber_id.into();
        crate::validation::validate_id("barber_id", &barber_id)?;
        if start >= end {
            return Err(CoreError::EmptyPeriod {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(PayoutPeriod {
            barber_id,
            start,
            end,
        })
    }

    /// Half-open containment: `start <= ts < end`.
    #[inline]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// Status of a persisted payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// A persisted payout run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: String,
    pub barber_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub service_amount: Money,
    pub retail_amount: Money,
    pub total_amount: Money,
    pub status: PayoutStatus,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_commission_type_parsing() {
        assert_eq!("service".parse::<CommissionType>().unwrap(), CommissionType::Service);
        assert_eq!("RETAIL".parse::<CommissionType>().unwrap(), CommissionType::Retail);
        assert_eq!(" pos ".parse::<CommissionType>().unwrap(), CommissionType::Pos);
        assert!(matches!(
            "tips".parse::<CommissionType>(),
            Err(CoreError::UnknownCommissionType(_))
        ));
    }

    #[test]
    fn test_commission_type_direction() {
        assert!(CommissionType::Service.is_platform_fee());
        assert!(CommissionType::Pos.is_platform_fee());
        assert!(!CommissionType::Retail.is_platform_fee());
    }

    #[test]
    fn test_rate_bounds() {
        assert!(CommissionRate::new(Decimal::new(30, 2)).is_ok());
        assert!(CommissionRate::new(Decimal::new(-1, 2)).is_err());
        assert!(CommissionRate::new(Decimal::new(11, 1)).is_err());
        assert!("0.15".parse::<CommissionRate>().is_ok());
        assert!("abc".parse::<CommissionRate>().is_err());
    }

    #[test]
    fn test_rate_serde_rejects_out_of_range() {
        let ok: CommissionRate = serde_json::from_str("\"0.25\"").unwrap();
        assert_eq!(ok.value(), Decimal::new(25, 2));
        assert!(serde_json::from_str::<CommissionRate>("\"1.25\"").is_err());
    }

    #[test]
    fn test_commission_state() {
        let rate = CommissionRate::new(Decimal::new(15, 2)).ok();
        assert_eq!(
            CommissionState::of(Money::zero(), rate, false),
            CommissionState::Uncommitted
        );
        assert_eq!(
            CommissionState::of(Money::from_cents(683), CommissionRate::new(Decimal::ZERO).ok(), false),
            CommissionState::Uncommitted
        );
        assert_eq!(
            CommissionState::of(Money::from_cents(683), rate, false),
            CommissionState::Committed
        );
        assert_eq!(
            CommissionState::of(Money::from_cents(683), rate, true),
            CommissionState::Paid
        );
    }

    #[test]
    fn test_payout_period_is_half_open() {
        let start = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap();
        let period = PayoutPeriod::new("b-1", start, end).unwrap();

        assert!(period.contains(start));
        assert!(period.contains(end - chrono::Duration::seconds(1)));
        assert!(!period.contains(end));
        assert!(PayoutPeriod::new("b-1", end, start).is_err());
        assert!(PayoutPeriod::new("", start, end).is_err());
    }
}
