//! # Validation Module
//!
//! Input validation for commission calculations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (order / payout subsystem)                            │
//! │  └── Passes amounts it believes are settled                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── amount >= 0                                                        │
//! │  ├── 0 <= rate <= 1                                                     │
//! │  └── quantity >= 1                                                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite CHECK constraints)                          │
//! │                                                                         │
//! │  A failure here is a hard error: no commission is ever silently 0.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use clipper_core::money::Money;
//! use clipper_core::validation::validate_amount;
//!
//! assert!(validate_amount("amount", Money::from_cents(100)).is_ok());
//! assert!(validate_amount("amount", Money::from_cents(-1)).is_err());
//! ```

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::money::Money;
use crate::MAX_AMOUNT_CENTS;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a monetary amount.
///
/// ## Rules
/// - Must be non-negative (zero is allowed: free services, comped items)
/// - Must not exceed `MAX_AMOUNT_CENTS`
pub fn validate_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::Negative {
            field: field.to_string(),
            value: amount.amount().to_string(),
        });
    }

    let max = Money::from_cents(MAX_AMOUNT_CENTS);
    if amount > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: "0".to_string(),
            max: max.amount().to_string(),
            value: amount.amount().to_string(),
        });
    }

    Ok(())
}

/// Validates a raw commission rate fraction.
///
/// ## Rules
/// - Must be within `[0, 1]` inclusive
///
/// ## Example
/// ```rust
/// use rust_decimal::Decimal;
/// use clipper_core::validation::validate_rate;
///
/// assert!(validate_rate(Decimal::new(30, 2)).is_ok());  // 0.30
/// assert!(validate_rate(Decimal::ONE).is_ok());         // 1.00
/// assert!(validate_rate(Decimal::new(101, 2)).is_err()); // 1.01
/// ```
pub fn validate_rate(rate: Decimal) -> ValidationResult<()> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(ValidationError::OutOfRange {
            field: "rate".to_string(),
            min: "0".to_string(),
            max: "1".to_string(),
            value: rate.to_string(),
        });
    }

    Ok(())
}

/// Validates a line quantity.
pub fn validate_quantity(qty: u32) -> ValidationResult<()> {
    if qty == 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    Ok(())
}

/// Validates an identifier is present.
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount("amount", Money::zero()).is_ok());
        assert!(validate_amount("amount", Money::from_cents(4550)).is_ok());
        assert!(validate_amount("amount", Money::from_cents(-1)).is_err());
        assert!(validate_amount("amount", Money::from_cents(MAX_AMOUNT_CENTS + 1)).is_err());
    }

    #[test]
    fn test_validate_rate_bounds_inclusive() {
        assert!(validate_rate(Decimal::ZERO).is_ok());
        assert!(validate_rate(Decimal::ONE).is_ok());
        assert!(validate_rate(Decimal::new(-1, 2)).is_err());
        assert!(validate_rate(Decimal::new(10001, 4)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("barber_id", "b-1").is_ok());
        assert!(validate_id("barber_id", "  ").is_err());
    }
}
