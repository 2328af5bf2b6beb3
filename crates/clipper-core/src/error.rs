//! # Error Types
//!
//! Domain-specific error types for clipper-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  clipper-core errors (this file)                                       │
//! │  ├── CoreError        - Commission / payout rule violations            │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  clipper-db errors (separate crate)                                    │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── ServiceError     - What callers of the services see               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServiceError::InvalidInput        │
//! │        sqlx::Error     → DbError   → ServiceError::Persistence         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Invalid input is a hard failure, never a silent zero commission
//! 2. Include context in error messages (ids, values)
//! 3. A missing rate override is NOT an error (see `rate` module)

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// Every variant here indicates a caller bug or corrupted upstream data.
/// None of them are retried.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Amount, rate, quantity or type failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// Commission type name is not one of service / retail / pos.
    #[error("Unknown commission type: '{0}'")]
    UnknownCommissionType(String),

    /// The record is not in a state that allows commission calculation.
    ///
    /// ## When This Occurs
    /// - Calculating commissions for an order that is not paid yet
    /// - Settling a service payment that has not completed
    #[error("{entity} {id} is {status}, expected {expected}")]
    InvalidState {
        entity: String,
        id: String,
        status: String,
        expected: String,
    },

    /// A payable entry was handed to the accumulator for a different barber.
    #[error("Entry {entry_id} belongs to barber {actual}, not {expected}")]
    BarberMismatch {
        entry_id: String,
        expected: String,
        actual: String,
    },

    /// Payout period end is not after its start.
    #[error("Payout period is empty: start {start} is not before end {end}")]
    EmptyPeriod { start: String, end: String },
}

impl CoreError {
    /// Returns true when the error is an input validation failure.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidInput(_) | CoreError::UnknownCommissionType(_)
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative, got {value}")]
    Negative { field: String, value: String },

    /// Value is outside its allowed range.
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        min: String,
        max: String,
        value: String,
    },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., unparsable decimal or time).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
