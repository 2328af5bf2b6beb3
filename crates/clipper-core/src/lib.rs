//! # clipper-core: Pure Commission Logic for Clipper
//!
//! This crate decides who gets paid what. It holds every commission and
//! payout rule as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Clipper Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Order / Payment / Payout subsystems, clipper CLI       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            clipper-db (services, repositories, audit)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ clipper-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   pricing ──► commission ──► order ──► payout                   │   │
//! │  │                   ▲                                             │   │
//! │  │                 rate                                            │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK READS IN *_at VARIANTS        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (CommissionType, OrderLineItem, PayoutPeriod, ...)
//! - [`money`] - Money type on fixed-point decimals with half-up rounding
//! - [`rate`] - RateResolver: override precedence and system defaults
//! - [`commission`] - CommissionCalculator: platform splits and retail commissions
//! - [`order`] - OrderAggregator: idempotent per-order commission caching
//! - [`payout`] - PayoutAccumulator: what a barber is owed for a period
//! - [`pricing`] - PricingRuleEngine: calendar-based service prices
//! - [`audit`] - Audit records and the sink trait
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input (and timestamp) = same output
//! 2. **No I/O**: storage, network and logging live in clipper-db
//! 3. **Decimal Money**: no floats anywhere near an amount
//! 4. **Explicit Errors**: invalid input fails loudly, never as a zero commission
//!
//! ## Example Usage
//!
//! ```rust
//! use clipper_core::commission::{CommissionCalculator, CommissionInput};
//! use clipper_core::{CommissionType, Money};
//!
//! let input = CommissionInput::new(
//!     CommissionType::Retail,
//!     Money::from_cents(4550),
//!     "0.15".parse().unwrap(),
//! );
//! let result = CommissionCalculator::default().calculate(&input).unwrap();
//!
//! // 45.50 × 0.15 = 6.825, half-up
//! assert_eq!(result.commission_amount().to_cents(), 683);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod commission;
pub mod error;
pub mod money;
pub mod order;
pub mod payout;
pub mod pricing;
pub mod rate;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use commission::{CommissionCalculator, CommissionInput, CommissionResult, MinimumFees};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use order::OrderAggregator;
pub use payout::{PayoutAccumulator, PayoutSummary};
pub use pricing::PricingRuleEngine;
pub use rate::{RateDefaults, RateResolver};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Largest single amount accepted anywhere, in cents ($1,000,000.00).
///
/// ## Business Reason
/// Catches unit mix-ups (cents passed as dollars) long before they reach a
/// payout.
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000;
