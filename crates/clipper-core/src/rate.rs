//! # Rate Resolution
//!
//! Picks the commission rate that applies to a barber, commission type and
//! optional product / location.
//!
//! ## Precedence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Most specific wins, first match stops the search                       │
//! │                                                                         │
//! │  1. (barber, type, product, location)   ProductAtLocation              │
//! │  2. (barber, type, location)            Location                        │
//! │  3. (barber, type, product)             Product                         │
//! │  4. (barber, type)                      BarberDefault                   │
//! │  5. system default for type             SystemDefault  ← always hits    │
//! │                                                                         │
//! │  Resolution never fails for lack of configuration.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use clipper_core::money::Money;
//! use clipper_core::rate::{RateDefaults, RateQuery, RateResolver, RateSource};
//! use clipper_core::CommissionType;
//!
//! let resolver = RateResolver::new(RateDefaults::default());
//! let query = RateQuery::new("barber-1", CommissionType::Service, Money::from_cents(10000));
//! let resolved = resolver.resolve(&[], &query).unwrap();
//!
//! assert_eq!(resolved.source, RateSource::SystemDefault);
//! assert_eq!(resolved.rate.to_string(), "0.3");
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::money::Money;
use crate::types::{CommissionRate, CommissionType};
use crate::validation::{validate_amount, validate_id};

// =============================================================================
// System Defaults
// =============================================================================

/// System-wide default rates, one per commission type.
///
/// This is the ONLY place default rates live. Call sites never carry their
/// own fallback numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateDefaults {
    /// Platform share of service payments.
    #[serde(default = "default_service_rate")]
    pub service: CommissionRate,

    /// Barber share of retail order lines.
    #[serde(default = "default_retail_rate")]
    pub retail: CommissionRate,

    /// Platform share of POS transactions.
    #[serde(default = "default_pos_rate")]
    pub pos: CommissionRate,
}

fn default_service_rate() -> CommissionRate {
    CommissionRate::new(Decimal::new(30, 2)).unwrap_or(CommissionRate::ZERO)
}

fn default_retail_rate() -> CommissionRate {
    CommissionRate::new(Decimal::new(10, 2)).unwrap_or(CommissionRate::ZERO)
}

fn default_pos_rate() -> CommissionRate {
    CommissionRate::new(Decimal::new(30, 2)).unwrap_or(CommissionRate::ZERO)
}

impl Default for RateDefaults {
    fn default() -> Self {
        RateDefaults {
            service: default_service_rate(),
            retail: default_retail_rate(),
            pos: default_pos_rate(),
        }
    }
}

impl RateDefaults {
    /// Returns the default for a commission type.
    pub fn for_type(&self, commission_type: CommissionType) -> CommissionRate {
        match commission_type {
            CommissionType::Service => self.service,
            CommissionType::Retail => self.retail,
            CommissionType::Pos => self.pos,
        }
    }
}

// =============================================================================
// Overrides
// =============================================================================

/// A configured rate for one barber and commission type, optionally
/// narrowed to a product and/or a location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateOverride {
    pub id: String,
    pub barber_id: String,
    pub commission_type: CommissionType,
    pub product_id: Option<String>,
    pub location_id: Option<String>,
    pub rate: CommissionRate,
    pub is_active: bool,
}

/// Which precedence level produced a resolved rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    ProductAtLocation,
    Location,
    Product,
    BarberDefault,
    SystemDefault,
}

impl RateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateSource::ProductAtLocation => "product_at_location",
            RateSource::Location => "location",
            RateSource::Product => "product",
            RateSource::BarberDefault => "barber_default",
            RateSource::SystemDefault => "system_default",
        }
    }
}

/// Inputs of a rate lookup.
#[derive(Debug, Clone)]
pub struct RateQuery<'a> {
    pub barber_id: &'a str,
    pub commission_type: CommissionType,
    pub amount: Money,
    pub product_id: Option<&'a str>,
    pub location_id: Option<&'a str>,
}

impl<'a> RateQuery<'a> {
    pub fn new(barber_id: &'a str, commission_type: CommissionType, amount: Money) -> Self {
        RateQuery {
            barber_id,
            commission_type,
            amount,
            product_id: None,
            location_id: None,
        }
    }

    pub fn product(mut self, product_id: Option<&'a str>) -> Self {
        self.product_id = product_id;
        self
    }

    pub fn location(mut self, location_id: Option<&'a str>) -> Self {
        self.location_id = location_id;
        self
    }
}

/// The outcome of a lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRate {
    pub rate: CommissionRate,
    pub source: RateSource,
    /// The override that matched, absent for the system default.
    pub override_id: Option<String>,
}

impl ResolvedRate {
    /// True when no override matched.
    pub fn is_fallback(&self) -> bool {
        self.source == RateSource::SystemDefault
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolves commission rates against a set of candidate overrides.
///
/// The resolver does not fetch anything: the database layer loads the
/// barber's overrides and hands them in.
#[derive(Debug, Clone, Default)]
pub struct RateResolver {
    defaults: RateDefaults,
}

impl RateResolver {
    pub fn new(defaults: RateDefaults) -> Self {
        RateResolver { defaults }
    }

    pub fn defaults(&self) -> &RateDefaults {
        &self.defaults
    }

    /// Resolves the rate for `query`.
    ///
    /// ## Arguments
    /// * `overrides` - candidate overrides; inactive ones and ones for other
    ///   barbers or types are ignored. Within one precedence level the first
    ///   matching override in slice order wins.
    /// * `query` - barber, type, amount and optional narrowing keys
    ///
    /// ## Errors
    /// Only input validation: empty barber id or negative amount.
    pub fn resolve(&self, overrides: &[RateOverride], query: &RateQuery<'_>) -> CoreResult<ResolvedRate> {
        validate_id("barber_id", query.barber_id)?;
        validate_amount("amount", query.amount)?;

        let candidates: Vec<&RateOverride> = overrides
            .iter()
            .filter(|o| {
                o.is_active
                    && o.barber_id == query.barber_id
                    && o.commission_type == query.commission_type
            })
            .collect();

        let product = query.product_id;
        let location = query.location_id;

        let levels: [(RateSource, Option<&&RateOverride>); 4] = [
            (
                RateSource::ProductAtLocation,
                match (product, location) {
                    (Some(p), Some(l)) => candidates.iter().find(|o| {
                        o.product_id.as_deref() == Some(p) && o.location_id.as_deref() == Some(l)
                    }),
                    _ => None,
                },
            ),
            (
                RateSource::Location,
                location.and_then(|l| {
                    candidates
                        .iter()
                        .find(|o| o.product_id.is_none() && o.location_id.as_deref() == Some(l))
                }),
            ),
            (
                RateSource::Product,
                product.and_then(|p| {
                    candidates
                        .iter()
                        .find(|o| o.location_id.is_none() && o.product_id.as_deref() == Some(p))
                }),
            ),
            (
                RateSource::BarberDefault,
                candidates
                    .iter()
                    .find(|o| o.product_id.is_none() && o.location_id.is_none()),
            ),
        ];

        for (source, hit) in levels {
            if let Some(o) = hit {
                return Ok(ResolvedRate {
                    rate: o.rate,
                    source,
                    override_id: Some(o.id.clone()),
                });
            }
        }

        Ok(ResolvedRate {
            rate: self.defaults.for_type(query.commission_type),
            source: RateSource::SystemDefault,
            override_id: None,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
