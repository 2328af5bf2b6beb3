//! # Service Pricing Rules
//!
//! Applies calendar-based price adjustments to a service before it is
//! charged. The resulting price is what later reaches the commission layer.
//!
//! ## Evaluation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  start price = barber override price  OR  service base price            │
//! │                                                                         │
//! │  no booking date or no booking time?  ──► return start price            │
//! │                                                                         │
//! │  active rules, priority DESC (ties keep storage order)                  │
//! │     │                                                                   │
//! │     ├── DayOfWeek(d)       weekday == d        (Monday = 0)             │
//! │     ├── TimeOfDay(s, e)    s <= time <= e                               │
//! │     └── DateRange(s, e)    s <= date <= e                               │
//! │                                                                         │
//! │  FIRST matching rule adjusts the price, then evaluation STOPS.          │
//! │  Rules never stack.                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use chrono::{NaiveDate, NaiveTime};
//! use clipper_core::money::Money;
//! use clipper_core::pricing::{
//!     BookingContext, PriceAdjustment, PricingRule, PricingRuleEngine, RuleCondition, Service,
//! };
//!
//! let service = Service::new("svc-1", "Skin Fade", Money::from_cents(4000));
//! let saturday = PricingRule::new(
//!     "rule-1",
//!     "svc-1",
//!     RuleCondition::DayOfWeek { day: 5 },
//!     PriceAdjustment::Percentage("25".parse().unwrap()),
//!     10,
//! );
//!
//! let booking = BookingContext::new(
//!     NaiveDate::from_ymd_opt(2024, 6, 8).unwrap(), // a Saturday
//!     NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
//! );
//! let quote = PricingRuleEngine::new()
//!     .calculate_price(&service, None, &[saturday], Some(&booking));
//!
//! assert_eq!(quote.price, Money::from_cents(5000));
//! ```

use chrono::{Datelike, NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::validation::{validate_amount, validate_id};

// =============================================================================
// Services
// =============================================================================

/// A bookable service and its list price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub base_price: Money,
    pub is_active: bool,
}

impl Service {
    pub fn new(id: impl Into<String>, name: impl Into<String>, base_price: Money) -> Self {
        Service {
            id: id.into(),
            name: name.into(),
            base_price,
            is_active: true,
        }
    }
}

// =============================================================================
// Rules
// =============================================================================

/// When a rule applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    /// `day` counts from Monday = 0 to Sunday = 6.
    DayOfWeek { day: u8 },
    /// Both bounds inclusive.
    TimeOfDay { start: NaiveTime, end: NaiveTime },
    /// Both bounds inclusive.
    DateRange { start: NaiveDate, end: NaiveDate },
}

impl RuleCondition {
    pub fn kind(&self) -> &'static str {
        match self {
            RuleCondition::DayOfWeek { .. } => "day_of_week",
            RuleCondition::TimeOfDay { .. } => "time_of_day",
            RuleCondition::DateRange { .. } => "date_range",
        }
    }

    pub fn matches(&self, booking: &BookingContext) -> bool {
        match self {
            RuleCondition::DayOfWeek { day } => {
                booking.date.weekday().num_days_from_monday() == u32::from(*day)
            }
            RuleCondition::TimeOfDay { start, end } => *start <= booking.time && booking.time <= *end,
            RuleCondition::DateRange { start, end } => *start <= booking.date && booking.date <= *end,
        }
    }
}

/// How a matching rule changes the price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PriceAdjustment {
    /// Percent change: `20` is a 20% surcharge, `-15` a 15% discount.
    Percentage(Decimal),
    /// Signed amount added to the price.
    Fixed(Money),
    /// Replaces the price outright.
    SetPrice(Money),
}

impl PriceAdjustment {
    pub fn kind(&self) -> &'static str {
        match self {
            PriceAdjustment::Percentage(_) => "percentage",
            PriceAdjustment::Fixed(_) => "fixed",
            PriceAdjustment::SetPrice(_) => "set_price",
        }
    }

    /// Applies the adjustment. The result is rounded half-up to cents and
    /// never negative.
    pub fn apply(&self, price: Money) -> Money {
        let adjusted = match self {
            PriceAdjustment::Percentage(percent) => {
                Money::new(price.amount() * (Decimal::ONE_HUNDRED + *percent) / Decimal::ONE_HUNDRED)
            }
            PriceAdjustment::Fixed(delta) => price + *delta,
            PriceAdjustment::SetPrice(value) => *value,
        };
        adjusted.round_half_up().max(Money::zero())
    }
}

/// A conditional price adjustment for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: String,
    pub service_id: String,
    pub condition: RuleCondition,
    pub adjustment: PriceAdjustment,
    /// Higher wins.
    pub priority: i32,
    pub is_active: bool,
}

impl PricingRule {
    pub fn new(
        id: impl Into<String>,
        service_id: impl Into<String>,
        condition: RuleCondition,
        adjustment: PriceAdjustment,
        priority: i32,
    ) -> Self {
        PricingRule {
            id: id.into(),
            service_id: service_id.into(),
            condition,
            adjustment,
            priority,
            is_active: true,
        }
    }

    /// Checks the rule can ever make sense before it is stored.
    pub fn validate(&self) -> CoreResult<()> {
        validate_id("service_id", &self.service_id)?;

        match &self.condition {
            RuleCondition::DayOfWeek { day } if *day > 6 => {
                return Err(ValidationError::OutOfRange {
                    field: "day_of_week".to_string(),
                    min: "0".to_string(),
                    max: "6".to_string(),
                    value: day.to_string(),
                }
                .into());
            }
            RuleCondition::TimeOfDay { start, end } if start > end => {
                return Err(ValidationError::InvalidFormat {
                    field: "time_of_day".to_string(),
                    reason: format!("start {} is after end {}", start, end),
                }
                .into());
            }
            RuleCondition::DateRange { start, end } if start > end => {
                return Err(ValidationError::InvalidFormat {
                    field: "date_range".to_string(),
                    reason: format!("start {} is after end {}", start, end),
                }
                .into());
            }
            _ => {}
        }

        match &self.adjustment {
            PriceAdjustment::Percentage(p) if *p < -Decimal::ONE_HUNDRED => {
                Err(ValidationError::OutOfRange {
                    field: "percentage".to_string(),
                    min: "-100".to_string(),
                    max: "unbounded".to_string(),
                    value: p.to_string(),
                }
                .into())
            }
            PriceAdjustment::SetPrice(value) => Ok(validate_amount("set_price", *value)?),
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Booking date and time in the shop's local calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingContext {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl BookingContext {
    pub fn new(date: NaiveDate, time: NaiveTime) -> Self {
        BookingContext { date, time }
    }

    /// Both parts are needed; either one missing means no context.
    pub fn from_parts(date: Option<NaiveDate>, time: Option<NaiveTime>) -> Option<Self> {
        Some(BookingContext::new(date?, time?))
    }
}

/// A computed price and how it was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub service_id: String,
    /// Override or base price, before rules.
    pub starting_price: Money,
    pub price: Money,
    pub used_barber_price: bool,
    pub applied_rule_id: Option<String>,
}

/// Stateless pricing rule evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct PricingRuleEngine;

impl PricingRuleEngine {
    pub fn new() -> Self {
        PricingRuleEngine
    }

    /// Prices `service` for a booking.
    ///
    /// ## Arguments
    /// * `barber_price` - the barber's own price for the service, if any
    /// * `rules` - candidate rules in storage order; rules for other
    ///   services and inactive rules are ignored
    /// * `booking` - `None` skips rule evaluation entirely
    pub fn calculate_price(
        &self,
        service: &Service,
        barber_price: Option<Money>,
        rules: &[PricingRule],
        booking: Option<&BookingContext>,
    ) -> PriceQuote {
        let starting_price = barber_price.unwrap_or(service.base_price);

        let mut quote = PriceQuote {
            service_id: service.id.clone(),
            starting_price,
            price: starting_price,
            used_barber_price: barber_price.is_some(),
            applied_rule_id: None,
        };

        let Some(booking) = booking else {
            return quote;
        };

        let mut candidates: Vec<&PricingRule> = rules
            .iter()
            .filter(|r| r.is_active && r.service_id == service.id)
            .collect();
        // sort_by is stable: equal priorities keep storage order.
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority));

        if let Some(rule) = candidates.into_iter().find(|r| r.condition.matches(booking)) {
            quote.price = rule.adjustment.apply(starting_price);
            quote.applied_rule_id = Some(rule.id.clone());
        }

        quote
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn service() -> Service {
        Service::new("svc-1", "Classic Cut", money("30.00"))
    }

    // 2024-06-07 is a Friday.
    fn friday_evening() -> BookingContext {
        BookingContext::new(date(2024, 6, 7), time(18, 30))
    }

    #[test]
    fn test_only_highest_priority_rule_applies() {
        let rules = vec![
            PricingRule::new(
                "low",
                "svc-1",
                RuleCondition::DayOfWeek { day: 4 },
                PriceAdjustment::Fixed(money("5.00")),
                5,
            ),
            PricingRule::new(
                "high",
                "svc-1",
                RuleCondition::TimeOfDay { start: time(17, 0), end: time(20, 0) },
                PriceAdjustment::Percentage(Decimal::new(10, 0)),
                10,
            ),
        ];

        let quote = PricingRuleEngine::new().calculate_price(&service(), None, &rules, Some(&friday_evening()));
        assert_eq!(quote.applied_rule_id.as_deref(), Some("high"));
        assert_eq!(quote.price, money("33.00"));
    }

    #[test]
    fn test_equal_priority_keeps_storage_order() {
        let rules = vec![
            PricingRule::new("first", "svc-1", RuleCondition::DayOfWeek { day: 4 }, PriceAdjustment::SetPrice(money("25.00")), 1),
            PricingRule::new("second", "svc-1", RuleCondition::DayOfWeek { day: 4 }, PriceAdjustment::SetPrice(money("20.00")), 1),
        ];
        let quote = PricingRuleEngine::new().calculate_price(&service(), None, &rules, Some(&friday_evening()));
        assert_eq!(quote.applied_rule_id.as_deref(), Some("first"));
        assert_eq!(quote.price, money("25.00"));
    }

    #[test]
    fn test_barber_price_is_starting_point() {
        let rules = vec![PricingRule::new(
            "pct",
            "svc-1",
            RuleCondition::DateRange { start: date(2024, 6, 1), end: date(2024, 6, 7) },
            PriceAdjustment::Percentage(Decimal::new(-15, 0)),
            1,
        )];

        let quote = PricingRuleEngine::new().calculate_price(
            &service(),
            Some(money("45.50")),
            &rules,
            Some(&friday_evening()),
        );
        assert!(quote.used_barber_price);
        // 45.50 × 0.85 = 38.675
        assert_eq!(quote.price, money("38.68"));
    }

    #[test]
    fn test_missing_context_skips_rules() {
        let rules = vec![PricingRule::new(
            "any",
            "svc-1",
            RuleCondition::DayOfWeek { day: 4 },
            PriceAdjustment::SetPrice(money("1.00")),
            1,
        )];

        assert_eq!(BookingContext::from_parts(Some(date(2024, 6, 7)), None), None);
        let quote = PricingRuleEngine::new().calculate_price(&service(), None, &rules, None);
        assert_eq!(quote.price, money("30.00"));
        assert_eq!(quote.applied_rule_id, None);
    }

    #[test]
    fn test_inactive_and_foreign_rules_ignored() {
        let mut inactive = PricingRule::new("off", "svc-1", RuleCondition::DayOfWeek { day: 4 }, PriceAdjustment::SetPrice(money("1.00")), 99);
        inactive.is_active = false;
        let foreign = PricingRule::new("other", "svc-2", RuleCondition::DayOfWeek { day: 4 }, PriceAdjustment::SetPrice(money("2.00")), 50);

        let quote = PricingRuleEngine::new().calculate_price(&service(), None, &[inactive, foreign], Some(&friday_evening()));
        assert_eq!(quote.price, money("30.00"));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let edge = BookingContext::new(date(2024, 6, 7), time(17, 0));
        assert!(RuleCondition::TimeOfDay { start: time(17, 0), end: time(20, 0) }.matches(&edge));
        assert!(RuleCondition::DateRange { start: date(2024, 6, 7), end: date(2024, 6, 7) }.matches(&edge));
        assert!(!RuleCondition::DayOfWeek { day: 0 }.matches(&edge));
    }

    #[test]
    fn test_adjustment_floors_at_zero() {
        assert_eq!(PriceAdjustment::Fixed(money("-50.00")).apply(money("30.00")), Money::zero());
        assert_eq!(PriceAdjustment::Percentage(Decimal::new(-100, 0)).apply(money("30.00")), Money::zero());
    }

    #[test]
    fn test_rule_validation() {
        let bad_day = PricingRule::new("r", "svc-1", RuleCondition::DayOfWeek { day: 7 }, PriceAdjustment::Fixed(money("1")), 1);
        assert!(bad_day.validate().is_err());

        let inverted = PricingRule::new(
            "r",
            "svc-1",
            RuleCondition::TimeOfDay { start: time(20, 0), end: time(8, 0) },
            PriceAdjustment::Fixed(money("1")),
            1,
        );
        assert!(inverted.validate().is_err());

        let ok = PricingRule::new("r", "svc-1", RuleCondition::DayOfWeek { day: 6 }, PriceAdjustment::SetPrice(money("20")), 1);
        assert!(ok.validate().is_ok());
    }
}
