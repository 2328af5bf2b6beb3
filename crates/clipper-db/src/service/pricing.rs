//! # Pricing Service
//!
//! Loads a service, the barber's own price and the service's rules, then
//! hands them to the [`PricingRuleEngine`].

use chrono::{NaiveDate, NaiveTime};
use clipper_core::pricing::{BookingContext, PriceQuote};
use clipper_core::PricingRuleEngine;
use tracing::debug;

use crate::error::{ServiceError, ServiceResult};
use crate::pool::Database;

#[derive(Clone)]
pub struct PricingService {
    db: Database,
    engine: PricingRuleEngine,
}

impl PricingService {
    pub fn new(db: Database) -> Self {
        PricingService {
            db,
            engine: PricingRuleEngine::new(),
        }
    }

    /// Prices a service for a booking.
    ///
    /// Without both a booking date and time the rules are skipped and the
    /// starting price comes back unchanged.
    pub async fn calculate_price(
        &self,
        service_id: &str,
        barber_id: Option<&str>,
        booking_date: Option<NaiveDate>,
        booking_time: Option<NaiveTime>,
    ) -> ServiceResult<PriceQuote> {
        let catalog = self.db.catalog();
        let service = catalog
            .get_service(service_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Service", service_id))?;

        let barber_price = match barber_id {
            Some(barber_id) => catalog.barber_price(barber_id, service_id).await?,
            None => None,
        };
        let rules = catalog.rules_for_service(service_id).await?;
        let booking = BookingContext::from_parts(booking_date, booking_time);

        let quote = self
            .engine
            .calculate_price(&service, barber_price, &rules, booking.as_ref());

        debug!(
            service_id,
            price = %quote.price,
            rule = quote.applied_rule_id.as_deref().unwrap_or("none"),
            "Service priced"
        );
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::repository::barber::Barber;
    use clipper_core::pricing::{PriceAdjustment, PricingRule, RuleCondition, Service};
    use clipper_core::Money;

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    async fn setup() -> (Database, PricingService) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.barbers().insert(&Barber::new("barber-1", "Marcus")).await.unwrap();
        let catalog = db.catalog();
        catalog
            .insert_service(&Service::new("svc-1", "Skin Fade", money("40.00")))
            .await
            .unwrap();
        catalog.set_barber_price("barber-1", "svc-1", money("50.00")).await.unwrap();

        // Saturday, two competing rules.
        catalog
            .insert_rule(&PricingRule::new(
                "weekend",
                "svc-1",
                RuleCondition::DayOfWeek { day: 5 },
                PriceAdjustment::Percentage("10".parse().unwrap()),
                5,
            ))
            .await
            .unwrap();
        catalog
            .insert_rule(&PricingRule::new(
                "premium",
                "svc-1",
                RuleCondition::DayOfWeek { day: 5 },
                PriceAdjustment::Fixed(money("15.00")),
                10,
            ))
            .await
            .unwrap();

        let service = PricingService::new(db.clone());
        (db, service)
    }

    #[tokio::test]
    async fn test_highest_priority_rule_only() {
        let (_db, service) = setup().await;
        let saturday = NaiveDate::from_ymd_opt(2024, 6, 8);
        let noon = NaiveTime::from_hms_opt(12, 0, 0);

        let quote = service
            .calculate_price("svc-1", Some("barber-1"), saturday, noon)
            .await
            .unwrap();
        assert!(quote.used_barber_price);
        assert_eq!(quote.price, money("65.00"));
        assert_eq!(quote.applied_rule_id.as_deref(), Some("premium"));
    }

    #[tokio::test]
    async fn test_missing_time_skips_rules() {
        let (_db, service) = setup().await;
        let saturday = NaiveDate::from_ymd_opt(2024, 6, 8);

        let quote = service.calculate_price("svc-1", None, saturday, None).await.unwrap();
        assert_eq!(quote.price, money("40.00"));
        assert!(quote.applied_rule_id.is_none());

        let err = service.calculate_price("svc-x", None, saturday, None).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }
}
