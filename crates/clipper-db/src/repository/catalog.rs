//! # Catalog Repository
//!
//! Services, per-barber service prices and the pricing rules that adjust
//! them.
//!
//! ## Rule Storage
//! ```text
//! condition_type   day_of_week | start_time | end_time | start_date | end_date
//! ─────────────    ─────────── ─ ────────── ─ ──────── ─ ────────── ─ ────────
//! day_of_week      0..=6         NULL         NULL       NULL         NULL
//! time_of_day      NULL          HH:MM:SS     HH:MM:SS   NULL         NULL
//! date_range       NULL          NULL         NULL       YYYY-MM-DD   YYYY-MM-DD
//!
//! adjustment_value is a decimal string: percent for `percentage`,
//! dollars for `fixed` and `set_price`.
//! ```
//!
//! Rules load in insertion order. The engine's sort is stable, so equal
//! priorities resolve to whichever rule was stored first.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Utc};
use clipper_core::pricing::{PriceAdjustment, PricingRule, RuleCondition, Service};
use clipper_core::Money;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult, ServiceResult};

const TABLE: &str = "pricing_rules";

#[derive(Debug, sqlx::FromRow)]
struct ServiceRow {
    id: String,
    name: String,
    base_price_cents: i64,
    is_active: bool,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Service {
            id: row.id,
            name: row.name,
            base_price: Money::from_cents(row.base_price_cents),
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RuleRow {
    id: String,
    service_id: String,
    condition_type: String,
    day_of_week: Option<i64>,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    adjustment_type: String,
    adjustment_value: String,
    priority: i32,
    is_active: bool,
}

fn missing(column: &str, id: &str) -> DbError {
    DbError::invalid_data(TABLE, format!("rule {} has no {}", id, column))
}

impl TryFrom<RuleRow> for PricingRule {
    type Error = DbError;

    fn try_from(row: RuleRow) -> DbResult<Self> {
        let condition = match row.condition_type.as_str() {
            "day_of_week" => {
                let day = row.day_of_week.ok_or_else(|| missing("day_of_week", &row.id))?;
                let day = u8::try_from(day)
                    .map_err(|_| DbError::invalid_data(TABLE, format!("day_of_week {}", day)))?;
                RuleCondition::DayOfWeek { day }
            }
            "time_of_day" => RuleCondition::TimeOfDay {
                start: row.start_time.ok_or_else(|| missing("start_time", &row.id))?,
                end: row.end_time.ok_or_else(|| missing("end_time", &row.id))?,
            },
            "date_range" => RuleCondition::DateRange {
                start: row.start_date.ok_or_else(|| missing("start_date", &row.id))?,
                end: row.end_date.ok_or_else(|| missing("end_date", &row.id))?,
            },
            other => {
                return Err(DbError::invalid_data(
                    TABLE,
                    format!("unknown condition_type '{}'", other),
                ))
            }
        };

        let value = Decimal::from_str(&row.adjustment_value).map_err(|e| {
            DbError::invalid_data(
                TABLE,
                format!("adjustment_value '{}': {}", row.adjustment_value, e),
            )
        })?;

        let adjustment = match row.adjustment_type.as_str() {
            "percentage" => PriceAdjustment::Percentage(value),
            "fixed" => PriceAdjustment::Fixed(Money::new(value)),
            "set_price" => PriceAdjustment::SetPrice(Money::new(value)),
            other => {
                return Err(DbError::invalid_data(
                    TABLE,
                    format!("unknown adjustment_type '{}'", other),
                ))
            }
        };

        Ok(PricingRule {
            id: row.id,
            service_id: row.service_id,
            condition,
            adjustment,
            priority: row.priority,
            is_active: row.is_active,
        })
    }
}

fn adjustment_value(adjustment: &PriceAdjustment) -> String {
    match adjustment {
        PriceAdjustment::Percentage(percent) => percent.normalize().to_string(),
        PriceAdjustment::Fixed(amount) | PriceAdjustment::SetPrice(amount) => {
            amount.amount().to_string()
        }
    }
}

/// Repository for the service catalog and its pricing rules.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // =========================================================================
    // Services
    // =========================================================================

    /// Inserts a service.
    pub async fn insert_service(&self, service: &Service) -> DbResult<()> {
        debug!(id = %service.id, name = %service.name, "Inserting service");

        sqlx::query(
            r#"
            INSERT INTO services (id, name, base_price_cents, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&service.id)
        .bind(&service.name)
        .bind(service.base_price.to_cents())
        .bind(service.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a service by ID.
    pub async fn get_service(&self, id: &str) -> DbResult<Option<Service>> {
        let row = sqlx::query_as::<_, ServiceRow>(
            "SELECT id, name, base_price_cents, is_active FROM services WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Service::from))
    }

    // =========================================================================
    // Barber Prices
    // =========================================================================

    /// Sets (or replaces) a barber's own price for a service.
    pub async fn set_barber_price(
        &self,
        barber_id: &str,
        service_id: &str,
        price: Money,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO barber_service_prices (barber_id, service_id, price_cents)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (barber_id, service_id) DO UPDATE SET price_cents = excluded.price_cents
            "#,
        )
        .bind(barber_id)
        .bind(service_id)
        .bind(price.to_cents())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// A barber's own price for a service, if one is set.
    pub async fn barber_price(&self, barber_id: &str, service_id: &str) -> DbResult<Option<Money>> {
        let cents: Option<i64> = sqlx::query_scalar(
            "SELECT price_cents FROM barber_service_prices WHERE barber_id = ?1 AND service_id = ?2",
        )
        .bind(barber_id)
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(cents.map(Money::from_cents))
    }

    // =========================================================================
    // Pricing Rules
    // =========================================================================

    /// Validates and inserts a pricing rule.
    pub async fn insert_rule(&self, rule: &PricingRule) -> ServiceResult<()> {
        rule.validate()?;
        debug!(id = %rule.id, service_id = %rule.service_id, condition = rule.condition.kind(), "Inserting pricing rule");

        let (day, start_time, end_time, start_date, end_date) = match &rule.condition {
            RuleCondition::DayOfWeek { day } => (Some(i64::from(*day)), None, None, None, None),
            RuleCondition::TimeOfDay { start, end } => (None, Some(*start), Some(*end), None, None),
            RuleCondition::DateRange { start, end } => (None, None, None, Some(*start), Some(*end)),
        };

        sqlx::query(
            r#"
            INSERT INTO pricing_rules (
                id, service_id, condition_type,
                day_of_week, start_time, end_time, start_date, end_date,
                adjustment_type, adjustment_value, priority, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&rule.id)
        .bind(&rule.service_id)
        .bind(rule.condition.kind())
        .bind(day)
        .bind(start_time)
        .bind(end_time)
        .bind(start_date)
        .bind(end_date)
        .bind(rule.adjustment.kind())
        .bind(adjustment_value(&rule.adjustment))
        .bind(rule.priority)
        .bind(rule.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(())
    }

    /// Active rules of a service in storage order.
    pub async fn rules_for_service(&self, service_id: &str) -> DbResult<Vec<PricingRule>> {
        let rows = sqlx::query_as::<_, RuleRow>(
            r#"
            SELECT
                id, service_id, condition_type,
                day_of_week, start_time, end_time, start_date, end_date,
                adjustment_type, adjustment_value, priority, is_active
            FROM pricing_rules
            WHERE service_id = ?1 AND is_active = 1
            ORDER BY rowid
            "#,
        )
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PricingRule::try_from).collect()
    }
}
