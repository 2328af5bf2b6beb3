//! # Repository Module
//!
//! Database repository implementations for Clipper.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Service / CLI                                                         │
//! │       │                                                                 │
//! │       │  db.orders().get_order("order-1")           (pool, reads)      │
//! │       │  OrderRepository::items_in(&mut tx, ...)    (inside a tx)      │
//! │       ▼                                                                 │
//! │  XxxRepository                                                         │
//! │  ├── Row structs (#[derive(FromRow)]), cents and TEXT rates            │
//! │  └── TryFrom<Row> for the clipper-core domain type                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Methods taking `&self` use the pool. Associated functions ending in `_in`
//! take a connection so the services can run them inside one transaction.
//!
//! ## Available Repositories
//!
//! - [`BarberRepository`](barber::BarberRepository) - Barbers
//! - [`RateRepository`](rate::RateRepository) - Commission rate overrides
//! - [`OrderRepository`](order::OrderRepository) - Orders and order lines
//! - [`PosRepository`](pos::PosRepository) - POS transactions
//! - [`ServicePaymentRepository`](payment::ServicePaymentRepository) - Booking payments
//! - [`PayoutRepository`](payout::PayoutRepository) - Payout runs
//! - [`CatalogRepository`](catalog::CatalogRepository) - Services, barber prices, pricing rules
//! - [`AuditLogRepository`](audit::AuditLogRepository) - Commission audit log

pub mod audit;
pub mod barber;
pub mod catalog;
pub mod order;
pub mod payment;
pub mod payout;
pub mod pos;
pub mod rate;

use chrono::{DateTime, Utc};
use clipper_core::payout::{PayableEntry, PayableSource};
use clipper_core::{CommissionRate, Money};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// Generates a new record id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Parses a stored TEXT rate column.
pub(crate) fn parse_rate_text(table: &str, text: &str) -> DbResult<CommissionRate> {
    text.parse::<CommissionRate>()
        .map_err(|e| DbError::invalid_data(table, format!("rate '{}': {}", text, e)))
}

/// Parses a nullable TEXT rate column.
pub(crate) fn parse_rate(table: &str, raw: Option<&str>) -> DbResult<Option<CommissionRate>> {
    raw.map(|text| parse_rate_text(table, text)).transpose()
}

/// Common projection of the payable-entry queries.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PayableRow {
    id: String,
    barber_id: String,
    amount_cents: i64,
    settled_at: DateTime<Utc>,
    paid: bool,
}

impl PayableRow {
    pub(crate) fn into_entry(self, source: PayableSource) -> PayableEntry {
        PayableEntry {
            id: self.id,
            barber_id: self.barber_id,
            source,
            amount: Money::from_cents(self.amount_cents),
            settled_at: self.settled_at,
            paid: self.paid,
        }
    }
}

/// Builds `?, ?, ?` for an `IN (...)` list of `n` binds.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("t", None).unwrap(), None);
        assert_eq!(
            parse_rate("t", Some("0.15")).unwrap(),
            Some("0.15".parse().unwrap())
        );
        assert!(parse_rate("t", Some("1.5")).is_err());
        assert!(parse_rate("t", Some("abc")).is_err());
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
