//! # Payout Repository
//!
//! Persisted payout runs. A payout row is written in the same transaction
//! that claims the entries it pays, so a payout never exists without them.

use chrono::{DateTime, Utc};
use clipper_core::{Money, Payout, PayoutStatus};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

#[derive(Debug, sqlx::FromRow)]
struct PayoutRow {
    id: String,
    barber_id: String,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    service_amount_cents: i64,
    retail_amount_cents: i64,
    total_amount_cents: i64,
    status: PayoutStatus,
    created_at: DateTime<Utc>,
}

impl From<PayoutRow> for Payout {
    fn from(row: PayoutRow) -> Self {
        Payout {
            id: row.id,
            barber_id: row.barber_id,
            period_start: row.period_start,
            period_end: row.period_end,
            service_amount: Money::from_cents(row.service_amount_cents),
            retail_amount: Money::from_cents(row.retail_amount_cents),
            total_amount: Money::from_cents(row.total_amount_cents),
            status: row.status,
            created_at: row.created_at,
        }
    }
}

/// Repository for payouts.
#[derive(Debug, Clone)]
pub struct PayoutRepository {
    pool: SqlitePool,
}

impl PayoutRepository {
    /// Creates a new PayoutRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PayoutRepository { pool }
    }

    /// Inserts a payout on a caller-provided connection.
    pub async fn insert_in(conn: &mut SqliteConnection, payout: &Payout) -> DbResult<()> {
        debug!(id = %payout.id, barber_id = %payout.barber_id, total = %payout.total_amount, "Inserting payout");

        sqlx::query(
            r#"
            INSERT INTO payouts (
                id, barber_id, period_start, period_end,
                service_amount_cents, retail_amount_cents, total_amount_cents,
                status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&payout.id)
        .bind(&payout.barber_id)
        .bind(payout.period_start)
        .bind(payout.period_end)
        .bind(payout.service_amount.to_cents())
        .bind(payout.retail_amount.to_cents())
        .bind(payout.total_amount.to_cents())
        .bind(payout.status)
        .bind(payout.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Gets a payout by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Payout>> {
        let row = sqlx::query_as::<_, PayoutRow>(
            r#"
            SELECT
                id, barber_id, period_start, period_end,
                service_amount_cents, retail_amount_cents, total_amount_cents,
                status, created_at
            FROM payouts
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Payout::from))
    }

    /// Lists a barber's payouts, newest first.
    pub async fn list_for_barber(&self, barber_id: &str) -> DbResult<Vec<Payout>> {
        let rows = sqlx::query_as::<_, PayoutRow>(
            r#"
            SELECT
                id, barber_id, period_start, period_end,
                service_amount_cents, retail_amount_cents, total_amount_cents,
                status, created_at
            FROM payouts
            WHERE barber_id = ?1
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(barber_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Payout::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::barber::Barber;
    use chrono::Duration;

    #[tokio::test]
    async fn test_insert_and_list() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.barbers().insert(&Barber::new("barber-1", "Marcus")).await.unwrap();

        let now = Utc::now();
        let payout = Payout {
            id: "payout-1".to_string(),
            barber_id: "barber-1".to_string(),
            period_start: now - Duration::days(14),
            period_end: now,
            service_amount: Money::from_cents(7000),
            retail_amount: Money::from_cents(683),
            total_amount: Money::from_cents(7683),
            status: PayoutStatus::Pending,
            created_at: now,
        };

        let mut conn = db.pool().acquire().await.unwrap();
        PayoutRepository::insert_in(&mut conn, &payout).await.unwrap();
        drop(conn);

        let loaded = db.payouts().get_by_id("payout-1").await.unwrap().unwrap();
        assert_eq!(loaded.total_amount, Money::from_cents(7683));
        assert_eq!(loaded.status, PayoutStatus::Pending);

        let listed = db.payouts().list_for_barber("barber-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(db.payouts().list_for_barber("barber-2").await.unwrap().is_empty());
    }
}
