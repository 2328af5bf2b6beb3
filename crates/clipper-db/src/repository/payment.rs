//! # Service Payment Repository
//!
//! Booking payments. A payment is split into platform fee and barber share
//! once it completes; the barber share is paid out by attaching the payment
//! to a payout.

use chrono::{DateTime, Utc};
use clipper_core::payout::{PayableEntry, PayableSource};
use clipper_core::{
    CommissionRate, Money, PaymentStatus, PayoutPeriod, ServicePayment, TransactionKind,
};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::{parse_rate, placeholders, PayableRow};
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: String,
    barber_id: String,
    appointment_id: Option<String>,
    service_id: Option<String>,
    amount_cents: i64,
    transaction_type: TransactionKind,
    status: PaymentStatus,
    completed_at: Option<DateTime<Utc>>,
    commission_rate: Option<String>,
    platform_fee_cents: i64,
    barber_amount_cents: i64,
    payout_id: Option<String>,
}

impl TryFrom<PaymentRow> for ServicePayment {
    type Error = DbError;

    fn try_from(row: PaymentRow) -> DbResult<Self> {
        Ok(ServicePayment {
            commission_rate: parse_rate("service_payments", row.commission_rate.as_deref())?,
            id: row.id,
            barber_id: row.barber_id,
            appointment_id: row.appointment_id,
            service_id: row.service_id,
            amount: Money::from_cents(row.amount_cents),
            kind: row.transaction_type,
            status: row.status,
            completed_at: row.completed_at,
            platform_fee: Money::from_cents(row.platform_fee_cents),
            barber_amount: Money::from_cents(row.barber_amount_cents),
            payout_id: row.payout_id,
        })
    }
}

/// Repository for service payments.
#[derive(Debug, Clone)]
pub struct ServicePaymentRepository {
    pool: SqlitePool,
}

impl ServicePaymentRepository {
    /// Creates a new ServicePaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ServicePaymentRepository { pool }
    }

    /// Inserts a payment.
    pub async fn insert(&self, payment: &ServicePayment) -> DbResult<()> {
        debug!(id = %payment.id, barber_id = %payment.barber_id, amount = %payment.amount, "Inserting service payment");

        sqlx::query(
            r#"
            INSERT INTO service_payments (
                id, barber_id, appointment_id, service_id, amount_cents,
                transaction_type, status, completed_at,
                commission_rate, platform_fee_cents, barber_amount_cents, payout_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.barber_id)
        .bind(&payment.appointment_id)
        .bind(&payment.service_id)
        .bind(payment.amount.to_cents())
        .bind(payment.kind)
        .bind(payment.status)
        .bind(payment.completed_at)
        .bind(payment.commission_rate.map(|r| r.to_string()))
        .bind(payment.platform_fee.to_cents())
        .bind(payment.barber_amount.to_cents())
        .bind(&payment.payout_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a payment by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<ServicePayment>> {
        Self::get_in(&mut *self.pool.acquire().await?, id).await
    }

    /// [`get_by_id`](Self::get_by_id) on a caller-provided connection.
    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<ServicePayment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT
                id, barber_id, appointment_id, service_id, amount_cents,
                transaction_type, status, completed_at,
                commission_rate, platform_fee_cents, barber_amount_cents, payout_id
            FROM service_payments
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        row.map(ServicePayment::try_from).transpose()
    }

    /// Writes the split of a payment that has none yet.
    ///
    /// Returns the number of rows changed (0 or 1).
    pub async fn cache_split_in(
        conn: &mut SqliteConnection,
        id: &str,
        rate: CommissionRate,
        platform_fee: Money,
        barber_amount: Money,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE service_payments
            SET commission_rate = ?1,
                platform_fee_cents = ?2,
                barber_amount_cents = ?3
            WHERE id = ?4
              AND commission_rate IS NULL
              AND payout_id IS NULL
            "#,
        )
        .bind(rate.to_string())
        .bind(platform_fee.to_cents())
        .bind(barber_amount.to_cents())
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Split, completed payments of a barber not yet attached to a payout.
    pub async fn payable_for_barber(&self, period: &PayoutPeriod) -> DbResult<Vec<PayableEntry>> {
        Self::payable_in(&mut *self.pool.acquire().await?, period).await
    }

    /// [`payable_for_barber`](Self::payable_for_barber) on a caller-provided connection.
    pub async fn payable_in(
        conn: &mut SqliteConnection,
        period: &PayoutPeriod,
    ) -> DbResult<Vec<PayableEntry>> {
        let rows = sqlx::query_as::<_, PayableRow>(
            r#"
            SELECT
                id,
                barber_id,
                barber_amount_cents AS amount_cents,
                completed_at AS settled_at,
                0 AS paid
            FROM service_payments
            WHERE barber_id = ?1
              AND status = 'completed'
              AND completed_at >= ?2
              AND completed_at < ?3
              AND commission_rate IS NOT NULL
              AND payout_id IS NULL
            ORDER BY completed_at, id
            "#,
        )
        .bind(period.barber_id.as_str())
        .bind(period.start)
        .bind(period.end)
        .fetch_all(conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_entry(PayableSource::ServicePayment))
            .collect())
    }

    /// Attaches payments to a payout.
    ///
    /// Payments already attached are left alone, so the returned count is
    /// how many were actually claimed by this payout.
    pub async fn assign_payout_in(
        conn: &mut SqliteConnection,
        barber_id: &str,
        ids: &[String],
        payout_id: &str,
    ) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            r#"
            UPDATE service_payments
            SET payout_id = ?
            WHERE payout_id IS NULL
              AND barber_id = ?
              AND id IN ({})
            "#,
            placeholders(ids.len())
        );

        let mut query = sqlx::query(&sql).bind(payout_id).bind(barber_id);
        for id in ids {
            query = query.bind(id);
        }

        let result = query.execute(conn).await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::barber::Barber;
    use chrono::TimeZone;

    fn all_time() -> PayoutPeriod {
        PayoutPeriod::new(
            "barber-1",
            Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn completed(id: &str) -> ServicePayment {
        ServicePayment {
            id: id.to_string(),
            barber_id: "barber-1".to_string(),
            appointment_id: Some("appt-1".to_string()),
            service_id: None,
            amount: Money::from_cents(10000),
            kind: TransactionKind::Standard,
            status: PaymentStatus::Completed,
            completed_at: Some(Utc::now()),
            commission_rate: None,
            platform_fee: Money::zero(),
            barber_amount: Money::zero(),
            payout_id: None,
        }
    }

    #[tokio::test]
    async fn test_split_is_written_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.barbers().insert(&Barber::new("barber-1", "Marcus")).await.unwrap();
        db.service_payments().insert(&completed("pay-1")).await.unwrap();

        let rate: CommissionRate = "0.30".parse().unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let first = ServicePaymentRepository::cache_split_in(
            &mut conn,
            "pay-1",
            rate,
            Money::from_cents(3000),
            Money::from_cents(7000),
        )
        .await
        .unwrap();
        let second = ServicePaymentRepository::cache_split_in(
            &mut conn,
            "pay-1",
            "0.50".parse().unwrap(),
            Money::from_cents(5000),
            Money::from_cents(5000),
        )
        .await
        .unwrap();
        assert_eq!((first, second), (1, 0));
        drop(conn);

        let loaded = db.service_payments().get_by_id("pay-1").await.unwrap().unwrap();
        assert_eq!(loaded.commission_rate, Some(rate));
        assert_eq!(loaded.barber_amount, Money::from_cents(7000));
    }

    #[tokio::test]
    async fn test_unsplit_payment_is_not_payable() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.barbers().insert(&Barber::new("barber-1", "Marcus")).await.unwrap();
        db.service_payments().insert(&completed("pay-1")).await.unwrap();

        let payable = db.service_payments().payable_for_barber(&all_time()).await.unwrap();
        assert!(payable.is_empty());
    }
}
