//! # POS Transaction Repository
//!
//! In-shop sales. Each row carries its own cached platform fee and barber
//! share, written once by the commission service.

use chrono::{DateTime, Utc};
use clipper_core::payout::{PayableEntry, PayableSource};
use clipper_core::{CommissionRate, Money, PayoutPeriod, PosStatus, PosTransaction, TransactionKind};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::{parse_rate, placeholders, PayableRow};
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct PosRow {
    id: String,
    barber_id: String,
    location_id: Option<String>,
    product_id: Option<String>,
    subtotal_cents: i64,
    transaction_type: TransactionKind,
    status: PosStatus,
    settled_at: Option<DateTime<Utc>>,
    commission_rate: Option<String>,
    commission_amount_cents: i64,
    barber_amount_cents: i64,
    commission_paid: bool,
    commission_paid_at: Option<DateTime<Utc>>,
    payout_id: Option<String>,
}

impl TryFrom<PosRow> for PosTransaction {
    type Error = DbError;

    fn try_from(row: PosRow) -> DbResult<Self> {
        Ok(PosTransaction {
            commission_rate: parse_rate("pos_transactions", row.commission_rate.as_deref())?,
            id: row.id,
            barber_id: row.barber_id,
            location_id: row.location_id,
            product_id: row.product_id,
            subtotal: Money::from_cents(row.subtotal_cents),
            kind: row.transaction_type,
            status: row.status,
            settled_at: row.settled_at,
            commission_amount: Money::from_cents(row.commission_amount_cents),
            barber_amount: Money::from_cents(row.barber_amount_cents),
            commission_paid: row.commission_paid,
            commission_paid_at: row.commission_paid_at,
            payout_id: row.payout_id,
        })
    }
}

/// Repository for POS transactions.
#[derive(Debug, Clone)]
pub struct PosRepository {
    pool: SqlitePool,
}

impl PosRepository {
    /// Creates a new PosRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PosRepository { pool }
    }

    /// Inserts a transaction.
    pub async fn insert(&self, pos: &PosTransaction) -> DbResult<()> {
        debug!(id = %pos.id, barber_id = %pos.barber_id, subtotal = %pos.subtotal, "Inserting POS transaction");

        sqlx::query(
            r#"
            INSERT INTO pos_transactions (
                id, barber_id, location_id, product_id, subtotal_cents,
                transaction_type, status, settled_at,
                commission_rate, commission_amount_cents, barber_amount_cents,
                commission_paid, commission_paid_at, payout_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&pos.id)
        .bind(&pos.barber_id)
        .bind(&pos.location_id)
        .bind(&pos.product_id)
        .bind(pos.subtotal.to_cents())
        .bind(pos.kind)
        .bind(pos.status)
        .bind(pos.settled_at)
        .bind(pos.commission_rate.map(|r| r.to_string()))
        .bind(pos.commission_amount.to_cents())
        .bind(pos.barber_amount.to_cents())
        .bind(pos.commission_paid)
        .bind(pos.commission_paid_at)
        .bind(&pos.payout_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a transaction by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<PosTransaction>> {
        Self::get_in(&mut *self.pool.acquire().await?, id).await
    }

    /// [`get_by_id`](Self::get_by_id) on a caller-provided connection.
    pub async fn get_in(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<PosTransaction>> {
        let row = sqlx::query_as::<_, PosRow>(
            r#"
            SELECT
                id, barber_id, location_id, product_id, subtotal_cents,
                transaction_type, status, settled_at,
                commission_rate, commission_amount_cents, barber_amount_cents,
                commission_paid, commission_paid_at, payout_id
            FROM pos_transactions
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        row.map(PosTransaction::try_from).transpose()
    }

    /// Writes a computed split, once.
    ///
    /// Only matches an unpaid transaction without a cached split. Returns the
    /// number of rows changed (0 or 1).
    pub async fn cache_commission_in(
        conn: &mut SqliteConnection,
        id: &str,
        rate: CommissionRate,
        commission_amount: Money,
        barber_amount: Money,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE pos_transactions
            SET commission_rate = ?1,
                commission_amount_cents = ?2,
                barber_amount_cents = ?3
            WHERE id = ?4
              AND commission_paid = 0
              AND commission_amount_cents = 0
              AND barber_amount_cents = 0
              AND (commission_rate IS NULL OR commission_rate = ?1)
            "#,
        )
        .bind(rate.to_string())
        .bind(commission_amount.to_cents())
        .bind(barber_amount.to_cents())
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Split, unpaid transactions settled within the period.
    ///
    /// Payable means the barber has a positive share; the platform fee may
    /// be zero.
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
                settled_at,
                commission_paid AS paid
            FROM pos_transactions
            WHERE barber_id = ?1
              AND status = 'settled'
              AND settled_at >= ?2
              AND settled_at < ?3
              AND commission_paid = 0
              AND commission_rate IS NOT NULL
              AND barber_amount_cents > 0
            ORDER BY settled_at, id
            "#,
        )
        .bind(period.barber_id.as_str())
        .bind(period.start)
        .bind(period.end)
        .fetch_all(conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_entry(PayableSource::PosTransaction))
            .collect())
    }

    /// Marks committed transactions of a barber as paid.
    ///
    /// Same guard as order lines: repeats change nothing.
    pub async fn mark_paid_in(
        conn: &mut SqliteConnection,
        barber_id: &str,
        ids: &[String],
        payout_id: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            r#"
            UPDATE pos_transactions
            SET commission_paid = 1,
                commission_paid_at = ?,
                payout_id = COALESCE(?, payout_id)
            WHERE commission_paid = 0
              AND commission_rate IS NOT NULL
              AND barber_amount_cents > 0
              AND barber_id = ?
              AND id IN ({})
            "#,
            placeholders(ids.len())
        );

        let mut query = sqlx::query(&sql).bind(paid_at).bind(payout_id).bind(barber_id);
        for id in ids {
            query = query.bind(id);
        }

        let result = query.execute(conn).await?;
        Ok(result.rows_affected())
    }
}
