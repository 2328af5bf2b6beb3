//! # Commission Audit Log Repository
//!
//! Append-only. Rows are written by the background audit worker and read
//! back for diagnostics.

use chrono::{DateTime, Utc};
use clipper_core::audit::AuditRecord;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::DbResult;

/// A stored audit row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: i64,
    pub user_id: String,
    pub order_or_transaction_id: String,
    pub commission_amount_cents: i64,
    pub commission_rate: Option<String>,
    pub base_amount_cents: i64,
    pub calculation_method: String,
    pub success: bool,
    /// JSON text.
    pub details: String,
    pub created_at: DateTime<Utc>,
}

/// Repository for the commission audit log.
#[derive(Debug, Clone)]
pub struct AuditLogRepository {
    pool: SqlitePool,
}

impl AuditLogRepository {
    /// Creates a new AuditLogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuditLogRepository { pool }
    }

    /// Appends a record and returns its row id.
    pub async fn insert(&self, record: &AuditRecord) -> DbResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO commission_audit_log (
                user_id, order_or_transaction_id,
                commission_amount_cents, commission_rate, base_amount_cents,
                calculation_method, success, details, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.order_or_transaction_id)
        .bind(record.commission_amount.to_cents())
        .bind(record.commission_rate.map(|r| r.to_string()))
        .bind(record.base_amount.to_cents())
        .bind(record.calculation_method.as_str())
        .bind(record.success)
        .bind(record.details.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// All rows about one order, line, transaction or payout, oldest first.
    pub async fn list_for_entity(&self, reference_id: &str) -> DbResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query_as::<_, AuditLogEntry>(
            r#"
            SELECT
                id, user_id, order_or_transaction_id,
                commission_amount_cents, commission_rate, base_amount_cents,
                calculation_method, success, details, created_at
            FROM commission_audit_log
            WHERE order_or_transaction_id = ?1
            ORDER BY id
            "#,
        )
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Total number of rows.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM commission_audit_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use clipper_core::audit::CalculationMethod;
    use clipper_core::Money;

    #[tokio::test]
    async fn test_insert_and_list() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.audit_log();

        let record = AuditRecord::aggregate(
            "barber-1",
            "payout-1",
            CalculationMethod::PayoutRun,
            Money::from_cents(7683),
            serde_json::json!({ "entries": 2 }),
        );
        let id = repo.insert(&record).await.unwrap();
        assert!(id > 0);

        let rows = repo.list_for_entity("payout-1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].calculation_method, "payout_run");
        assert_eq!(rows[0].commission_amount_cents, 7683);
        assert!(rows[0].success);
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
