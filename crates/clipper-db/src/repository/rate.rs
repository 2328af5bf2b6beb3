//! # Commission Rate Repository
//!
//! Stores rate overrides. The precedence rules themselves live in
//! `clipper_core::rate`; this repository only loads the candidates.
//!
//! ## Storage Order
//! Overrides come back most recently updated first, so when two active
//! overrides sit at the same precedence level the newer one wins.

use chrono::Utc;
use clipper_core::rate::RateOverride;
use clipper_core::{CommissionRate, CommissionType};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::parse_rate_text;
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct RateRow {
    id: String,
    barber_id: String,
    commission_type: CommissionType,
    product_id: Option<String>,
    location_id: Option<String>,
    rate: String,
    is_active: bool,
}

impl TryFrom<RateRow> for RateOverride {
    type Error = DbError;

    fn try_from(row: RateRow) -> DbResult<Self> {
        let rate = parse_rate_text("commission_rates", &row.rate)?;
        Ok(RateOverride {
            id: row.id,
            barber_id: row.barber_id,
            commission_type: row.commission_type,
            product_id: row.product_id,
            location_id: row.location_id,
            rate,
            is_active: row.is_active,
        })
    }
}

/// Repository for commission rate overrides.
#[derive(Debug, Clone)]
pub struct RateRepository {
    pool: SqlitePool,
}

impl RateRepository {
    /// Creates a new RateRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RateRepository { pool }
    }

    /// Inserts an override.
    pub async fn insert(&self, rate: &RateOverride) -> DbResult<()> {
        debug!(
            id = %rate.id,
            barber_id = %rate.barber_id,
            commission_type = %rate.commission_type,
            rate = %rate.rate,
            "Inserting commission rate"
        );

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO commission_rates (
                id, barber_id, commission_type, product_id, location_id,
                rate, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
        )
        .bind(&rate.id)
        .bind(&rate.barber_id)
        .bind(rate.commission_type)
        .bind(&rate.product_id)
        .bind(&rate.location_id)
        .bind(rate.rate.to_string())
        .bind(rate.is_active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Changes the rate of an existing override.
    ///
    /// Already-snapshotted order lines keep their old rate.
    pub async fn update_rate(&self, id: &str, rate: CommissionRate) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE commission_rates SET rate = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(rate.to_string())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CommissionRate", id));
        }
        Ok(())
    }

    /// Switches an override on or off.
    pub async fn set_active(&self, id: &str, is_active: bool) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE commission_rates SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(is_active)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CommissionRate", id));
        }
        Ok(())
    }

    /// Loads a barber's active overrides of one type.
    pub async fn active_for_barber(
        &self,
        barber_id: &str,
        commission_type: CommissionType,
    ) -> DbResult<Vec<RateOverride>> {
        Self::active_for_barber_in(&mut *self.pool.acquire().await?, barber_id, commission_type).await
    }

    /// [`active_for_barber`](Self::active_for_barber) on a caller-provided connection.
    pub async fn active_for_barber_in(
        conn: &mut SqliteConnection,
        barber_id: &str,
        commission_type: CommissionType,
    ) -> DbResult<Vec<RateOverride>> {
        let rows = sqlx::query_as::<_, RateRow>(
            r#"
            SELECT id, barber_id, commission_type, product_id, location_id, rate, is_active
            FROM commission_rates
            WHERE barber_id = ?1 AND commission_type = ?2 AND is_active = 1
            ORDER BY updated_at DESC, id
            "#,
        )
        .bind(barber_id)
        .bind(commission_type)
        .fetch_all(conn)
        .await?;

        rows.into_iter().map(RateOverride::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::barber::Barber;

    fn rate(s: &str) -> CommissionRate {
        s.parse().unwrap()
    }

    fn override_for(id: &str, location: Option<&str>, r: &str) -> RateOverride {
        RateOverride {
            id: id.to_string(),
            barber_id: "barber-1".to_string(),
            commission_type: CommissionType::Service,
            product_id: None,
            location_id: location.map(str::to_string),
            rate: rate(r),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_insert_and_load_active() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.barbers().insert(&Barber::new("barber-1", "Marcus")).await.unwrap();
        let repo = db.rates();

        repo.insert(&override_for("r1", None, "0.30")).await.unwrap();
        repo.insert(&override_for("r2", Some("loc-1"), "0.25")).await.unwrap();
        repo.set_active("r1", false).await.unwrap();

        let loaded = repo
            .active_for_barber("barber-1", CommissionType::Service)
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "r2");
        assert_eq!(loaded[0].rate, rate("0.25"));

        let retail = repo
            .active_for_barber("barber-1", CommissionType::Retail)
            .await
            .unwrap();
        assert!(retail.is_empty());
    }

    #[tokio::test]
    async fn test_update_rate() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.barbers().insert(&Barber::new("barber-1", "Marcus")).await.unwrap();
        let repo = db.rates();

        repo.insert(&override_for("r1", None, "0.30")).await.unwrap();
        repo.update_rate("r1", rate("0.35")).await.unwrap();

        let loaded = repo
            .active_for_barber("barber-1", CommissionType::Service)
            .await
            .unwrap();
        assert_eq!(loaded[0].rate, rate("0.35"));
        assert!(repo.update_rate("missing", rate("0.1")).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_barber_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db.rates().insert(&override_for("r1", None, "0.30")).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}
