//! # Barber Repository
//!
//! Barbers are the people commissions are paid to. This crate only needs
//! them to exist; profiles and scheduling live elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

/// A barber as far as commissions are concerned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Barber {
    pub id: String,
    pub display_name: String,
    /// Home location, used when a sale carries none.
    pub location_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Barber {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Barber {
            id: id.into(),
            display_name: display_name.into(),
            location_id: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// Repository for barber database operations.
#[derive(Debug, Clone)]
pub struct BarberRepository {
    pool: SqlitePool,
}

impl BarberRepository {
    /// Creates a new BarberRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BarberRepository { pool }
    }

    /// Inserts a barber.
    pub async fn insert(&self, barber: &Barber) -> DbResult<()> {
        debug!(id = %barber.id, "Inserting barber");

        sqlx::query(
            r#"
            INSERT INTO barbers (id, display_name, location_id, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&barber.id)
        .bind(&barber.display_name)
        .bind(&barber.location_id)
        .bind(barber.is_active)
        .bind(barber.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a barber by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Barber>> {
        let barber = sqlx::query_as::<_, Barber>(
            r#"
            SELECT id, display_name, location_id, is_active, created_at
            FROM barbers
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(barber)
    }

    /// Lists all barbers by name.
    pub async fn list(&self) -> DbResult<Vec<Barber>> {
        let barbers = sqlx::query_as::<_, Barber>(
            r#"
            SELECT id, display_name, location_id, is_active, created_at
            FROM barbers
            ORDER BY display_name, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(barbers)
    }

    /// Returns true if the barber exists.
    pub async fn exists(&self, id: &str) -> DbResult<bool> {
        Self::exists_in(&mut *self.pool.acquire().await?, id).await
    }

    /// [`exists`](Self::exists) on a caller-provided connection.
    pub async fn exists_in(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM barbers WHERE id = ?1")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(found.is_some())
    }
}
