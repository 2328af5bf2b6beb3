//! # Payout Service
//!
//! Totals what a barber is owed and turns it into a payout, marking every
//! constituent item in the same transaction.
//!
//! ## Double-Payment Protection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_payout(barber)                                                  │
//! │     │                                                                   │
//! │     ├── per-barber lock      one run per barber at a time (in-process)  │
//! │     │                                                                   │
//! │     ├── BEGIN                                                           │
//! │     │    read payable items ─► PayoutAccumulator ─► summary             │
//! │     │    INSERT payout                                                  │
//! │     │    UPDATE ... WHERE payout_id IS NULL / commission_paid = 0       │
//! │     │    rows affected == items in summary ?                            │
//! │     │        no  ──► drop tx (ROLLBACK), Conflict                       │
//! │     └── COMMIT                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The conditional updates also protect against writers outside this
//! process: an item claimed elsewhere fails the row count check.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clipper_core::audit::{AuditRecord, AuditSink, CalculationMethod};
use clipper_core::payout::PayableEntry;
use clipper_core::{Money, Payout, PayoutAccumulator, PayoutPeriod, PayoutStatus, PayoutSummary};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::pool::Database;
use crate::repository::barber::BarberRepository;
use crate::repository::new_id;
use crate::repository::order::OrderRepository;
use crate::repository::payment::ServicePaymentRepository;
use crate::repository::payout::PayoutRepository;
use crate::repository::pos::PosRepository;

/// How many items a mark-paid call actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPaidOutcome {
    pub order_lines: u64,
    pub pos_transactions: u64,
}

impl MarkPaidOutcome {
    pub fn total(&self) -> u64 {
        self.order_lines + self.pos_transactions
    }
}

/// Payout calculation and persistence.
#[derive(Clone)]
pub struct PayoutService {
    db: Database,
    accumulator: PayoutAccumulator,
    audit: Arc<dyn AuditSink>,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl PayoutService {
    pub fn new(db: Database, audit: Arc<dyn AuditSink>) -> Self {
        PayoutService {
            db,
            accumulator: PayoutAccumulator::new(),
            audit,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Totals what a barber is owed for `[start, end)`. Read only.
    pub async fn calculate_barber_payout_amount(
        &self,
        barber_id: &str,
        include_retail: bool,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ServiceResult<PayoutSummary> {
        let period = PayoutPeriod::new(barber_id, start, end)?;
        let mut conn = self.db.pool().acquire().await?;
        self.summarize(&mut *conn, &period, include_retail).await
    }

    /// Marks retail order lines and POS transactions of a barber as paid.
    ///
    /// Items already paid are skipped, so repeating a call changes nothing
    /// and keeps the original `commission_paid_at`. Both updates commit
    /// together or not at all.
    pub async fn mark_retail_commissions_paid(
        &self,
        barber_id: &str,
        payout_id: Option<&str>,
        order_item_ids: &[String],
        pos_transaction_ids: &[String],
    ) -> ServiceResult<MarkPaidOutcome> {
        clipper_core::validation::validate_id("barber_id", barber_id)?;

        let now = Utc::now();
        let mut tx = self.db.pool().begin().await?;

        let outcome = MarkPaidOutcome {
            order_lines: OrderRepository::mark_paid_in(&mut *tx, barber_id, order_item_ids, payout_id, now)
                .await?,
            pos_transactions: PosRepository::mark_paid_in(
                &mut *tx,
                barber_id,
                pos_transaction_ids,
                payout_id,
                now,
            )
            .await?,
        };

        tx.commit().await?;

        let requested = order_item_ids.len() + pos_transaction_ids.len();
        if outcome.total() < requested as u64 {
            debug!(
                barber_id,
                requested,
                changed = outcome.total(),
                "Some items were already paid or not payable"
            );
        }

        if outcome.total() > 0 {
            self.audit.record(AuditRecord::aggregate(
                barber_id,
                payout_id.unwrap_or(barber_id),
                CalculationMethod::MarkPaid,
                Money::zero(),
                serde_json::json!({
                    "order_lines": outcome.order_lines,
                    "pos_transactions": outcome.pos_transactions,
                }),
            ));
        }

        Ok(outcome)
    }

    /// Creates a payout for everything a barber is owed in `[start, end)`.
    ///
    /// Returns `None` when nothing is owed. On any mismatch between what was
    /// totalled and what could be claimed, nothing is written and the
    /// caller gets `Conflict`.
    pub async fn create_payout(
        &self,
        barber_id: &str,
        include_retail: bool,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ServiceResult<Option<Payout>> {
        let period = PayoutPeriod::new(barber_id, start, end)?;

        let lock = self.barber_lock(barber_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.run_payout(&period, include_retail).await
        };
        self.release_lock(barber_id, lock).await;

        result
    }

    async fn run_payout(
        &self,
        period: &PayoutPeriod,
        include_retail: bool,
    ) -> ServiceResult<Option<Payout>> {
        let barber_id = period.barber_id.as_str();

        let mut tx = self.db.pool().begin().await?;
        let summary = self.summarize(&mut *tx, period, include_retail).await?;

        if summary.is_empty() {
            debug!(barber_id, "Nothing owed, no payout created");
            return Ok(None);
        }

        let payout = Payout {
            id: new_id(),
            barber_id: barber_id.to_string(),
            period_start: period.start,
            period_end: period.end,
            service_amount: summary.service_amount,
            retail_amount: summary.retail_amount,
            total_amount: summary.total_payout,
            status: PayoutStatus::Pending,
            created_at: Utc::now(),
        };
        PayoutRepository::insert_in(&mut *tx, &payout).await?;

        let breakdown = &summary.breakdown;
        let claims = [
            (
                "service payments",
                breakdown.service_payments.count(),
                ServicePaymentRepository::assign_payout_in(
                    &mut *tx,
                    barber_id,
                    &breakdown.service_payments.entry_ids,
                    &payout.id,
                )
                .await?,
            ),
            (
                "order lines",
                breakdown.order_lines.count(),
                OrderRepository::mark_paid_in(
                    &mut *tx,
                    barber_id,
                    &breakdown.order_lines.entry_ids,
                    Some(&payout.id),
                    payout.created_at,
                )
                .await?,
            ),
            (
                "POS transactions",
                breakdown.pos_transactions.count(),
                PosRepository::mark_paid_in(
                    &mut *tx,
                    barber_id,
                    &breakdown.pos_transactions.entry_ids,
                    Some(&payout.id),
                    payout.created_at,
                )
                .await?,
            ),
        ];

        for (what, expected, changed) in claims {
            if changed != expected as u64 {
                warn!(barber_id, what, expected, changed, "Payout claim mismatch, rolling back");
                return Err(ServiceError::Conflict(format!(
                    "expected to claim {} {} for barber {}, claimed {}",
                    expected, what, barber_id, changed
                )));
            }
        }

        tx.commit().await?;

        self.audit.record(AuditRecord::aggregate(
            barber_id,
            &payout.id,
            CalculationMethod::PayoutRun,
            payout.total_amount,
            serde_json::to_value(&summary).unwrap_or_default(),
        ));
        info!(
            payout_id = %payout.id,
            barber_id,
            service = %payout.service_amount,
            retail = %payout.retail_amount,
            total = %payout.total_amount,
            "Payout created"
        );

        Ok(Some(payout))
    }

    async fn summarize(
        &self,
        conn: &mut SqliteConnection,
        period: &PayoutPeriod,
        include_retail: bool,
    ) -> ServiceResult<PayoutSummary> {
        let barber_id = period.barber_id.as_str();
        if !BarberRepository::exists_in(conn, barber_id).await? {
            return Err(ServiceError::not_found("Barber", barber_id));
        }

        let mut entries: Vec<PayableEntry> = ServicePaymentRepository::payable_in(conn, period).await?;
        if include_retail {
            entries.extend(OrderRepository::payable_in(conn, period).await?);
            entries.extend(PosRepository::payable_in(conn, period).await?);
        }

        Ok(self.accumulator.accumulate(period, &entries, include_retail)?)
    }

    async fn barber_lock(&self, barber_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(barber_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the barber's entry once no other run holds or waits on it.
    ///
    /// Clones are only handed out under the map lock, so a count of two
    /// (map + ours) means nobody else can still be using it.
    async fn release_lock(&self, barber_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(barber_id);
        }
    }
}
