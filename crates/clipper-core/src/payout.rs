//! # Payout Accumulation
//!
//! Sums what a barber is owed for a period.
//!
//! ## Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  source         amount taken          settled at       "unpaid" means   │
//! │  ─────────────  ───────────────────   ──────────────   ──────────────── │
//! │  ServicePayment barber_amount         completed_at     payout_id NULL   │
//! │  OrderLineItem  commission_amount     order.paid_at    !commission_paid │
//! │  PosTransaction barber_amount         settled_at       !commission_paid │
//! │                                                                         │
//! │  service_amount = Σ service entries                                     │
//! │  retail_amount  = Σ order lines + Σ POS     (only if include_retail)   │
//! │  total_payout   = service_amount + retail_amount                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries settled outside `[start, end)`, already paid, or carrying a zero
//! amount are left out. The accumulator is read-only: marking entries paid
//! happens in the database layer, inside the payout transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{
    CommissionState, Order, OrderLineItem, PaymentStatus, PayoutPeriod, PosStatus,
    PosTransaction, ServicePayment,
};

// =============================================================================
// Payable Entries
// =============================================================================

/// Where a payable entry comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayableSource {
    ServicePayment,
    OrderLine,
    PosTransaction,
}

impl PayableSource {
    pub fn is_retail(&self) -> bool {
        !matches!(self, PayableSource::ServicePayment)
    }
}

/// One amount the barber may be owed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayableEntry {
    pub id: String,
    pub barber_id: String,
    pub source: PayableSource,
    /// What the barber earns from this record.
    pub amount: Money,
    pub settled_at: DateTime<Utc>,
    pub paid: bool,
}

impl PayableEntry {
    /// A completed, split service payment. `None` otherwise.
    pub fn from_service_payment(payment: &ServicePayment) -> Option<Self> {
        if payment.status != PaymentStatus::Completed || !payment.is_split() {
            return None;
        }
        Some(PayableEntry {
            id: payment.id.clone(),
            barber_id: payment.barber_id.clone(),
            source: PayableSource::ServicePayment,
            amount: payment.barber_amount,
            settled_at: payment.completed_at?,
            paid: payment.payout_id.is_some(),
        })
    }

    /// A committed line of a paid order. `None` for uncommitted lines.
    pub fn from_order_line(order: &Order, line: &OrderLineItem) -> Option<Self> {
        if line.commission_state() == CommissionState::Uncommitted {
            return None;
        }
        Some(PayableEntry {
            id: line.id.clone(),
            barber_id: order.barber_id.clone(),
            source: PayableSource::OrderLine,
            amount: line.commission_amount,
            settled_at: order.paid_at?,
            paid: line.commission_paid,
        })
    }

    /// A settled POS transaction with a cached split and a positive
    /// barber share. A zero platform fee does not make it unpayable.
    pub fn from_pos_transaction(pos: &PosTransaction) -> Option<Self> {
        if pos.status != PosStatus::Settled
            || pos.commission_state() == CommissionState::Uncommitted
            || !pos.barber_amount.is_positive()
        {
            return None;
        }
        Some(PayableEntry {
            id: pos.id.clone(),
            barber_id: pos.barber_id.clone(),
            source: PayableSource::PosTransaction,
            amount: pos.barber_amount,
            settled_at: pos.settled_at?,
            paid: pos.commission_paid,
        })
    }
}

// =============================================================================
// Summary
// =============================================================================

/// Total and constituent ids for one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceTotal {
    pub amount: Money,
    pub entry_ids: Vec<String>,
}

impl SourceTotal {
    fn add(&mut self, entry: &PayableEntry) {
        self.amount += entry.amount;
        self.entry_ids.push(entry.id.clone());
    }

    pub fn count(&self) -> usize {
        self.entry_ids.len()
    }
}

/// Per-source view of a payout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayoutBreakdown {
    pub service_payments: SourceTotal,
    pub order_lines: SourceTotal,
    pub pos_transactions: SourceTotal,
}

/// What a barber is owed for a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutSummary {
    pub barber_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub include_retail: bool,
    pub service_amount: Money,
    pub retail_amount: Money,
    pub total_payout: Money,
    pub breakdown: PayoutBreakdown,
}

impl PayoutSummary {
    /// True when nothing is owed.
    pub fn is_empty(&self) -> bool {
        self.breakdown.service_payments.count() == 0
            && self.breakdown.order_lines.count() == 0
            && self.breakdown.pos_transactions.count() == 0
    }
}

// =============================================================================
// Accumulator
// =============================================================================

/// Folds payable entries into a [`PayoutSummary`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PayoutAccumulator;

impl PayoutAccumulator {
    pub fn new() -> Self {
        PayoutAccumulator
    }

    /// Accumulates `entries` for `period`.
    ///
    /// ## Errors
    /// `BarberMismatch` when an entry belongs to someone else; that points
    /// at a broken query upstream, so the whole run is refused.
    pub fn accumulate<'a, I>(
        &self,
        period: &PayoutPeriod,
        entries: I,
        include_retail: bool,
    ) -> CoreResult<PayoutSummary>
    where
        I: IntoIterator<Item = &'a PayableEntry>,
    {
        let mut breakdown = PayoutBreakdown::default();

        for entry in entries {
            if entry.barber_id != period.barber_id {
                return Err(CoreError::BarberMismatch {
                    entry_id: entry.id.clone(),
                    expected: period.barber_id.clone(),
                    actual: entry.barber_id.clone(),
                });
            }

            if entry.paid || entry.amount.is_zero() || !period.contains(entry.settled_at) {
                continue;
            }
            if entry.source.is_retail() && !include_retail {
                continue;
            }

            match entry.source {
                PayableSource::ServicePayment => breakdown.service_payments.add(entry),
                PayableSource::OrderLine => breakdown.order_lines.add(entry),
                PayableSource::PosTransaction => breakdown.pos_transactions.add(entry),
            }
        }

        let service_amount = breakdown.service_payments.amount;
        let retail_amount = breakdown.order_lines.amount + breakdown.pos_transactions.amount;

        Ok(PayoutSummary {
            barber_id: period.barber_id.clone(),
            period_start: period.start,
            period_end: period.end,
            include_retail,
            service_amount,
            retail_amount,
            total_payout: service_amount + retail_amount,
            breakdown,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn period() -> PayoutPeriod {
        PayoutPeriod::new(
            "barber-1",
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 16, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn entry(id: &str, source: PayableSource, amount: &str, day: u32) -> PayableEntry {
        PayableEntry {
            id: id.to_string(),
            barber_id: "barber-1".to_string(),
            source,
            amount: money(amount),
            settled_at: Utc.with_ymd_and_hms(2024, 5, day, 10, 0, 0).unwrap(),
            paid: false,
        }
    }

    #[test]
    fn test_service_plus_retail() {
        let entries = vec![
            entry("svc-1", PayableSource::ServicePayment, "70.00", 3),
            entry("line-1", PayableSource::OrderLine, "6.83", 4),
        ];
        let acc = PayoutAccumulator::new();

        let with_retail = acc.accumulate(&period(), &entries, true).unwrap();
        assert_eq!(with_retail.total_payout, money("76.83"));
        assert_eq!(with_retail.service_amount, money("70.00"));
        assert_eq!(with_retail.retail_amount, money("6.83"));
        assert_eq!(with_retail.breakdown.order_lines.entry_ids, vec!["line-1"]);

        let without = acc.accumulate(&period(), &entries, false).unwrap();
        assert_eq!(without.total_payout, money("70.00"));
        assert!(without.retail_amount.is_zero());
        assert_eq!(without.breakdown.order_lines.count(), 0);
    }

    #[test]
    fn test_excludes_paid_zero_and_out_of_range() {
        let mut paid = entry("line-paid", PayableSource::OrderLine, "5.00", 5);
        paid.paid = true;
        let entries = vec![
            paid,
            entry("line-zero", PayableSource::OrderLine, "0", 5),
            entry("pos-late", PayableSource::PosTransaction, "14.00", 16),
            entry("pos-ok", PayableSource::PosTransaction, "14.00", 15),
        ];

        let summary = PayoutAccumulator::new()
            .accumulate(&period(), &entries, true)
            .unwrap();
        assert_eq!(summary.retail_amount, money("14.00"));
        assert_eq!(summary.breakdown.pos_transactions.entry_ids, vec!["pos-ok"]);
    }

    #[test]
    fn test_empty_period() {
        let entries: Vec<PayableEntry> = Vec::new();
        let summary = PayoutAccumulator::new()
            .accumulate(&period(), &entries, true)
            .unwrap();
        assert!(summary.is_empty());
        assert!(summary.total_payout.is_zero());
    }

    #[test]
    fn test_foreign_entry_refused() {
        let mut foreign = entry("svc-x", PayableSource::ServicePayment, "10.00", 2);
        foreign.barber_id = "barber-2".to_string();

        let err = PayoutAccumulator::new()
            .accumulate(&period(), &[foreign], true)
            .unwrap_err();
        assert!(matches!(err, CoreError::BarberMismatch { .. }));
    }
}
