//! # Order Commission Aggregation
//!
//! Computes and caches the barber commission on every line of a paid
//! retail order, and the platform/barber split of single POS transactions
//! and service payments.
//!
//! ## Per-Line Decision
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for line in lines ordered by (position, id):                           │
//! │                                                                         │
//! │    commission_amount != 0 ?  ── yes ──► cached, count it, next line     │
//! │           │ no                                                          │
//! │           ▼                                                             │
//! │    commission_rate == None ? ── yes ──► snapshot via RateResolver       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │    rate > 0 ?               ── yes ──► CommissionCalculator (RETAIL)    │
//! │           │ no                          and cache the amount            │
//! │           ▼                                                             │
//! │    stays Uncommitted (amount 0)                                         │
//! │                                                                         │
//! │  total = Σ commission_amount over ALL lines                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The aggregator mutates the lines in memory and reports what changed.
//! Writing the changes back (in one transaction) is the database layer's job.
//! Running it twice over the same lines changes nothing the second time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::commission::{CommissionCalculator, CommissionInput, CommissionResult};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::rate::{RateOverride, RateQuery, RateResolver, RateSource};
use crate::types::{
    CommissionRate, CommissionState, CommissionType, Order, OrderLineItem, OrderStatus,
    PaymentStatus, PosStatus, PosTransaction, ServicePayment,
};

/// A line whose cached commission fields were filled in during this run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineCommissionUpdate {
    pub item_id: String,
    pub commission_rate: CommissionRate,
    pub commission_amount: Money,
    /// Where the snapshot rate came from; `None` when it was already set.
    pub rate_source: Option<RateSource>,
    /// Present when the calculator ran for this line.
    pub result: Option<CommissionResult>,
}

/// Outcome of aggregating one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCommissionSummary {
    pub order_id: String,
    pub barber_id: String,
    /// Sum of every line's commission, cached or fresh.
    pub total_commission: Money,
    pub updates: Vec<LineCommissionUpdate>,
    /// Lines that already carried a commission.
    pub cached_lines: usize,
}

impl OrderCommissionSummary {
    /// True when the run had nothing to write.
    pub fn is_noop(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Outcome of computing a POS transaction's commission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosCommissionOutcome {
    pub transaction_id: String,
    /// The cached or freshly computed platform fee.
    pub commission_amount: Money,
    pub barber_amount: Money,
    pub commission_rate: CommissionRate,
    pub rate_source: Option<RateSource>,
    /// `None` when the transaction was already computed.
    pub result: Option<CommissionResult>,
}

impl PosCommissionOutcome {
    pub fn is_cached(&self) -> bool {
        self.result.is_none() && self.rate_source.is_none()
    }
}

/// Outcome of splitting a completed service payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSplitOutcome {
    pub payment_id: String,
    pub platform_fee: Money,
    pub barber_amount: Money,
    pub commission_rate: CommissionRate,
    pub rate_source: Option<RateSource>,
    /// `None` when the split was already cached.
    pub result: Option<CommissionResult>,
}

impl ServiceSplitOutcome {
    pub fn is_cached(&self) -> bool {
        self.result.is_none()
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// Applies the rate resolver and calculator across orders.
#[derive(Debug, Clone, Default)]
pub struct OrderAggregator {
    resolver: RateResolver,
    calculator: CommissionCalculator,
}

impl OrderAggregator {
    pub fn new(resolver: RateResolver, calculator: CommissionCalculator) -> Self {
        OrderAggregator {
            resolver,
            calculator,
        }
    }

    pub fn resolver(&self) -> &RateResolver {
        &self.resolver
    }

    pub fn calculator(&self) -> &CommissionCalculator {
        &self.calculator
    }

    /// Aggregates an order stamping fresh results with the current time.
    pub fn aggregate(
        &self,
        order: &Order,
        lines: &mut [OrderLineItem],
        overrides: &[RateOverride],
    ) -> CoreResult<OrderCommissionSummary> {
        self.aggregate_at(order, lines, overrides, Utc::now())
    }

    /// Aggregates the commissions of a paid order.
    ///
    /// ## Arguments
    /// * `order` - must be `Paid`
    /// * `lines` - every line of the order, in any order
    /// * `overrides` - the selling barber's RETAIL overrides
    /// * `at` - timestamp for freshly computed results
    ///
    /// ## Errors
    /// - `InvalidState` when the order is not paid
    /// - `InvalidInput` when a line belongs to another order or carries a
    ///   negative total. Nothing is mutated in that case.
    pub fn aggregate_at(
        &self,
        order: &Order,
        lines: &mut [OrderLineItem],
        overrides: &[RateOverride],
        at: DateTime<Utc>,
    ) -> CoreResult<OrderCommissionSummary> {
        if order.status != OrderStatus::Paid {
            return Err(CoreError::InvalidState {
                entity: "Order".to_string(),
                id: order.id.clone(),
                status: order.status.as_str().to_string(),
                expected: OrderStatus::Paid.as_str().to_string(),
            });
        }

        for line in lines.iter() {
            if line.order_id != order.id {
                return Err(ValidationError::InvalidFormat {
                    field: "order_id".to_string(),
                    reason: format!("line {} belongs to order {}", line.id, line.order_id),
                }
                .into());
            }
        }

        // Stable processing order regardless of how the lines were loaded.
        let mut sequence: Vec<usize> = (0..lines.len()).collect();
        sequence.sort_by(|&a, &b| {
            (lines[a].position, &lines[a].id).cmp(&(lines[b].position, &lines[b].id))
        });

        // Compute everything first so a failing line leaves all lines untouched.
        let mut updates = Vec::new();
        let mut pending: Vec<(usize, CommissionRate, Money)> = Vec::new();
        let mut cached_lines = 0;

        for &idx in &sequence {
            let line = &lines[idx];

            if !line.commission_amount.is_zero() {
                cached_lines += 1;
                continue;
            }

            let (rate, rate_source) = match line.commission_rate {
                Some(rate) => (rate, None),
                None => {
                    let query = RateQuery::new(&order.barber_id, CommissionType::Retail, line.line_total)
                        .product(line.product_id.as_deref())
                        .location(order.location_id.as_deref());
                    let resolved = self.resolver.resolve(overrides, &query)?;
                    (resolved.rate, Some(resolved.source))
                }
            };

            let result = if rate.is_zero() {
                None
            } else {
                let input = CommissionInput::new(CommissionType::Retail, line.line_total, rate);
                Some(self.calculator.calculate_at(&input, at)?)
            };

            let amount = result
                .as_ref()
                .map(CommissionResult::commission_amount)
                .unwrap_or_default();

            if rate_source.is_some() || result.is_some() {
                pending.push((idx, rate, amount));
                updates.push(LineCommissionUpdate {
                    item_id: line.id.clone(),
                    commission_rate: rate,
                    commission_amount: amount,
                    rate_source,
                    result,
                });
            }
        }

        for (idx, rate, amount) in pending {
            let line = &mut lines[idx];
            line.commission_rate = Some(rate);
            line.commission_amount = amount;
        }

        let total_commission = lines.iter().map(|l| l.commission_amount).sum();

        Ok(OrderCommissionSummary {
            order_id: order.id.clone(),
            barber_id: order.barber_id.clone(),
            total_commission,
            updates,
            cached_lines,
        })
    }

    /// Computes the platform fee of a settled POS transaction.
    pub fn pos_commission(
        &self,
        pos: &mut PosTransaction,
        overrides: &[RateOverride],
    ) -> CoreResult<PosCommissionOutcome> {
        self.pos_commission_at(pos, overrides, Utc::now())
    }

    /// Caches the split of one POS transaction.
    ///
    /// A transaction counts as computed once it has a rate and a non-zero
    /// fee or barber share, so a 0% platform rate is cached like any other.
    pub fn pos_commission_at(
        &self,
        pos: &mut PosTransaction,
        overrides: &[RateOverride],
        at: DateTime<Utc>,
    ) -> CoreResult<PosCommissionOutcome> {
        if pos.status != PosStatus::Settled {
            return Err(CoreError::InvalidState {
                entity: "PosTransaction".to_string(),
                id: pos.id.clone(),
                status: pos.status.as_str().to_string(),
                expected: PosStatus::Settled.as_str().to_string(),
            });
        }

        if let (CommissionState::Committed | CommissionState::Paid, Some(rate)) =
            (pos.commission_state(), pos.commission_rate)
        {
            return Ok(PosCommissionOutcome {
                transaction_id: pos.id.clone(),
                commission_amount: pos.commission_amount,
                barber_amount: pos.barber_amount,
                commission_rate: rate,
                rate_source: None,
                result: None,
            });
        }

        let (rate, rate_source) = match pos.commission_rate {
            Some(rate) => (rate, None),
            None => {
                let query = RateQuery::new(&pos.barber_id, CommissionType::Pos, pos.subtotal)
                    .product(pos.product_id.as_deref())
                    .location(pos.location_id.as_deref());
                let resolved = self.resolver.resolve(overrides, &query)?;
                (resolved.rate, Some(resolved.source))
            }
        };

        let input = CommissionInput::new(CommissionType::Pos, pos.subtotal, rate).kind(pos.kind);
        let result = self.calculator.calculate_at(&input, at)?;

        pos.commission_rate = Some(rate);
        pos.commission_amount = result.commission_amount();
        pos.barber_amount = result.barber_amount().unwrap_or_default();

        Ok(PosCommissionOutcome {
            transaction_id: pos.id.clone(),
            commission_amount: pos.commission_amount,
            barber_amount: pos.barber_amount,
            commission_rate: rate,
            rate_source,
            result: Some(result),
        })
    }

    /// Splits a completed service payment into platform fee and barber share.
    pub fn service_split(
        &self,
        payment: &mut ServicePayment,
        overrides: &[RateOverride],
    ) -> CoreResult<ServiceSplitOutcome> {
        self.service_split_at(payment, overrides, Utc::now())
    }

    /// A payment is split once. The service id doubles as the product key
    /// for product-level SERVICE overrides.
    pub fn service_split_at(
        &self,
        payment: &mut ServicePayment,
        overrides: &[RateOverride],
        at: DateTime<Utc>,
    ) -> CoreResult<ServiceSplitOutcome> {
        if payment.status != PaymentStatus::Completed {
            return Err(CoreError::InvalidState {
                entity: "ServicePayment".to_string(),
                id: payment.id.clone(),
                status: payment.status.as_str().to_string(),
                expected: PaymentStatus::Completed.as_str().to_string(),
            });
        }

        if let Some(rate) = payment.commission_rate {
            return Ok(ServiceSplitOutcome {
                payment_id: payment.id.clone(),
                platform_fee: payment.platform_fee,
                barber_amount: payment.barber_amount,
                commission_rate: rate,
                rate_source: None,
                result: None,
            });
        }

        let query = RateQuery::new(&payment.barber_id, CommissionType::Service, payment.amount)
            .product(payment.service_id.as_deref());
        let resolved = self.resolver.resolve(overrides, &query)?;

        let input = CommissionInput::new(CommissionType::Service, payment.amount, resolved.rate)
            .kind(payment.kind);
        let result = self.calculator.calculate_at(&input, at)?;

        payment.commission_rate = Some(resolved.rate);
        payment.platform_fee = result.commission_amount();
        payment.barber_amount = result.barber_amount().unwrap_or_default();

        Ok(ServiceSplitOutcome {
            payment_id: payment.id.clone(),
            platform_fee: payment.platform_fee,
            barber_amount: payment.barber_amount,
            commission_rate: resolved.rate,
            rate_source: Some(resolved.source),
            result: Some(result),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionKind;
    use chrono::TimeZone;

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn rate(s: &str) -> CommissionRate {
        s.parse().unwrap()
    }

    fn paid_order() -> Order {
        let at = Utc.with_ymd_and_hms(2024, 5, 2, 15, 30, 0).unwrap();
        Order {
            id: "order-1".to_string(),
            barber_id: "barber-1".to_string(),
            location_id: Some("loc-1".to_string()),
            status: OrderStatus::Paid,
            paid_at: Some(at),
            created_at: at,
        }
    }

    fn line(id: &str, position: i64, total: &str) -> OrderLineItem {
        OrderLineItem {
            id: id.to_string(),
            order_id: "order-1".to_string(),
            product_id: Some(format!("product-{}", id)),
            position,
            quantity: 1,
            unit_price: money(total),
            line_total: money(total),
            commission_rate: None,
            commission_amount: Money::zero(),
            commission_paid: false,
            commission_paid_at: None,
            payout_id: None,
        }
    }

    fn retail_override(r: &str) -> RateOverride {
        RateOverride {
            id: "ov-1".to_string(),
            barber_id: "barber-1".to_string(),
            commission_type: CommissionType::Retail,
            product_id: None,
            location_id: None,
            rate: rate(r),
            is_active: true,
        }
    }

    #[test]
    fn test_aggregate_snapshots_and_sums() {
        let aggregator = OrderAggregator::default();
        let mut lines = vec![line("b", 2, "20.00"), line("a", 1, "45.50")];

        let summary = aggregator
            .aggregate(&paid_order(), &mut lines, &[retail_override("0.15")])
            .unwrap();

        // 6.83 + 3.00
        assert_eq!(summary.total_commission, money("9.83"));
        assert_eq!(summary.updates.len(), 2);
        assert_eq!(summary.updates[0].item_id, "a");
        assert_eq!(summary.updates[0].rate_source, Some(RateSource::BarberDefault));
        assert_eq!(lines[1].commission_amount, money("6.83"));
        assert_eq!(lines[1].commission_rate, Some(rate("0.15")));
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let aggregator = OrderAggregator::default();
        let mut lines = vec![line("a", 1, "45.50"), line("b", 2, "10.00")];
        let overrides = [retail_override("0.15")];

        let first = aggregator.aggregate(&paid_order(), &mut lines, &overrides).unwrap();
        let snapshot: Vec<_> = lines.iter().map(|l| (l.commission_rate, l.commission_amount)).collect();

        // A later rate change must not reach cached lines.
        let second = aggregator
            .aggregate(&paid_order(), &mut lines, &[retail_override("0.50")])
            .unwrap();

        assert_eq!(first.total_commission, second.total_commission);
        assert!(second.is_noop());
        assert_eq!(second.cached_lines, 2);
        let after: Vec<_> = lines.iter().map(|l| (l.commission_rate, l.commission_amount)).collect();
        assert_eq!(snapshot, after);
    }

    #[test]
    fn test_existing_snapshot_is_respected() {
        let aggregator = OrderAggregator::default();
        let mut lines = vec![line("a", 1, "100.00")];
        lines[0].commission_rate = Some(rate("0.05"));

        let summary = aggregator
            .aggregate(&paid_order(), &mut lines, &[retail_override("0.20")])
            .unwrap();

        assert_eq!(summary.total_commission, money("5.00"));
        assert_eq!(summary.updates[0].rate_source, None);
    }

    #[test]
    fn test_zero_rate_line_stays_uncommitted() {
        let aggregator = OrderAggregator::default();
        let mut lines = vec![line("a", 1, "30.00")];

        let summary = aggregator
            .aggregate(&paid_order(), &mut lines, &[retail_override("0")])
            .unwrap();

        assert!(summary.total_commission.is_zero());
        assert_eq!(lines[0].commission_rate, Some(CommissionRate::ZERO));
        assert_eq!(lines[0].commission_state(), crate::types::CommissionState::Uncommitted);
    }

    #[test]
    fn test_unpaid_order_rejected() {
        let aggregator = OrderAggregator::default();
        let mut order = paid_order();
        order.status = OrderStatus::Pending;
        let mut lines = vec![line("a", 1, "30.00")];

        let err = aggregator.aggregate(&order, &mut lines, &[]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
        assert!(lines[0].commission_rate.is_none());
    }

    #[test]
    fn test_bad_line_leaves_order_untouched() {
        let aggregator = OrderAggregator::default();
        let mut lines = vec![line("a", 1, "30.00"), line("b", 2, "-5.00")];

        assert!(aggregator.aggregate(&paid_order(), &mut lines, &[]).is_err());
        assert!(lines.iter().all(|l| l.commission_rate.is_none()));
    }

    fn settled_pos() -> PosTransaction {
        PosTransaction {
            id: "pos-1".to_string(),
            barber_id: "barber-1".to_string(),
            location_id: None,
            product_id: None,
            subtotal: money("19.995"),
            kind: TransactionKind::Standard,
            status: PosStatus::Settled,
            settled_at: Some(Utc.with_ymd_and_hms(2024, 5, 2, 16, 0, 0).unwrap()),
            commission_rate: None,
            commission_amount: Money::zero(),
            barber_amount: Money::zero(),
            commission_paid: false,
            commission_paid_at: None,
            payout_id: None,
        }
    }

    #[test]
    fn test_pos_commission_caches() {
        let aggregator = OrderAggregator::default();
        let mut pos = settled_pos();

        let first = aggregator.pos_commission(&mut pos, &[]).unwrap();
        assert_eq!(first.commission_amount, money("6.00"));
        assert_eq!(first.barber_amount, money("14.00"));
        assert_eq!(first.rate_source, Some(RateSource::SystemDefault));

        let second = aggregator.pos_commission(&mut pos, &[]).unwrap();
        assert!(second.is_cached());
        assert_eq!(second.commission_amount, money("6.00"));
    }

    #[test]
    fn test_zero_fee_pos_is_cached_and_payable() {
        let aggregator = OrderAggregator::default();
        let mut pos = settled_pos();
        let overrides = [RateOverride {
            id: "ov-pos".to_string(),
            barber_id: "barber-1".to_string(),
            commission_type: CommissionType::Pos,
            product_id: None,
            location_id: None,
            rate: rate("0"),
            is_active: true,
        }];

        let first = aggregator.pos_commission(&mut pos, &overrides).unwrap();
        assert!(first.commission_amount.is_zero());
        assert_eq!(first.barber_amount, money("20.00"));
        assert_eq!(pos.commission_state(), CommissionState::Committed);

        let second = aggregator.pos_commission(&mut pos, &overrides).unwrap();
        assert!(second.is_cached());

        let entry = crate::payout::PayableEntry::from_pos_transaction(&pos).unwrap();
        assert_eq!(entry.amount, money("20.00"));
    }

    #[test]
    fn test_pos_must_be_settled() {
        let aggregator = OrderAggregator::default();
        let mut pos = settled_pos();
        pos.status = PosStatus::Voided;
        assert!(aggregator.pos_commission(&mut pos, &[]).is_err());
    }

    fn completed_payment(kind: TransactionKind) -> ServicePayment {
        ServicePayment {
            id: "pay-1".to_string(),
            barber_id: "barber-1".to_string(),
            appointment_id: Some("appt-1".to_string()),
            service_id: Some("svc-fade".to_string()),
            amount: money("10.00"),
            kind,
            status: PaymentStatus::Completed,
            completed_at: Some(Utc.with_ymd_and_hms(2024, 5, 3, 10, 0, 0).unwrap()),
            commission_rate: None,
            platform_fee: Money::zero(),
            barber_amount: Money::zero(),
            payout_id: None,
        }
    }

    #[test]
    fn test_service_split_uses_service_override() {
        let aggregator = OrderAggregator::default();
        let mut payment = completed_payment(TransactionKind::Deposit);
        let overrides = [RateOverride {
            id: "ov-svc".to_string(),
            barber_id: "barber-1".to_string(),
            commission_type: CommissionType::Service,
            product_id: Some("svc-fade".to_string()),
            location_id: None,
            rate: rate("0.20"),
            is_active: true,
        }];

        let outcome = aggregator.service_split(&mut payment, &overrides).unwrap();
        assert_eq!(outcome.rate_source, Some(RateSource::Product));
        assert_eq!(payment.platform_fee, money("2.00"));
        assert_eq!(payment.barber_amount, money("8.00"));

        let again = aggregator.service_split(&mut payment, &[]).unwrap();
        assert!(again.is_cached());
        assert_eq!(again.platform_fee, money("2.00"));
    }

    #[test]
    fn test_service_split_requires_completed() {
        let aggregator = OrderAggregator::default();
        let mut payment = completed_payment(TransactionKind::Standard);
        payment.status = PaymentStatus::Refunded;
        let err = aggregator.service_split(&mut payment, &[]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
    }
}
