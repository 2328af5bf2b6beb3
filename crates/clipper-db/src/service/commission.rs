//! # Commission Service
//!
//! Computes and caches commissions as orders, POS transactions and service
//! payments settle.
//!
//! ## Write Guard
//! Every cached field is written with a conditional UPDATE that only
//! matches a row still lacking a commission. If a guarded update changes
//! nothing, someone else got there first: the transaction is dropped (and
//! rolled back) and the caller gets `Conflict`.

use std::sync::Arc;

use clipper_core::audit::{AuditRecord, AuditSink, CalculationMethod};
use clipper_core::order::{OrderCommissionSummary, PosCommissionOutcome, ServiceSplitOutcome};
use clipper_core::rate::{RateQuery, ResolvedRate};
use clipper_core::{CommissionType, CoreError, Money, OrderAggregator};
use sqlx::SqliteConnection;
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};
use crate::pool::Database;
use crate::repository::barber::BarberRepository;
use crate::repository::order::OrderRepository;
use crate::repository::payment::ServicePaymentRepository;
use crate::repository::pos::PosRepository;
use crate::repository::rate::RateRepository;

/// Commission calculation on top of storage.
#[derive(Clone)]
pub struct CommissionService {
    db: Database,
    aggregator: OrderAggregator,
    audit: Arc<dyn AuditSink>,
}

impl CommissionService {
    pub fn new(db: Database, aggregator: OrderAggregator, audit: Arc<dyn AuditSink>) -> Self {
        CommissionService {
            db,
            aggregator,
            audit,
        }
    }

    pub fn aggregator(&self) -> &OrderAggregator {
        &self.aggregator
    }

    // =========================================================================
    // Rate Resolution
    // =========================================================================

    /// Resolves the rate a barber gets for a sale.
    ///
    /// ## Errors
    /// - `InvalidInput` for a negative amount or empty barber id
    /// - `NotFound` when the barber does not exist
    pub async fn resolve_rate(
        &self,
        barber_id: &str,
        commission_type: CommissionType,
        amount: Money,
        product_id: Option<&str>,
        location_id: Option<&str>,
    ) -> ServiceResult<ResolvedRate> {
        clipper_core::validation::validate_id("barber_id", barber_id)?;
        clipper_core::validation::validate_amount("amount", amount)?;

        let mut conn = self.db.pool().acquire().await?;
        if !BarberRepository::exists_in(&mut conn, barber_id).await? {
            return Err(ServiceError::not_found("Barber", barber_id));
        }

        let overrides = RateRepository::active_for_barber_in(&mut conn, barber_id, commission_type).await?;
        let query = RateQuery::new(barber_id, commission_type, amount)
            .product(product_id)
            .location(location_id);
        let resolved = self.aggregator.resolver().resolve(&overrides, &query)?;

        log_fallback(barber_id, commission_type, &resolved);
        Ok(resolved)
    }

    // =========================================================================
    // Retail Orders
    // =========================================================================

    /// Computes and caches the commission of every line of a paid order.
    ///
    /// Safe to call repeatedly: cached lines are left alone and the same
    /// total comes back.
    pub async fn calculate_order_commissions(
        &self,
        order_id: &str,
    ) -> ServiceResult<OrderCommissionSummary> {
        let mut tx = self.db.pool().begin().await?;

        let order = OrderRepository::get_order_in(&mut *tx, order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order", order_id))?;
        let mut items = OrderRepository::items_in(&mut *tx, order_id).await?;
        let overrides = overrides_for(&mut *tx, &order.barber_id, CommissionType::Retail).await?;

        let summary = match self.aggregator.aggregate(&order, &mut items, &overrides) {
            Ok(summary) => summary,
            Err(e) => {
                let base = items.iter().map(|i| i.line_total).sum();
                self.audit_failure(&order.barber_id, order_id, CalculationMethod::OrderLine, base, &e);
                return Err(e.into());
            }
        };

        for update in &summary.updates {
            let changed = OrderRepository::cache_commission_in(
                &mut *tx,
                &update.item_id,
                update.commission_rate,
                update.commission_amount,
            )
            .await?;
            if changed != 1 {
                return Err(ServiceError::Conflict(format!(
                    "order line {} was updated concurrently",
                    update.item_id
                )));
            }
        }

        tx.commit().await?;

        for update in &summary.updates {
            if let Some(source) = update.rate_source {
                debug!(item_id = %update.item_id, source = source.as_str(), rate = %update.commission_rate, "Rate snapshot taken");
            }
            if let Some(result) = &update.result {
                self.audit
                    .record(AuditRecord::success(&order.barber_id, &update.item_id, CalculationMethod::OrderLine, result));
            }
        }

        info!(
            order_id,
            total = %summary.total_commission,
            updated = summary.updates.len(),
            cached = summary.cached_lines,
            "Order commissions calculated"
        );
        Ok(summary)
    }

    // =========================================================================
    // POS Transactions
    // =========================================================================

    /// Computes and caches the platform fee of a settled POS transaction.
    pub async fn calculate_pos_transaction_commission(
        &self,
        transaction_id: &str,
    ) -> ServiceResult<PosCommissionOutcome> {
        let mut tx = self.db.pool().begin().await?;

        let mut pos = PosRepository::get_in(&mut *tx, transaction_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("PosTransaction", transaction_id))?;
        let overrides = overrides_for(&mut *tx, &pos.barber_id, CommissionType::Pos).await?;

        let outcome = match self.aggregator.pos_commission(&mut pos, &overrides) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.audit_failure(&pos.barber_id, transaction_id, CalculationMethod::PosTransaction, pos.subtotal, &e);
                return Err(e.into());
            }
        };

        let Some(result) = &outcome.result else {
            debug!(transaction_id, fee = %outcome.commission_amount, "POS commission already cached");
            return Ok(outcome);
        };

        let changed = PosRepository::cache_commission_in(
            &mut *tx,
            transaction_id,
            outcome.commission_rate,
            outcome.commission_amount,
            outcome.barber_amount,
        )
        .await?;
        if changed != 1 {
            return Err(ServiceError::Conflict(format!(
                "POS transaction {} was updated concurrently",
                transaction_id
            )));
        }

        tx.commit().await?;

        self.audit.record(AuditRecord::success(
            &pos.barber_id,
            transaction_id,
            CalculationMethod::PosTransaction,
            result,
        ));
        info!(
            transaction_id,
            fee = %outcome.commission_amount,
            barber_amount = %outcome.barber_amount,
            "POS commission calculated"
        );
        Ok(outcome)
    }

    // =========================================================================
    // Service Payments
    // =========================================================================

    /// Splits a completed service payment into platform fee and barber share.
    pub async fn settle_service_payment(
        &self,
        payment_id: &str,
    ) -> ServiceResult<ServiceSplitOutcome> {
        let mut tx = self.db.pool().begin().await?;

        let mut payment = ServicePaymentRepository::get_in(&mut *tx, payment_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("ServicePayment", payment_id))?;
        let overrides = overrides_for(&mut *tx, &payment.barber_id, CommissionType::Service).await?;

        let outcome = match self.aggregator.service_split(&mut payment, &overrides) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.audit_failure(&payment.barber_id, payment_id, CalculationMethod::ServicePayment, payment.amount, &e);
                return Err(e.into());
            }
        };

        let Some(result) = &outcome.result else {
            debug!(payment_id, fee = %outcome.platform_fee, "Service payment already split");
            return Ok(outcome);
        };

        let changed = ServicePaymentRepository::cache_split_in(
            &mut *tx,
            payment_id,
            outcome.commission_rate,
            outcome.platform_fee,
            outcome.barber_amount,
        )
        .await?;
        if changed != 1 {
            return Err(ServiceError::Conflict(format!(
                "service payment {} was split concurrently",
                payment_id
            )));
        }

        tx.commit().await?;

        self.audit.record(AuditRecord::success(
            &payment.barber_id,
            payment_id,
            CalculationMethod::ServicePayment,
            result,
        ));
        info!(
            payment_id,
            fee = %outcome.platform_fee,
            barber_amount = %outcome.barber_amount,
            "Service payment split"
        );
        Ok(outcome)
    }

    fn audit_failure(
        &self,
        user_id: &str,
        reference_id: &str,
        method: CalculationMethod,
        base: Money,
        error: &CoreError,
    ) {
        self.audit
            .record(AuditRecord::failure(user_id, reference_id, method, base, error));
    }
}

async fn overrides_for(
    conn: &mut SqliteConnection,
    barber_id: &str,
    commission_type: CommissionType,
) -> ServiceResult<Vec<clipper_core::rate::RateOverride>> {
    Ok(RateRepository::active_for_barber_in(conn, barber_id, commission_type).await?)
}

fn log_fallback(barber_id: &str, commission_type: CommissionType, resolved: &ResolvedRate) {
    if resolved.is_fallback() {
        debug!(
            barber_id,
            commission_type = %commission_type,
            rate = %resolved.rate,
            "No rate override matched, using system default"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::repository::barber::Barber;
    use crate::service::Services;
    use chrono::Utc;
    use clipper_core::audit::NoopAuditSink;
    use clipper_core::rate::{RateOverride, RateSource};
    use clipper_core::{
        CommissionRate, MinimumFees, Order, OrderLineItem, OrderStatus, PaymentStatus,
        PosStatus, PosTransaction, RateDefaults, ServicePayment, TransactionKind,
    };

    fn money(s: &str) -> Money {
        s.parse().unwrap()
    }

    fn rate(s: &str) -> CommissionRate {
        s.parse().unwrap()
    }

    async fn setup() -> (Database, CommissionService) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.barbers().insert(&Barber::new("barber-1", "Marcus")).await.unwrap();
        let services = Services::new(
            db.clone(),
            RateDefaults::default(),
            MinimumFees::default(),
            Arc::new(NoopAuditSink),
        );
        (db, services.commission)
    }

    fn rate_override(id: &str, commission_type: CommissionType, location: Option<&str>, r: &str) -> RateOverride {
        RateOverride {
            id: id.to_string(),
            barber_id: "barber-1".to_string(),
            commission_type,
            product_id: None,
            location_id: location.map(str::to_string),
            rate: rate(r),
            is_active: true,
        }
    }

    async fn seed_order(db: &Database, status: OrderStatus) {
        let now = Utc::now();
        db.orders()
            .insert_order(&Order {
                id: "order-1".to_string(),
                barber_id: "barber-1".to_string(),
                location_id: None,
                status,
                paid_at: (status == OrderStatus::Paid).then_some(now),
                created_at: now,
            })
            .await
            .unwrap();
        db.orders()
            .insert_item(&OrderLineItem {
                id: "item-1".to_string(),
                order_id: "order-1".to_string(),
                product_id: Some("pomade".to_string()),
                position: 1,
                quantity: 1,
                unit_price: money("45.50"),
                line_total: money("45.50"),
                commission_rate: None,
                commission_amount: Money::zero(),
                commission_paid: false,
                commission_paid_at: None,
                payout_id: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resolve_rate_precedence_and_missing_barber() {
        let (db, service) = setup().await;
        db.rates()
            .insert(&rate_override("r-default", CommissionType::Service, None, "0.30"))
            .await
            .unwrap();
        db.rates()
            .insert(&rate_override("r-loc", CommissionType::Service, Some("loc-1"), "0.25"))
            .await
            .unwrap();

        let at_location = service
            .resolve_rate("barber-1", CommissionType::Service, money("100"), None, Some("loc-1"))
            .await
            .unwrap();
        assert_eq!(at_location.rate, rate("0.25"));
        assert_eq!(at_location.source, RateSource::Location);

        let elsewhere = service
            .resolve_rate("barber-1", CommissionType::Service, money("100"), None, Some("loc-2"))
            .await
            .unwrap();
        assert_eq!(elsewhere.rate, rate("0.30"));

        let err = service
            .resolve_rate("ghost", CommissionType::Service, money("100"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));

        let err = service
            .resolve_rate("barber-1", CommissionType::Service, money("-1"), None, None)
            .await
            .unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[tokio::test]
    async fn test_order_commissions_are_cached_once() {
        let (db, service) = setup().await;
        db.rates()
            .insert(&rate_override("r-retail", CommissionType::Retail, None, "0.15"))
            .await
            .unwrap();
        seed_order(&db, OrderStatus::Paid).await;

        let first = service.calculate_order_commissions("order-1").await.unwrap();
        assert_eq!(first.total_commission, money("6.83"));

        db.rates().update_rate("r-retail", rate("0.50")).await.unwrap();
        let second = service.calculate_order_commissions("order-1").await.unwrap();
        assert_eq!(second.total_commission, money("6.83"));
        assert!(second.is_noop());

        let item = db.orders().get_item("item-1").await.unwrap().unwrap();
        assert_eq!(item.commission_rate, Some(rate("0.15")));
    }

    #[tokio::test]
    async fn test_failed_line_write_rolls_back_whole_order() {
        let (db, service) = setup().await;
        seed_order(&db, OrderStatus::Paid).await;
        db.orders()
            .insert_item(&OrderLineItem {
                id: "item-2".to_string(),
                order_id: "order-1".to_string(),
                product_id: Some("comb".to_string()),
                position: 2,
                quantity: 2,
                unit_price: money("6.00"),
                line_total: money("12.00"),
                commission_rate: None,
                commission_amount: Money::zero(),
                commission_paid: false,
                commission_paid_at: None,
                payout_id: None,
            })
            .await
            .unwrap();

        // Another writer gets to item-2 first: its guarded update matches nothing.
        sqlx::query(
            "CREATE TRIGGER hold_item_2 BEFORE UPDATE ON order_items \
             WHEN OLD.id = 'item-2' BEGIN SELECT RAISE(IGNORE); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let err = service.calculate_order_commissions("order-1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        for id in ["item-1", "item-2"] {
            let item = db.orders().get_item(id).await.unwrap().unwrap();
            assert!(item.commission_rate.is_none(), "{} kept a rate", id);
            assert!(item.commission_amount.is_zero(), "{} kept an amount", id);
        }
    }

    #[tokio::test]
    async fn test_unpaid_order_is_invalid_input() {
        let (db, service) = setup().await;
        seed_order(&db, OrderStatus::Pending).await;

        let err = service.calculate_order_commissions("order-1").await.unwrap_err();
        assert!(err.is_invalid_input());
        let item = db.orders().get_item("item-1").await.unwrap().unwrap();
        assert!(item.commission_rate.is_none());

        let err = service.calculate_order_commissions("missing").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_pos_commission_uses_rounded_base() {
        let (db, service) = setup().await;
        db.pos_transactions()
            .insert(&PosTransaction {
                id: "pos-1".to_string(),
                barber_id: "barber-1".to_string(),
                location_id: None,
                product_id: None,
                subtotal: money("20.00"),
                kind: TransactionKind::Standard,
                status: PosStatus::Settled,
                settled_at: Some(Utc::now()),
                commission_rate: None,
                commission_amount: Money::zero(),
                barber_amount: Money::zero(),
                commission_paid: false,
                commission_paid_at: None,
                payout_id: None,
            })
            .await
            .unwrap();

        let outcome = service.calculate_pos_transaction_commission("pos-1").await.unwrap();
        assert_eq!(outcome.commission_amount, money("6.00"));
        assert_eq!(outcome.barber_amount, money("14.00"));

        let again = service.calculate_pos_transaction_commission("pos-1").await.unwrap();
        assert!(again.is_cached());
    }

    #[tokio::test]
    async fn test_settle_service_payment() {
        let (db, service) = setup().await;
        db.service_payments()
            .insert(&ServicePayment {
                id: "pay-1".to_string(),
                barber_id: "barber-1".to_string(),
                appointment_id: None,
                service_id: None,
                amount: money("100.00"),
                kind: TransactionKind::Standard,
                status: PaymentStatus::Completed,
                completed_at: Some(Utc::now()),
                commission_rate: None,
                platform_fee: Money::zero(),
                barber_amount: Money::zero(),
                payout_id: None,
            })
            .await
            .unwrap();

        let outcome = service.settle_service_payment("pay-1").await.unwrap();
        assert_eq!(outcome.platform_fee, money("30.00"));
        assert_eq!(outcome.barber_amount, money("70.00"));
        assert!(service.settle_service_payment("pay-1").await.unwrap().is_cached());
    }
}
