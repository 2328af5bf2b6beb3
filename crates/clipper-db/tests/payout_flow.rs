//! End-to-end settlement and payout run against an in-memory database.

use std::sync::Arc;

use chrono::{Duration, Utc};
use clipper_core::audit::AuditSink;
use clipper_core::rate::RateOverride;
use clipper_core::{
    CommissionType, MinimumFees, Money, Order, OrderLineItem, OrderStatus, PaymentStatus,
    PosStatus, PosTransaction, RateDefaults, ServicePayment, TransactionKind,
};
use clipper_db::{AuditLogger, Barber, Database, DbConfig, Services};

fn money(s: &str) -> Money {
    s.parse().unwrap()
}

async fn seed(db: &Database) {
    let now = Utc::now();

    db.barbers().insert(&Barber::new("barber-1", "Marcus")).await.unwrap();
    db.rates()
        .insert(&RateOverride {
            id: "rate-retail".to_string(),
            barber_id: "barber-1".to_string(),
            commission_type: CommissionType::Retail,
            product_id: None,
            location_id: None,
            rate: "0.15".parse().unwrap(),
            is_active: true,
        })
        .await
        .unwrap();

    db.orders()
        .insert_order(&Order {
            id: "order-1".to_string(),
            barber_id: "barber-1".to_string(),
            location_id: None,
            status: OrderStatus::Paid,
            paid_at: Some(now),
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

    db.pos_transactions()
        .insert(&PosTransaction {
            id: "pos-1".to_string(),
            barber_id: "barber-1".to_string(),
            location_id: None,
            product_id: None,
            subtotal: money("20.00"),
            kind: TransactionKind::Standard,
            status: PosStatus::Settled,
            settled_at: Some(now),
            commission_rate: None,
            commission_amount: Money::zero(),
            barber_amount: Money::zero(),
            commission_paid: false,
            commission_paid_at: None,
            payout_id: None,
        })
        .await
        .unwrap();

    db.service_payments()
        .insert(&ServicePayment {
            id: "pay-1".to_string(),
            barber_id: "barber-1".to_string(),
            appointment_id: None,
            service_id: None,
            amount: money("100.00"),
            kind: TransactionKind::Standard,
            status: PaymentStatus::Completed,
            completed_at: Some(now),
            commission_rate: None,
            platform_fee: Money::zero(),
            barber_amount: Money::zero(),
            payout_id: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_settle_then_pay_out_once() {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    seed(&db).await;

    let (logger, worker) = AuditLogger::spawn(db.audit_log(), 64);
    let audit: Arc<dyn AuditSink> = Arc::new(logger);
    let services = Services::new(db.clone(), RateDefaults::default(), MinimumFees::default(), audit);

    let split = services.commission.settle_service_payment("pay-1").await.unwrap();
    assert_eq!(split.platform_fee, money("30.00"));
    assert_eq!(split.barber_amount, money("70.00"));

    let order = services.commission.calculate_order_commissions("order-1").await.unwrap();
    assert_eq!(order.total_commission, money("6.83"));

    let pos = services
        .commission
        .calculate_pos_transaction_commission("pos-1")
        .await
        .unwrap();
    assert_eq!(pos.barber_amount, money("14.00"));

    let start = Utc::now() - Duration::days(1);
    let end = Utc::now() + Duration::days(1);

    let preview = services
        .payouts
        .calculate_barber_payout_amount("barber-1", true, start, end)
        .await
        .unwrap();
    assert_eq!(preview.service_amount, money("70.00"));
    assert_eq!(preview.retail_amount, money("20.83"));
    assert_eq!(preview.total_payout, money("90.83"));

    let services_only = services
        .payouts
        .calculate_barber_payout_amount("barber-1", false, start, end)
        .await
        .unwrap();
    assert_eq!(services_only.total_payout, money("70.00"));

    let payout = services
        .payouts
        .create_payout("barber-1", true, start, end)
        .await
        .unwrap()
        .expect("payout for owed amounts");
    assert_eq!(payout.total_amount, money("90.83"));

    // Everything is claimed now.
    let again = services.payouts.create_payout("barber-1", true, start, end).await.unwrap();
    assert!(again.is_none());

    let item = db.orders().get_item("item-1").await.unwrap().unwrap();
    assert!(item.commission_paid);
    assert_eq!(item.payout_id.as_deref(), Some(payout.id.as_str()));

    let payment = db.service_payments().get_by_id("pay-1").await.unwrap().unwrap();
    assert_eq!(payment.payout_id.as_deref(), Some(payout.id.as_str()));

    assert_eq!(db.payouts().list_for_barber("barber-1").await.unwrap().len(), 1);

    // Closing the channel flushes the worker.
    drop(services);
    worker.await.unwrap();

    // payment split, order line, POS sale, payout run
    assert_eq!(db.audit_log().count().await.unwrap(), 4);
    assert_eq!(db.audit_log().list_for_entity(&payout.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_settlement_is_idempotent_across_rate_changes() {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    seed(&db).await;

    let services = Services::new(
        db.clone(),
        RateDefaults::default(),
        MinimumFees::default(),
        Arc::new(clipper_core::audit::NoopAuditSink),
    );

    let first = services.commission.settle_service_payment("pay-1").await.unwrap();
    assert!(!first.is_cached());

    db.rates()
        .insert(&RateOverride {
            id: "rate-service".to_string(),
            barber_id: "barber-1".to_string(),
            commission_type: CommissionType::Service,
            product_id: None,
            location_id: None,
            rate: "0.50".parse().unwrap(),
            is_active: true,
        })
        .await
        .unwrap();

    let second = services.commission.settle_service_payment("pay-1").await.unwrap();
    assert!(second.is_cached());
    assert_eq!(second.barber_amount, money("70.00"));
}
