//! # Transactional Services
//!
//! Wire the pure `clipper-core` components to storage. Each operation runs
//! in one sqlx transaction and emits audit records after it commits.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  order / payment subsystem            payout subsystem                  │
//! │          │                                   │                          │
//! │          ▼                                   ▼                          │
//! │  CommissionService                    PayoutService                     │
//! │  ├── resolve_rate                     ├── calculate_barber_payout_amount│
//! │  ├── calculate_order_commissions      ├── mark_retail_commissions_paid  │
//! │  ├── calculate_pos_transaction_...    └── create_payout                 │
//! │  └── settle_service_payment                  (per-barber lock)          │
//! │                                                                         │
//! │  PricingService ── calculate_price                                      │
//! │                                                                         │
//! │  all of them ──► AuditSink (fire and forget)                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod commission;
pub mod payout;
pub mod pricing;

use std::sync::Arc;

use clipper_core::audit::AuditSink;
use clipper_core::{CommissionCalculator, MinimumFees, OrderAggregator, RateDefaults, RateResolver};

use crate::pool::Database;

pub use commission::CommissionService;
pub use payout::PayoutService;
pub use pricing::PricingService;

/// All services sharing one database and one audit sink.
#[derive(Clone)]
pub struct Services {
    pub commission: CommissionService,
    pub payouts: PayoutService,
    pub pricing: PricingService,
}

impl Services {
    pub fn new(
        db: Database,
        rates: RateDefaults,
        fees: MinimumFees,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let aggregator = OrderAggregator::new(RateResolver::new(rates), CommissionCalculator::new(fees));

        Services {
            commission: CommissionService::new(db.clone(), aggregator, audit.clone()),
            payouts: PayoutService::new(db.clone(), audit),
            pricing: PricingService::new(db),
        }
    }
}
