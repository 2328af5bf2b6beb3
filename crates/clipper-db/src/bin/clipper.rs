//! # Clipper Operator Tool
//!
//! Drives the commission services against a local database. Every command
//! prints its result as JSON on stdout; logs go to stderr.
//!
//! ## Usage
//! ```bash
//! # Demo data (barbers, rates, services, rules, an order, a POS sale, a payment)
//! cargo run -p clipper-db --bin clipper -- --db ./clipper_dev.db seed
//!
//! # Price a booking
//! cargo run -p clipper-db --bin clipper -- price --service svc-fade \
//!     --barber barber-marcus --date 2024-06-08 --time 18:30:00
//!
//! # Settle commissions
//! cargo run -p clipper-db --bin clipper -- settle-order order-demo-1
//! cargo run -p clipper-db --bin clipper -- settle-payment pay-demo-1
//!
//! # Payouts
//! cargo run -p clipper-db --bin clipper -- payout-preview --barber barber-marcus \
//!     --start 2024-01-01 --end 2030-01-01
//! cargo run -p clipper-db --bin clipper -- payout-run --barber barber-marcus \
//!     --start 2024-01-01 --end 2030-01-01
//! ```
//!
//! `RUST_LOG` controls verbosity (default `info,clipper=debug,sqlx=warn`).

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use clipper_core::audit::{AuditSink, NoopAuditSink};
use clipper_core::pricing::{PriceAdjustment, PricingRule, RuleCondition, Service};
use clipper_core::rate::RateOverride;
use clipper_core::{
    CommissionRate, CommissionType, Money, Order, OrderLineItem, OrderStatus, PaymentStatus,
    PosStatus, PosTransaction, ServicePayment, TransactionKind,
};
use clipper_db::{AuditLogger, Barber, ClipperConfig, Database, Services};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(name = "clipper")]
#[clap(about = "Commission, payout and pricing operations for Clipper")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overrides the config and CLIPPER_DB_PATH
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert demo data into an empty database
    Seed,

    /// Price a service for a booking
    Price {
        #[clap(long)]
        service: String,
        #[clap(long)]
        barber: Option<String>,
        /// Booking date, YYYY-MM-DD
        #[clap(long)]
        date: Option<NaiveDate>,
        /// Booking time, HH:MM:SS
        #[clap(long)]
        time: Option<NaiveTime>,
    },

    /// Resolve the commission rate for a barber
    Rate {
        #[clap(long)]
        barber: String,
        /// service, retail or pos
        #[clap(long = "type")]
        commission_type: CommissionType,
        #[clap(long)]
        amount: Money,
        #[clap(long)]
        product: Option<String>,
        #[clap(long)]
        location: Option<String>,
    },

    /// Calculate and cache the commissions of a paid order
    SettleOrder { order_id: String },

    /// Calculate and cache the platform fee of a settled POS transaction
    SettlePos { transaction_id: String },

    /// Split a completed service payment into platform fee and barber amount
    SettlePayment { payment_id: String },

    /// Show what a barber is owed for a period without writing anything
    PayoutPreview {
        #[clap(flatten)]
        period: PeriodArgs,
    },

    /// Create a payout and claim everything it covers
    PayoutRun {
        #[clap(flatten)]
        period: PeriodArgs,
    },
}

#[derive(clap::Args, Debug)]
struct PeriodArgs {
    #[clap(long)]
    barber: String,
    /// First day of the period (inclusive)
    #[clap(long)]
    start: NaiveDate,
    /// Day after the period (exclusive)
    #[clap(long)]
    end: NaiveDate,
    /// Leave retail order lines and POS sales out
    #[clap(long)]
    no_retail: bool,
}

impl PeriodArgs {
    fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (midnight(self.start), midnight(self.end))
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,clipper=debug,sqlx=warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = ClipperConfig::load(cli.config)?;
    if let Some(path) = cli.db {
        config.database.path = path;
    }

    let db = Database::new(config.database.db_config()).await?;
    info!(path = ?config.database.path, "Database ready");

    let (audit, worker): (Arc<dyn AuditSink>, _) = if config.audit.enabled {
        let (logger, handle) = AuditLogger::spawn(db.audit_log(), config.audit.buffer_size);
        (Arc::new(logger), Some(handle))
    } else {
        (Arc::new(NoopAuditSink), None)
    };
    let services = Services::new(db.clone(), config.rates, config.fees, audit);

    let result = run(cli.command, &db, &services).await;

    // Dropping the last sender lets the worker drain and exit.
    drop(services);
    if let Some(handle) = worker {
        handle.await?;
    }
    db.close().await;

    result
}

async fn run(
    command: Command,
    db: &Database,
    services: &Services,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Seed => seed(db).await,
        Command::Price {
            service,
            barber,
            date,
            time,
        } => {
            let quote = services
                .pricing
                .calculate_price(&service, barber.as_deref(), date, time)
                .await?;
            print_json(&quote)
        }
        Command::Rate {
            barber,
            commission_type,
            amount,
            product,
            location,
        } => {
            let resolved = services
                .commission
                .resolve_rate(
                    &barber,
                    commission_type,
                    amount,
                    product.as_deref(),
                    location.as_deref(),
                )
                .await?;
            print_json(&resolved)
        }
        Command::SettleOrder { order_id } => {
            let summary = services.commission.calculate_order_commissions(&order_id).await?;
            print_json(&summary)
        }
        Command::SettlePos { transaction_id } => {
            let outcome = services
                .commission
                .calculate_pos_transaction_commission(&transaction_id)
                .await?;
            print_json(&outcome)
        }
        Command::SettlePayment { payment_id } => {
            let outcome = services.commission.settle_service_payment(&payment_id).await?;
            print_json(&outcome)
        }
        Command::PayoutPreview { period } => {
            let (start, end) = period.bounds();
            let summary = services
                .payouts
                .calculate_barber_payout_amount(&period.barber, !period.no_retail, start, end)
                .await?;
            print_json(&summary)
        }
        Command::PayoutRun { period } => {
            let (start, end) = period.bounds();
            let payout = services
                .payouts
                .create_payout(&period.barber, !period.no_retail, start, end)
                .await?;
            match payout {
                Some(payout) => print_json(&payout),
                None => {
                    eprintln!("Nothing owed to {} for this period", period.barber);
                    Ok(())
                }
            }
        }
    }
}

// =============================================================================
// Seed
// =============================================================================

async fn seed(db: &Database) -> Result<(), Box<dyn std::error::Error>> {
    println!("Clipper Seed Data");
    println!("=================");

    let existing = db.barbers().list().await?;
    if !existing.is_empty() {
        println!("⚠ Database already has {} barbers", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let now = Utc::now();

    for (id, name) in [("barber-marcus", "Marcus"), ("barber-jade", "Jade")] {
        db.barbers().insert(&Barber::new(id, name)).await?;
    }
    println!("✓ Barbers");

    let overrides = [
        ("rate-marcus-retail", "barber-marcus", CommissionType::Retail, None, "0.15"),
        ("rate-marcus-downtown", "barber-marcus", CommissionType::Service, Some("loc-downtown"), "0.25"),
        ("rate-jade-pos", "barber-jade", CommissionType::Pos, None, "0.20"),
    ];
    for (id, barber_id, commission_type, location_id, rate) in overrides {
        db.rates()
            .insert(&RateOverride {
                id: id.to_string(),
                barber_id: barber_id.to_string(),
                commission_type,
                product_id: None,
                location_id: location_id.map(str::to_string),
                rate: rate.parse::<CommissionRate>()?,
                is_active: true,
            })
            .await?;
    }
    println!("✓ Rate overrides");

    let catalog = db.catalog();
    catalog
        .insert_service(&Service::new("svc-fade", "Skin Fade", Money::from_cents(4000)))
        .await?;
    catalog
        .insert_service(&Service::new("svc-beard", "Beard Trim", Money::from_cents(2500)))
        .await?;
    catalog
        .set_barber_price("barber-marcus", "svc-fade", Money::from_cents(5000))
        .await?;

    let rules = [
        PricingRule::new(
            "rule-weekend",
            "svc-fade",
            RuleCondition::DayOfWeek { day: 5 },
            PriceAdjustment::Percentage("10".parse()?),
            5,
        ),
        PricingRule::new(
            "rule-evening",
            "svc-fade",
            RuleCondition::TimeOfDay {
                start: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or(NaiveTime::MIN),
                end: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN),
            },
            PriceAdjustment::Fixed(Money::from_cents(500)),
            3,
        ),
        PricingRule::new(
            "rule-holiday",
            "svc-beard",
            RuleCondition::DateRange {
                start: NaiveDate::from_ymd_opt(2024, 12, 24).unwrap_or(NaiveDate::MIN),
                end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or(NaiveDate::MIN),
            },
            PriceAdjustment::SetPrice(Money::from_cents(3500)),
            10,
        ),
    ];
    for rule in &rules {
        catalog.insert_rule(rule).await?;
    }
    println!("✓ Services and pricing rules");

    db.orders()
        .insert_order(&Order {
            id: "order-demo-1".to_string(),
            barber_id: "barber-marcus".to_string(),
            location_id: None,
            status: OrderStatus::Paid,
            paid_at: Some(now),
            created_at: now,
        })
        .await?;
    let lines = [
        ("item-demo-1", "pomade", 1, 4550),
        ("item-demo-2", "comb", 2, 600),
    ];
    for (position, (id, product, quantity, unit_cents)) in lines.into_iter().enumerate() {
        db.orders()
            .insert_item(&OrderLineItem {
                id: id.to_string(),
                order_id: "order-demo-1".to_string(),
                product_id: Some(product.to_string()),
                position: position as i64 + 1,
                quantity,
                unit_price: Money::from_cents(unit_cents),
                line_total: Money::from_cents(unit_cents * i64::from(quantity)),
                commission_rate: None,
                commission_amount: Money::zero(),
                commission_paid: false,
                commission_paid_at: None,
                payout_id: None,
            })
            .await?;
    }
    println!("✓ Order order-demo-1 (2 lines, paid)");

    db.pos_transactions()
        .insert(&PosTransaction {
            id: "pos-demo-1".to_string(),
            barber_id: "barber-jade".to_string(),
            location_id: None,
            product_id: Some("shampoo".to_string()),
            subtotal: Money::from_cents(2000),
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
        .await?;
    println!("✓ POS transaction pos-demo-1 (settled)");

    db.service_payments()
        .insert(&ServicePayment {
            id: "pay-demo-1".to_string(),
            barber_id: "barber-marcus".to_string(),
            appointment_id: Some("appt-demo-1".to_string()),
            service_id: Some("svc-fade".to_string()),
            amount: Money::from_cents(10000),
            kind: TransactionKind::Standard,
            status: PaymentStatus::Completed,
            completed_at: Some(now),
            commission_rate: None,
            platform_fee: Money::zero(),
            barber_amount: Money::zero(),
            payout_id: None,
        })
        .await?;
    println!("✓ Service payment pay-demo-1 (completed)");

    println!();
    println!("Next: settle-order order-demo-1, settle-pos pos-demo-1, settle-payment pay-demo-1");
    Ok(())
}
