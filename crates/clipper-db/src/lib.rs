//! # clipper-db: Persistence and Services for Clipper
//!
//! SQLite storage for the commission core, plus the transactional services
//! that tie `clipper-core` calculations to it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Clipper Data Flow                                │
//! │                                                                         │
//! │  Order / payment / payout subsystems, `clipper` CLI                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   clipper-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Services    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │ (service/)    │───►│ (repository/) │    │  (embedded)  │  │   │
//! │  │   │ one tx each   │    │ FromRow rows  │    │ 0001_init    │  │   │
//! │  │   └──────┬────────┘    └──────┬────────┘    └──────────────┘  │   │
//! │  │          │                    │                                │   │
//! │  │          ▼                    ▼                                │   │
//! │  │   AuditLogger ──mpsc──► AuditWorker        Database (pool.rs)  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ~/.local/share/clipper/clipper.db                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database, service and config error types
//! - [`repository`] - Repository implementations
//! - [`service`] - Commission, payout and pricing services
//! - [`audit`] - Background audit-log writer
//! - [`config`] - TOML + environment configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use clipper_db::{AuditLogger, ClipperConfig, Database, Services};
//!
//! let config = ClipperConfig::load(None)?;
//! let db = Database::new(config.database.db_config()).await?;
//! let (audit, _worker) = AuditLogger::spawn(db.audit_log(), config.audit.buffer_size);
//! let services = Services::new(db, config.rates, config.fees, Arc::new(audit));
//!
//! let summary = services.commission.calculate_order_commissions("order-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use audit::{AuditLogger, AuditWorker};
pub use config::ClipperConfig;
pub use error::{ConfigError, DbError, DbResult, ServiceError, ServiceResult};
pub use pool::{Database, DbConfig};
pub use service::{CommissionService, PayoutService, PricingService, Services};

// Repository re-exports for convenience
pub use repository::audit::AuditLogRepository;
pub use repository::barber::{Barber, BarberRepository};
pub use repository::catalog::CatalogRepository;
pub use repository::order::OrderRepository;
pub use repository::payment::ServicePaymentRepository;
pub use repository::payout::PayoutRepository;
pub use repository::pos::PosRepository;
pub use repository::rate::RateRepository;
