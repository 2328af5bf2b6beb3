//! # Background Audit Writer
//!
//! ```text
//! service ──record()──► AuditLogger ──try_send──► mpsc ──► AuditWorker ──► commission_audit_log
//!                          │
//!                          └── channel full or closed: warn and drop
//! ```
//!
//! Calculations never wait on the audit table. A lost record is logged at
//! `warn` and otherwise ignored.

use clipper_core::audit::{AuditRecord, AuditSink};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::repository::audit::AuditLogRepository;

/// Default channel capacity.
pub const DEFAULT_AUDIT_BUFFER: usize = 1024;

/// Sending half. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    tx: mpsc::Sender<AuditRecord>,
}

impl AuditLogger {
    /// Creates a logger and the receiver its worker should drain.
    pub fn channel(buffer_size: usize) -> (Self, mpsc::Receiver<AuditRecord>) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        (AuditLogger { tx }, rx)
    }

    /// Creates a logger with its worker already running on the current runtime.
    pub fn spawn(repo: AuditLogRepository, buffer_size: usize) -> (Self, JoinHandle<()>) {
        let (logger, rx) = Self::channel(buffer_size);
        let handle = tokio::spawn(AuditWorker::new(repo).run(rx));
        (logger, handle)
    }
}

impl AuditSink for AuditLogger {
    fn record(&self, record: AuditRecord) {
        if let Err(e) = self.tx.try_send(record) {
            let (reason, record) = match e {
                mpsc::error::TrySendError::Full(r) => ("channel full", r),
                mpsc::error::TrySendError::Closed(r) => ("channel closed", r),
            };
            warn!(
                reason,
                reference_id = %record.order_or_transaction_id,
                method = record.calculation_method.as_str(),
                "Audit record dropped"
            );
        }
    }
}

/// Drains the audit channel into the database.
pub struct AuditWorker {
    repo: AuditLogRepository,
}

impl AuditWorker {
    pub fn new(repo: AuditLogRepository) -> Self {
        AuditWorker { repo }
    }

    /// Runs until every [`AuditLogger`] clone has been dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<AuditRecord>) {
        info!("Audit worker started");

        while let Some(record) = rx.recv().await {
            match self.repo.insert(&record).await {
                Ok(id) => {
                    debug!(
                        audit_id = id,
                        reference_id = %record.order_or_transaction_id,
                        method = record.calculation_method.as_str(),
                        "Audit record written"
                    );
                }
                Err(e) => {
                    error!(error = %e, reference_id = %record.order_or_transaction_id, "Failed to write audit record");
                }
            }
        }

        info!("Audit channel closed, worker stopping");
    }
}
