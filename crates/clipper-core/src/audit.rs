//! # Commission Audit Records
//!
//! Every commission calculation, successful or not, produces one
//! [`AuditRecord`]. The database layer ships records to a background
//! writer through an [`AuditSink`]; emitting a record never blocks or fails
//! the calculation that produced it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::commission::CommissionResult;
use crate::money::Money;
use crate::types::CommissionRate;

/// How a commission figure was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    OrderLine,
    PosTransaction,
    ServicePayment,
    PayoutRun,
    MarkPaid,
}

impl CalculationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationMethod::OrderLine => "order_line",
            CalculationMethod::PosTransaction => "pos_transaction",
            CalculationMethod::ServicePayment => "service_payment",
            CalculationMethod::PayoutRun => "payout_run",
            CalculationMethod::MarkPaid => "mark_paid",
        }
    }
}

/// One audit-log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Barber (or operator) the calculation was done for.
    pub user_id: String,
    pub order_or_transaction_id: String,
    pub commission_amount: Money,
    pub commission_rate: Option<CommissionRate>,
    pub base_amount: Money,
    pub calculation_method: CalculationMethod,
    pub success: bool,
    pub details: Value,
}

impl AuditRecord {
    /// Record for a successful calculation.
    pub fn success(
        user_id: impl Into<String>,
        reference_id: impl Into<String>,
        method: CalculationMethod,
        result: &CommissionResult,
    ) -> Self {
        let details = serde_json::to_value(result).unwrap_or(Value::Null);
        AuditRecord {
            user_id: user_id.into(),
            order_or_transaction_id: reference_id.into(),
            commission_amount: result.commission_amount(),
            commission_rate: Some(result.rate_applied()),
            base_amount: result.base_amount(),
            calculation_method: method,
            success: true,
            details,
        }
    }

    /// Record for a failed calculation; `error` lands in `details`.
    pub fn failure(
        user_id: impl Into<String>,
        reference_id: impl Into<String>,
        method: CalculationMethod,
        base_amount: Money,
        error: &dyn std::error::Error,
    ) -> Self {
        AuditRecord {
            user_id: user_id.into(),
            order_or_transaction_id: reference_id.into(),
            commission_amount: Money::zero(),
            commission_rate: None,
            base_amount,
            calculation_method: method,
            success: false,
            details: serde_json::json!({ "error": error.to_string() }),
        }
    }

    /// Record for an aggregate operation such as a payout run.
    pub fn aggregate(
        user_id: impl Into<String>,
        reference_id: impl Into<String>,
        method: CalculationMethod,
        amount: Money,
        details: Value,
    ) -> Self {
        AuditRecord {
            user_id: user_id.into(),
            order_or_transaction_id: reference_id.into(),
            commission_amount: amount,
            commission_rate: None,
            base_amount: amount,
            calculation_method: method,
            success: true,
            details,
        }
    }
}

/// Destination for audit records.
///
/// Implementations must not block and must not fail the caller.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Sink that drops everything. Used where auditing is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _record: AuditRecord) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commission::{CommissionCalculator, CommissionInput};
    use crate::error::CoreError;
    use crate::types::CommissionType;
    use std::sync::Mutex;

    #[derive(Default)]
    struct VecSink(Mutex<Vec<AuditRecord>>);

    impl AuditSink for VecSink {
        fn record(&self, record: AuditRecord) {
            self.0.lock().unwrap().push(record);
        }
    }

    #[test]
    fn test_success_record_copies_result() {
        let input = CommissionInput::new(
            CommissionType::Retail,
            "45.50".parse().unwrap(),
            "0.15".parse().unwrap(),
        );
        let result = CommissionCalculator::default().calculate(&input).unwrap();

        let sink = VecSink::default();
        sink.record(AuditRecord::success("barber-1", "line-1", CalculationMethod::OrderLine, &result));

        let records = sink.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].commission_amount, Money::from_cents(683));
        assert_eq!(records[0].base_amount, Money::from_cents(4550));
        assert_eq!(records[0].details["kind"], "barber_commission");
    }

    #[test]
    fn test_failure_record_keeps_message() {
        let err = CoreError::UnknownCommissionType("tips".to_string());
        let record = AuditRecord::failure("barber-1", "pos-1", CalculationMethod::PosTransaction, Money::zero(), &err);
        assert!(!record.success);
        assert_eq!(record.details["error"], "Unknown commission type: 'tips'");
    }
}
