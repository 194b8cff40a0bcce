//! Transaction model and validation reports

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Validation lifecycle of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Pending,
    Validated,
    Rejected,
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationStatus::Pending => write!(f, "PENDING"),
            ValidationStatus::Validated => write!(f, "VALIDATED"),
            ValidationStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// A single ledger transaction.
///
/// `details` is an opaque key → value map; the smart-contract validator
/// recognizes `amount`, `quantity`, `confidence`, `available_budget` and
/// `available_storage` when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub agent_name: String,
    pub action_type: String,
    pub details: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub validation_status: ValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_report: Option<ValidationReport>,
}

impl Transaction {
    /// New transaction with a generated id
    pub fn new(
        agent_name: impl Into<String>,
        action_type: impl Into<String>,
        details: Map<String, Value>,
    ) -> Self {
        Self::with_id(
            format!("TX-{}", Uuid::new_v4()),
            agent_name,
            action_type,
            details,
        )
    }

    /// New transaction with a caller-supplied id
    pub fn with_id(
        transaction_id: impl Into<String>,
        agent_name: impl Into<String>,
        action_type: impl Into<String>,
        details: Map<String, Value>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            agent_name: agent_name.into(),
            action_type: action_type.into(),
            details,
            timestamp: Utc::now(),
            validation_status: ValidationStatus::Pending,
            validation_report: None,
        }
    }
}

/// Outcome of a single smart-contract predicate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub valid: bool,
    /// Stable failure code when invalid (e.g. `BUDGET_OVER_LIMIT`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub reason: String,
    /// Remaining capacity after this transaction (budget/storage checks)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<Decimal>,
}

impl CheckReport {
    pub fn pass(reason: impl Into<String>, remaining: Option<Decimal>) -> Self {
        Self {
            valid: true,
            code: None,
            reason: reason.into(),
            remaining,
        }
    }

    pub fn fail(
        code: impl Into<String>,
        reason: impl Into<String>,
        remaining: Option<Decimal>,
    ) -> Self {
        Self {
            valid: false,
            code: Some(code.into()),
            reason: reason.into(),
            remaining,
        }
    }
}

/// Aggregate outcome of a smart-contract validation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub overall_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<CheckReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<CheckReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<CheckReport>,
    pub timestamp: DateTime<Utc>,
}

impl ValidationReport {
    /// Assemble the aggregate verdict from the per-check outcomes.
    /// Failing reasons concatenate in the stable order budget, storage,
    /// confidence.
    pub fn from_checks(
        budget: Option<CheckReport>,
        storage: Option<CheckReport>,
        confidence: Option<CheckReport>,
    ) -> Self {
        let checks = [&budget, &storage, &confidence];
        let failing: Vec<&CheckReport> = checks
            .into_iter()
            .flatten()
            .filter(|c| !c.valid)
            .collect();

        let valid = failing.is_empty();
        let overall_reason = if valid {
            "All constraints satisfied".to_string()
        } else {
            failing
                .iter()
                .map(|c| c.reason.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        };

        Self {
            valid,
            overall_reason,
            budget,
            storage,
            confidence,
            timestamp: Utc::now(),
        }
    }

    /// Rejection report that bypasses the predicate checks (duplicates etc.)
    pub fn rejection(code: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            valid: false,
            overall_reason: format!("{}: {}", code.into(), reason),
            budget: None,
            storage: None,
            confidence: None,
            timestamp: Utc::now(),
        }
    }

    /// First failing check code, in budget → storage → confidence order
    pub fn failure_code(&self) -> Option<&str> {
        [&self.budget, &self.storage, &self.confidence]
            .into_iter()
            .flatten()
            .find(|c| !c.valid)
            .and_then(|c| c.code.as_deref())
    }
}

/// Read a monetary detail value. Accepts JSON numbers and decimal strings
/// (the crate serializes `Decimal` as a string).
pub fn detail_decimal(details: &Map<String, Value>, key: &str) -> Option<Decimal> {
    match details.get(key)? {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                n.as_f64().and_then(Decimal::from_f64_retain)
            }
        }
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Read a floating-point detail value (confidence scores)
pub fn detail_f64(details: &Map<String, Value>, key: &str) -> Option<f64> {
    match details.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
