//! Smart-contract validator — pure predicate gate over transaction details
//!
//! Swapping this type is the single-point extension for new policy rules.
//! It holds no state and performs no I/O, so the same inputs always produce
//! the same report.

use rust_decimal::Decimal;

use crate::config::ValidatorConfig;

use super::transaction::{detail_decimal, detail_f64, CheckReport, Transaction, ValidationReport};

/// Policy gate applied to every transaction on submission and to
/// prospective agreements during coordination (dry-run).
#[derive(Debug, Clone, Default)]
pub struct SmartContractValidator {
    config: ValidatorConfig,
}

impl SmartContractValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Budget predicate: amount must be positive, within the declared
    /// available budget (when present) and under the autonomous cap.
    pub fn validate_budget(&self, amount: Decimal, available: Option<Decimal>) -> CheckReport {
        if amount <= Decimal::ZERO {
            return CheckReport::fail("BUDGET_EXCEEDED", "Amount must be positive", available);
        }

        if let Some(budget) = available {
            if amount > budget {
                return CheckReport::fail(
                    "BUDGET_EXCEEDED",
                    format!(
                        "Insufficient budget: required ${amount}, available ${budget}"
                    ),
                    Some(budget),
                );
            }
        }

        if amount > self.config.max_single_purchase {
            return CheckReport::fail(
                "BUDGET_OVER_LIMIT",
                format!(
                    "Single purchase exceeds autonomous limit of ${}; requires approval",
                    self.config.max_single_purchase
                ),
                available,
            );
        }

        CheckReport::pass(
            "Budget constraint satisfied",
            available.map(|budget| budget - amount),
        )
    }

    /// Storage predicate: quantity must be positive and fit the declared
    /// available storage (when present).
    pub fn validate_storage(&self, quantity: Decimal, available: Option<Decimal>) -> CheckReport {
        if quantity <= Decimal::ZERO {
            return CheckReport::fail("STORAGE_EXCEEDED", "Quantity must be positive", available);
        }

        if let Some(storage) = available {
            if quantity > storage {
                return CheckReport::fail(
                    "STORAGE_EXCEEDED",
                    format!(
                        "Insufficient storage: required {quantity} units, available {storage} units"
                    ),
                    Some(storage),
                );
            }
        }

        CheckReport::pass(
            "Storage constraint satisfied",
            available.map(|storage| storage - quantity),
        )
    }

    /// Confidence predicate against the configured minimum
    pub fn validate_confidence(&self, confidence: f64) -> CheckReport {
        let threshold = self.config.min_confidence;
        if confidence < threshold {
            CheckReport::fail(
                "CONFIDENCE_TOO_LOW",
                format!(
                    "Confidence {confidence:.2} below threshold {threshold:.2}; requires human approval"
                ),
                None,
            )
        } else {
            CheckReport::pass(
                format!("Confidence {confidence:.2} meets threshold {threshold:.2}"),
                None,
            )
        }
    }

    /// Run every applicable predicate over `tx.details`. Absent keys are
    /// not applicable and pass vacuously.
    pub fn validate(&self, tx: &Transaction) -> ValidationReport {
        let budget = detail_decimal(&tx.details, "amount").map(|amount| {
            self.validate_budget(amount, detail_decimal(&tx.details, "available_budget"))
        });

        let storage = detail_decimal(&tx.details, "quantity").map(|quantity| {
            self.validate_storage(quantity, detail_decimal(&tx.details, "available_storage"))
        });

        let confidence =
            detail_f64(&tx.details, "confidence").map(|c| self.validate_confidence(c));

        ValidationReport::from_checks(budget, storage, confidence)
    }

    /// Dry-run individual predicates without a transaction. Useful for
    /// hosts that want to preview whether an action would pass.
    pub fn preview(
        &self,
        amount: Option<Decimal>,
        quantity: Option<Decimal>,
        confidence: Option<f64>,
    ) -> ValidationReport {
        ValidationReport::from_checks(
            amount.map(|a| self.validate_budget(a, None)),
            quantity.map(|q| self.validate_storage(q, None)),
            confidence.map(|c| self.validate_confidence(c)),
        )
    }
}
