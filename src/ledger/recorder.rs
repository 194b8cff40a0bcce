//! Decision recorder — translates an executed agreement into a ledger write

use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use std::sync::Arc;
use tracing::info;

use crate::agents::Proposal;
use crate::coordination::ScenarioContext;
use crate::error::{BlockOpsError, Result};

use super::chain::Ledger;
use super::block::BlockPayload;
use super::transaction::Transaction;

/// Proof of a committed agreement, stored on the session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub block_index: u64,
    pub block_hash: String,
    pub transaction_id: String,
}

/// Bridges the coordination engine and the ledger: builds the agreement
/// transaction, submits it and forces a single-transaction commit.
#[derive(Clone)]
pub struct DecisionRecorder {
    ledger: Arc<Ledger>,
}

impl DecisionRecorder {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Build the `COORDINATED_PURCHASE` transaction for an accepted
    /// proposal. The id derives from the session id, so re-executing the
    /// same session is caught as a duplicate downstream.
    pub fn build_agreement_transaction(
        &self,
        session_id: &str,
        initiator: &str,
        proposal: &Proposal,
        context: &ScenarioContext,
        participants: &[String],
    ) -> Result<Transaction> {
        let mut details = Map::new();
        details.insert("item_name".into(), json!(proposal.item_name));
        details.insert(
            "proposed_quantity".into(),
            json!(proposal.proposed_quantity),
        );
        details.insert(
            "proposed_cost".into(),
            serde_json::to_value(proposal.proposed_cost)?,
        );
        details.insert("amount".into(), serde_json::to_value(proposal.proposed_cost)?);
        details.insert("quantity".into(), json!(proposal.proposed_quantity));
        details.insert(
            "price_per_unit".into(),
            serde_json::to_value(proposal.price_per_unit)?,
        );
        details.insert("confidence".into(), json!(proposal.confidence));
        details.insert(
            "available_budget".into(),
            serde_json::to_value(context.budget_remaining)?,
        );
        details.insert(
            "available_storage".into(),
            json!(context.storage_available),
        );
        details.insert("participants".into(), json!(participants));

        Ok(Transaction::with_id(
            format!("TX-{session_id}"),
            initiator,
            "COORDINATED_PURCHASE",
            details,
        ))
    }

    /// Submit and commit a transaction, returning its receipt.
    ///
    /// The commit loop drains any earlier pending transactions one block at
    /// a time until this one lands, so a busy pool cannot misattribute the
    /// receipt.
    pub async fn record(&self, tx: Transaction) -> Result<LedgerReceipt> {
        let tx_id = tx.transaction_id.clone();
        let report = self.ledger.submit(tx).await;
        if !report.valid {
            return Err(BlockOpsError::LedgerRejected(report.overall_reason));
        }

        while let Some(block) = self.ledger.commit_auto().await? {
            let contains = match &block.payload {
                BlockPayload::Transactions { transactions, .. } => {
                    transactions.iter().any(|t| t.transaction_id == tx_id)
                }
                BlockPayload::Genesis(_) => false,
            };
            if contains {
                info!(
                    tx_id = %tx_id,
                    block_index = block.index,
                    block_hash = %block.hash,
                    "agreement recorded"
                );
                return Ok(LedgerReceipt {
                    block_index: block.index,
                    block_hash: block.hash,
                    transaction_id: tx_id,
                });
            }
        }

        Err(BlockOpsError::LedgerRejected(format!(
            "transaction {tx_id} was drained from the pool without being committed"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::ConstraintsSatisfied;
    use crate::config::{LedgerConfig, ValidatorConfig};
    use crate::coordination::Urgency;
    use crate::ledger::{detail_decimal, SmartContractValidator};
    use rust_decimal_macros::dec;

    fn recorder() -> DecisionRecorder {
        let ledger = Ledger::new(
            LedgerConfig::fast(),
            SmartContractValidator::new(ValidatorConfig::default()),
        )
        .unwrap();
        DecisionRecorder::new(Arc::new(ledger))
    }

    fn context() -> ScenarioContext {
        ScenarioContext {
            item: "PPE Masks N95".to_string(),
            current_stock: 200,
            required_quantity: 1000,
            price_per_unit: dec!(2.00),
            budget_remaining: dec!(2000),
            storage_available: 800,
            urgency: Urgency::Medium,
            supplier: None,
        }
    }

    fn proposal() -> Proposal {
        Proposal {
            item_name: "PPE Masks N95".to_string(),
            proposed_quantity: 800,
            proposed_cost: dec!(1600.00),
            price_per_unit: dec!(2.00),
            reasoning: "bounded by storage".to_string(),
            confidence: 0.9,
            constraints_satisfied: ConstraintsSatisfied {
                budget: true,
                storage: true,
            },
        }
    }

    #[test]
    fn test_transaction_shape() {
        let recorder = recorder();
        let participants = vec!["SC".to_string(), "FIN".to_string(), "FAC".to_string()];
        let tx = recorder
            .build_agreement_transaction("COORD-00001", "SC", &proposal(), &context(), &participants)
            .unwrap();

        assert_eq!(tx.transaction_id, "TX-COORD-00001");
        assert_eq!(tx.action_type, "COORDINATED_PURCHASE");
        assert_eq!(tx.agent_name, "SC");
        assert_eq!(detail_decimal(&tx.details, "amount"), Some(dec!(1600.00)));
        assert_eq!(detail_decimal(&tx.details, "quantity"), Some(dec!(800)));
        assert_eq!(
            detail_decimal(&tx.details, "available_budget"),
            Some(dec!(2000))
        );
        assert_eq!(tx.details["participants"], json!(participants));
    }

    #[tokio::test]
    async fn test_record_produces_receipt() {
        let recorder = recorder();
        let participants = vec!["SC".to_string(), "FIN".to_string()];
        let tx = recorder
            .build_agreement_transaction("COORD-00001", "SC", &proposal(), &context(), &participants)
            .unwrap();

        let receipt = recorder.record(tx).await.unwrap();
        assert_eq!(receipt.block_index, 1);
        assert_eq!(receipt.transaction_id, "TX-COORD-00001");
        assert!(recorder.ledger().validate_chain().await.valid);
    }

    #[tokio::test]
    async fn test_duplicate_session_record_is_rejected() {
        let recorder = recorder();
        let participants = vec!["SC".to_string()];
        let tx = recorder
            .build_agreement_transaction("COORD-00001", "SC", &proposal(), &context(), &participants)
            .unwrap();
        recorder.record(tx.clone()).await.unwrap();

        let tx = recorder
            .build_agreement_transaction("COORD-00001", "SC", &proposal(), &context(), &participants)
            .unwrap();
        assert!(matches!(
            recorder.record(tx).await,
            Err(BlockOpsError::LedgerRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_record_skips_earlier_pending_transactions() {
        let recorder = recorder();
        // An unrelated transaction sits ahead in the pool.
        let mut details = Map::new();
        details.insert("zone".into(), json!("OR-5"));
        recorder
            .ledger()
            .submit(Transaction::with_id(
                "TX-OTHER",
                "Energy Agent",
                "HVAC_ADJUSTMENT",
                details,
            ))
            .await;

        let tx = recorder
            .build_agreement_transaction(
                "COORD-00002",
                "SC",
                &proposal(),
                &context(),
                &["SC".to_string()],
            )
            .unwrap();
        let receipt = recorder.record(tx).await.unwrap();
        // The earlier transaction got its own block first.
        assert_eq!(receipt.block_index, 2);
    }
}
