//! The chained block store — genesis bootstrap, pending pool, batched
//! commits behind a simulated consensus delay, chain validation and queries.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::error::{BlockOpsError, Result};

use super::block::{meets_difficulty, Block, BlockPayload, GenesisInfo};
use super::transaction::{Transaction, ValidationReport, ValidationStatus};
use super::validator::SmartContractValidator;

/// Chain integrity report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub blocks_checked: usize,
}

/// Ledger statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_blocks: usize,
    pub total_transactions: usize,
    pub validated_transactions: usize,
    pub rejected_transactions: usize,
    pub pending: usize,
    pub chain_valid: bool,
    pub latest_block_hash: String,
    pub genesis_hash: String,
}

/// Where a transaction was found by [`Ledger::find_transaction`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction: Transaction,
    /// Set when the transaction is committed in a block
    pub block_index: Option<u64>,
    pub block_hash: Option<String>,
}

/// A committed transaction with its block context (history queries)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommittedTransaction {
    pub block_index: u64,
    pub block_hash: String,
    pub block_timestamp: DateTime<Utc>,
    pub transaction: Transaction,
}

struct ChainState {
    blocks: Vec<Block>,
    pending: VecDeque<Transaction>,
    rejected: Vec<Transaction>,
    /// Ids of every pending or committed transaction, for duplicate checks
    known_ids: HashSet<String>,
}

impl ChainState {
    fn bootstrap(config: &LedgerConfig) -> Result<Self> {
        let mut genesis = Block::new(
            0,
            Utc::now(),
            BlockPayload::Genesis(GenesisInfo::default()),
            String::new(),
        )?;
        genesis.mine(config.difficulty)?;
        info!(hash = %genesis.hash, "genesis block created");

        Ok(Self {
            blocks: vec![genesis],
            pending: VecDeque::new(),
            rejected: Vec::new(),
            known_ids: HashSet::new(),
        })
    }
}

/// In-memory append-only ledger.
///
/// `submit` and commits are serialized on internal locks; readers observe
/// consistent snapshots and never block each other. The consensus sleep
/// happens with no state lock held, so readers stay live during a commit.
pub struct Ledger {
    config: LedgerConfig,
    validator: SmartContractValidator,
    state: RwLock<ChainState>,
    /// Serializes the commit path (drain → sleep → mine → append)
    commit_lock: Mutex<()>,
}

impl Ledger {
    /// Construct a ledger with the genesis block already committed
    pub fn new(config: LedgerConfig, validator: SmartContractValidator) -> Result<Self> {
        let state = ChainState::bootstrap(&config)?;
        Ok(Self {
            config,
            validator,
            state: RwLock::new(state),
            commit_lock: Mutex::new(()),
        })
    }

    pub fn validator(&self) -> &SmartContractValidator {
        &self.validator
    }

    /// Validate and enqueue a transaction.
    ///
    /// A passing transaction enters the pending pool; a failing one is
    /// recorded in the rejection log and never reaches a block. Duplicate
    /// ids (pending or committed) are rejected outright.
    pub async fn submit(&self, mut tx: Transaction) -> ValidationReport {
        let mut state = self.state.write().await;

        if state.known_ids.contains(&tx.transaction_id) {
            let report = ValidationReport::rejection(
                "DUPLICATE_TX",
                format!("transaction id {} already known", tx.transaction_id),
            );
            warn!(tx_id = %tx.transaction_id, "duplicate transaction rejected");
            tx.validation_status = ValidationStatus::Rejected;
            tx.validation_report = Some(report.clone());
            state.rejected.push(tx);
            return report;
        }

        let report = self.validator.validate(&tx);
        tx.validation_report = Some(report.clone());

        if report.valid {
            tx.validation_status = ValidationStatus::Validated;
            debug!(tx_id = %tx.transaction_id, "transaction validated and pooled");
            state.known_ids.insert(tx.transaction_id.clone());
            state.pending.push_back(tx);
        } else {
            tx.validation_status = ValidationStatus::Rejected;
            warn!(
                tx_id = %tx.transaction_id,
                reason = %report.overall_reason,
                "transaction rejected"
            );
            state.rejected.push(tx);
        }

        report
    }

    /// Drain up to `batch_size` pending transactions into a new block.
    /// Returns `None` when the pool is empty.
    pub async fn commit(&self) -> Result<Option<Block>> {
        self.commit_batch(self.config.batch_size).await
    }

    /// Force an immediate single-transaction commit. Used by the decision
    /// recorder so each coordinated agreement lands in its own block.
    pub async fn commit_auto(&self) -> Result<Option<Block>> {
        self.commit_batch(1).await
    }

    async fn commit_batch(&self, batch_size: usize) -> Result<Option<Block>> {
        let _guard = self.commit_lock.lock().await;

        // Snapshot the batch without holding the write lock through the
        // consensus sleep. Submissions only append, so the front of the
        // pool is stable while the commit lock is held.
        let (batch, previous_hash, index) = {
            let state = self.state.read().await;
            if state.pending.is_empty() {
                return Ok(None);
            }
            let batch: Vec<Transaction> = state
                .pending
                .iter()
                .take(batch_size)
                .cloned()
                .collect();
            let tail = state
                .blocks
                .last()
                .ok_or_else(|| BlockOpsError::Internal("chain has no genesis".into()))?;
            (batch, tail.hash.clone(), tail.index + 1)
        };

        self.consensus_delay().await;

        let drained = batch.len();
        let mut block = Block::new(
            index,
            Utc::now(),
            BlockPayload::transactions(batch),
            previous_hash,
        )?;
        block.mine(self.config.difficulty)?;

        // Self-check before the chain sees the block; a failure here leaves
        // the pending pool untouched.
        if block.hash != block.calculate_hash()? {
            return Err(BlockOpsError::LedgerRejected(format!(
                "block {} failed its own hash check at commit time",
                block.index
            )));
        }

        let mut state = self.state.write().await;
        state.pending.drain(..drained);
        state.blocks.push(block.clone());
        info!(
            index = block.index,
            hash = %block.hash,
            transactions = drained,
            "block committed"
        );

        Ok(Some(block))
    }

    /// Simulated PBFT ordering: a uniform-random sleep per commit. This is
    /// the only randomness and the only blocking in the ledger, isolated
    /// here so a real ordering protocol can replace it.
    async fn consensus_delay(&self) {
        let [lo, hi] = self.config.consensus_delay_secs;
        if hi <= 0.0 {
            return;
        }
        let secs = if hi > lo {
            rand::thread_rng().gen_range(lo..hi)
        } else {
            lo
        };
        debug!(delay_secs = secs, "entering consensus");
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    /// Walk the whole chain and report every integrity violation
    pub async fn validate_chain(&self) -> ChainReport {
        let state = self.state.read().await;
        validate_blocks(&state.blocks, self.config.difficulty)
    }

    /// Get a block by index
    pub async fn block(&self, index: u64) -> Result<Block> {
        let state = self.state.read().await;
        state
            .blocks
            .get(index as usize)
            .cloned()
            .ok_or_else(|| BlockOpsError::NotFound(format!("block {index} out of range")))
    }

    /// Get a contiguous range of blocks
    pub async fn blocks(&self, offset: usize, limit: usize) -> Vec<Block> {
        let state = self.state.read().await;
        state
            .blocks
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Locate a transaction by id across committed blocks, the pending
    /// pool and the rejection log.
    pub async fn find_transaction(&self, id: &str) -> Result<TransactionRecord> {
        let state = self.state.read().await;

        for block in &state.blocks {
            if let BlockPayload::Transactions { transactions, .. } = &block.payload {
                if let Some(tx) = transactions.iter().find(|t| t.transaction_id == id) {
                    return Ok(TransactionRecord {
                        transaction: tx.clone(),
                        block_index: Some(block.index),
                        block_hash: Some(block.hash.clone()),
                    });
                }
            }
        }

        if let Some(tx) = state.pending.iter().find(|t| t.transaction_id == id) {
            return Ok(TransactionRecord {
                transaction: tx.clone(),
                block_index: None,
                block_hash: None,
            });
        }

        if let Some(tx) = state.rejected.iter().find(|t| t.transaction_id == id) {
            return Ok(TransactionRecord {
                transaction: tx.clone(),
                block_index: None,
                block_hash: None,
            });
        }

        Err(BlockOpsError::NotFound(format!("transaction {id}")))
    }

    /// Committed transactions in chain order, optionally filtered by agent
    pub async fn history(&self, agent_name: Option<&str>) -> Vec<CommittedTransaction> {
        let state = self.state.read().await;
        let mut out = Vec::new();
        for block in &state.blocks {
            if let BlockPayload::Transactions { transactions, .. } = &block.payload {
                for tx in transactions {
                    if agent_name.is_none() || agent_name == Some(tx.agent_name.as_str()) {
                        out.push(CommittedTransaction {
                            block_index: block.index,
                            block_hash: block.hash.clone(),
                            block_timestamp: block.timestamp,
                            transaction: tx.clone(),
                        });
                    }
                }
            }
        }
        out
    }

    /// Transactions refused at submission, kept for observability
    pub async fn rejected(&self) -> Vec<Transaction> {
        self.state.read().await.rejected.clone()
    }

    pub async fn pending_count(&self) -> usize {
        self.state.read().await.pending.len()
    }

    pub async fn stats(&self) -> LedgerStats {
        let state = self.state.read().await;
        let mut total = 0usize;
        let mut validated = 0usize;
        for block in &state.blocks {
            if let BlockPayload::Transactions { transactions, .. } = &block.payload {
                total += transactions.len();
                validated += transactions
                    .iter()
                    .filter(|t| t.validation_status == ValidationStatus::Validated)
                    .count();
            }
        }
        let report = validate_blocks(&state.blocks, self.config.difficulty);

        LedgerStats {
            total_blocks: state.blocks.len(),
            total_transactions: total,
            validated_transactions: validated,
            rejected_transactions: state.rejected.len(),
            pending: state.pending.len(),
            chain_valid: report.valid,
            latest_block_hash: state
                .blocks
                .last()
                .map(|b| b.hash.clone())
                .unwrap_or_default(),
            genesis_hash: state
                .blocks
                .first()
                .map(|b| b.hash.clone())
                .unwrap_or_default(),
        }
    }

    /// Wipe all state and re-create the genesis block. Demo-only; must not
    /// run while an engine task owns a session.
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.commit_lock.lock().await;
        let fresh = ChainState::bootstrap(&self.config)?;
        let mut state = self.state.write().await;
        *state = fresh;
        info!("ledger reset to genesis");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn tamper(&self, index: usize, f: impl FnOnce(&mut Block)) {
        let mut state = self.state.write().await;
        f(&mut state.blocks[index]);
    }
}

/// Chain validation over a block slice. Read-only and deterministic.
fn validate_blocks(blocks: &[Block], difficulty: usize) -> ChainReport {
    let mut errors = Vec::new();

    let Some(genesis) = blocks.first() else {
        return ChainReport {
            valid: false,
            errors: vec!["chain is empty".to_string()],
            blocks_checked: 0,
        };
    };

    if genesis.index != 0 {
        errors.push(format!("genesis block has index {}", genesis.index));
    }
    if !genesis.previous_hash.is_empty() {
        errors.push("genesis block has non-empty previous_hash".to_string());
    }
    if !genesis.payload.is_genesis() {
        errors.push("genesis block payload is not a genesis descriptor".to_string());
    }

    for (i, block) in blocks.iter().enumerate() {
        match block.calculate_hash() {
            Ok(expected) if expected == block.hash => {}
            Ok(expected) => errors.push(format!(
                "block {} hash invalid: stored {}, calculated {}",
                i, block.hash, expected
            )),
            Err(e) => errors.push(format!("block {i} hash uncomputable: {e}")),
        }

        if !meets_difficulty(&block.hash, difficulty) {
            errors.push(format!(
                "block {i} hash does not satisfy difficulty {difficulty}"
            ));
        }

        if i > 0 && block.previous_hash != blocks[i - 1].hash {
            errors.push(format!(
                "block {} previous_hash mismatch: expected {}, got {}",
                i,
                blocks[i - 1].hash,
                block.previous_hash
            ));
        }
    }

    ChainReport {
        valid: errors.is_empty(),
        errors,
        blocks_checked: blocks.len(),
    }
}
