//! Block model, canonical hashing and mining

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

use super::transaction::Transaction;

/// Genesis block descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisInfo {
    pub message: String,
    pub network: String,
    pub version: String,
    pub consensus: String,
    pub created_at: DateTime<Utc>,
}

impl Default for GenesisInfo {
    fn default() -> Self {
        Self {
            message: "Hospital operations ledger genesis block".to_string(),
            network: "Hospital Operations Network".to_string(),
            version: "1.0.0".to_string(),
            consensus: "Simulated PBFT".to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Block payload — either the genesis descriptor or a batch of transactions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BlockPayload {
    #[serde(rename = "GENESIS")]
    Genesis(GenesisInfo),
    #[serde(rename = "TRANSACTION_BLOCK")]
    Transactions {
        transaction_count: usize,
        transactions: Vec<Transaction>,
    },
}

impl BlockPayload {
    pub fn transactions(txs: Vec<Transaction>) -> Self {
        BlockPayload::Transactions {
            transaction_count: txs.len(),
            transactions: txs,
        }
    }

    pub fn is_genesis(&self) -> bool {
        matches!(self, BlockPayload::Genesis(_))
    }
}

/// An immutable chain entry. Committed blocks are never mutated; `hash`
/// is derived from every other field under the canonical encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    /// Hex digest of the prior block's hash; empty string for genesis
    pub previous_hash: String,
    pub payload: BlockPayload,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    /// Build a block and compute its initial hash (nonce 0, unmined)
    pub fn new(
        index: u64,
        timestamp: DateTime<Utc>,
        payload: BlockPayload,
        previous_hash: String,
    ) -> Result<Self> {
        let mut block = Self {
            index,
            timestamp,
            previous_hash,
            payload,
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.calculate_hash()?;
        Ok(block)
    }

    /// Canonical encoding: `index`, RFC 3339 timestamp, canonical JSON of
    /// the payload (object keys sorted lexicographically), `previous_hash`
    /// and the decimal nonce, concatenated and hashed with SHA-256.
    pub fn calculate_hash(&self) -> Result<String> {
        // Round-tripping through Value sorts every object's keys.
        let canonical_payload = serde_json::to_value(&self.payload)?.to_string();
        let input = format!(
            "{}{}{}{}{}",
            self.index,
            self.timestamp.to_rfc3339(),
            canonical_payload,
            self.previous_hash,
            self.nonce
        );

        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Increment the nonce until the hash satisfies the difficulty
    /// predicate. Difficulty 0 accepts the first attempt.
    pub fn mine(&mut self, difficulty: usize) -> Result<()> {
        while !meets_difficulty(&self.hash, difficulty) {
            self.nonce += 1;
            self.hash = self.calculate_hash()?;
        }
        Ok(())
    }
}

/// Difficulty predicate: `difficulty` leading `'0'` hex characters
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.bytes().take(difficulty).all(|b| b == b'0') && hash.len() >= difficulty
}
