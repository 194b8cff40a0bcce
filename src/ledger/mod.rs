//! Append-only ledger — hash-chained block store with smart-contract gating
//!
//! Single-writer, in-process model: transactions enter a pending pool via
//! [`Ledger::submit`] (gated by the [`SmartContractValidator`]), and commits
//! drain the pool into mined blocks behind a simulated consensus delay.

mod block;
mod chain;
mod recorder;
mod transaction;
mod validator;

pub use block::{Block, BlockPayload, GenesisInfo};
pub use chain::{ChainReport, CommittedTransaction, Ledger, LedgerStats, TransactionRecord};
pub use recorder::{DecisionRecorder, LedgerReceipt};
pub use transaction::{
    detail_decimal, detail_f64, CheckReport, Transaction, ValidationReport, ValidationStatus,
};
pub use validator::SmartContractValidator;
