pub mod agents;
pub mod config;
pub mod coordination;
pub mod error;
pub mod ledger;

pub use agents::{
    AgentRegistry, ConstraintRecord, CritiqueDecision, FacilityAgent, FinancialAgent, Proposal,
    ReasoningAgent, SupplyChainAgent, Verdict,
};
pub use config::AppConfig;
pub use coordination::{
    CoordinationSession, Coordinator, Message, MessageKind, ScenarioContext, ScenarioSpec,
    SessionState, Urgency,
};
pub use error::{BlockOpsError, Result};
pub use ledger::{
    Block, BlockPayload, ChainReport, DecisionRecorder, Ledger, LedgerReceipt, LedgerStats,
    SmartContractValidator, Transaction, ValidationReport, ValidationStatus,
};
