use thiserror::Error;

/// Main error type for the coordination and ledger core
#[derive(Error, Debug)]
pub enum BlockOpsError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Scenario / engine errors
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Agent unavailable: {agent} - {reason}")]
    AgentUnavailable { agent: String, reason: String },

    #[error("No agreement after {rounds} negotiation rounds")]
    NoAgreement { rounds: u32 },

    #[error("Policy violation ({code}): {reason}")]
    PolicyViolation { code: String, reason: String },

    #[error("Deadline exceeded after {elapsed_ms}ms (budget: {budget_ms}ms)")]
    DeadlineExceeded { elapsed_ms: u64, budget_ms: u64 },

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Ledger errors
    #[error("Ledger rejected: {0}")]
    LedgerRejected(String),

    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for BlockOpsError
pub type Result<T> = std::result::Result<T, BlockOpsError>;

impl BlockOpsError {
    /// Stable reason code recorded on failed sessions
    pub fn reason_code(&self) -> &'static str {
        match self {
            BlockOpsError::InvalidScenario(_) => "INVALID_SCENARIO",
            BlockOpsError::UnknownAgent(_) => "UNKNOWN_AGENT",
            BlockOpsError::AgentUnavailable { .. } => "AGENT_UNAVAILABLE",
            BlockOpsError::NoAgreement { .. } => "NO_AGREEMENT",
            BlockOpsError::PolicyViolation { .. } => "POLICY_VIOLATION",
            BlockOpsError::LedgerRejected(_) | BlockOpsError::DuplicateTransaction(_) => {
                "LEDGER_REJECTED"
            }
            BlockOpsError::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED",
            BlockOpsError::NotFound(_) => "NOT_FOUND",
            _ => "INTERNAL",
        }
    }
}
