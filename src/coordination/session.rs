//! Session lifecycle — scenario input, state machine, negotiation records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::agents::{ConstraintMap, CritiqueDecision, Proposal};
use crate::error::{BlockOpsError, Result};
use crate::ledger::LedgerReceipt;

use super::message::Message;

/// Scenario urgency, folded into proposal confidence by the built-in agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Numeric and categorical scenario facts shared with every participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioContext {
    pub item: String,
    #[serde(default)]
    pub current_stock: u64,
    pub required_quantity: u64,
    pub price_per_unit: Decimal,
    pub budget_remaining: Decimal,
    pub storage_available: u64,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
}

/// Input to [`crate::coordination::Coordinator::coordinate`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub initiator: String,
    pub participants: Vec<String>,
    pub intent: String,
    pub context: ScenarioContext,
}

/// Protocol state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Initiated,
    CollectingConstraints,
    GeneratingProposal,
    Negotiating,
    Validating,
    Executing,
    Completed,
    Failed,
    Timeout,
}

impl SessionState {
    /// Terminal states are frozen: no further transitions or mutations
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Timeout
        )
    }

    /// Legal forward edges of the protocol
    pub fn can_transition(&self, next: SessionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        // Any live state may fail or time out.
        if matches!(next, SessionState::Failed | SessionState::Timeout) {
            return true;
        }
        matches!(
            (self, next),
            (SessionState::Initiated, SessionState::CollectingConstraints)
                | (SessionState::CollectingConstraints, SessionState::GeneratingProposal)
                | (SessionState::GeneratingProposal, SessionState::Negotiating)
                | (SessionState::Negotiating, SessionState::Validating)
                | (SessionState::Validating, SessionState::Executing)
                | (SessionState::Executing, SessionState::Completed)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Initiated => "INITIATED",
            SessionState::CollectingConstraints => "COLLECTING_CONSTRAINTS",
            SessionState::GeneratingProposal => "GENERATING_PROPOSAL",
            SessionState::Negotiating => "NEGOTIATING",
            SessionState::Validating => "VALIDATING",
            SessionState::Executing => "EXECUTING",
            SessionState::Completed => "COMPLETED",
            SessionState::Failed => "FAILED",
            SessionState::Timeout => "TIMEOUT",
        };
        write!(f, "{s}")
    }
}

/// One proposal-plus-critiques cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationRound {
    pub round_number: u32,
    pub proposal: Proposal,
    pub critiques: Vec<CritiqueDecision>,
    pub duration_secs: f64,
}

/// Structured reason attached to FAILED / TIMEOUT sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReason {
    pub code: String,
    pub detail: String,
}

/// The accepted outcome of a negotiation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agreement {
    pub session_id: String,
    pub proposal: Proposal,
    pub participants: Vec<String>,
    pub reached_at: DateTime<Utc>,
}

/// Full record of one protocol execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationSession {
    pub session_id: String,
    pub state: SessionState,
    pub initiator: String,
    pub participants: Vec<String>,
    pub intent: String,
    pub context: ScenarioContext,
    pub constraints: ConstraintMap,
    pub rounds: Vec<NegotiationRound>,
    pub final_proposal: Option<Proposal>,
    pub agreement: Option<Agreement>,
    pub ledger_receipt: Option<LedgerReceipt>,
    pub messages: Vec<Message>,
    pub failure: Option<FailureReason>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl CoordinationSession {
    pub fn new(session_id: String, spec: &ScenarioSpec) -> Self {
        Self {
            session_id,
            state: SessionState::Initiated,
            initiator: spec.initiator.clone(),
            participants: spec.participants.clone(),
            intent: spec.intent.clone(),
            context: spec.context.clone(),
            constraints: ConstraintMap::new(),
            rounds: Vec::new(),
            final_proposal: None,
            agreement: None,
            ledger_receipt: None,
            messages: Vec::new(),
            failure: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move to `next`, rejecting transitions the protocol forbids
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition(next) {
            return Err(BlockOpsError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            state: self.state,
            initiator: self.initiator.clone(),
            intent: self.intent.clone(),
            rounds: self.rounds.len() as u32,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

/// Compact row for session listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub state: SessionState,
    pub initiator: String,
    pub intent: String,
    pub rounds: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}
