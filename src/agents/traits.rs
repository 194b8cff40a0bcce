//! ReasoningAgent capability — the engine's only view of an agent
//!
//! The engine never reasons about an agent's internals: a deterministic
//! rule-based implementation and an LLM-backed one are interchangeable
//! behind this trait. New agent kinds are new implementations, never new
//! branches in the engine.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::coordination::ScenarioContext;
use crate::error::Result;

/// An agent's declared limits for one scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintRecord {
    /// Constraint family label (e.g. `financial`, `facility`)
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_quantity: Option<u64>,
    /// Agent-specific extras carried verbatim into the constraint message
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extras: Map<String, Value>,
}

impl ConstraintRecord {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            max_amount: None,
            max_quantity: None,
            extras: Map::new(),
        }
    }

    /// Placeholder recorded when a participant could not be reached
    pub fn unavailable() -> Self {
        Self::new("unavailable")
    }
}

/// Constraints keyed by participant id, in deterministic order
pub type ConstraintMap = BTreeMap<String, ConstraintRecord>;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConstraintsSatisfied {
    pub budget: bool,
    pub storage: bool,
}

/// A concrete procurement proposal produced by the initiator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub item_name: String,
    pub proposed_quantity: u64,
    pub proposed_cost: Decimal,
    pub price_per_unit: Decimal,
    pub reasoning: String,
    pub confidence: f64,
    pub constraints_satisfied: ConstraintsSatisfied,
}

/// Critique verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Accept,
    Critique,
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }
}

/// Suggested bounds attached to a critique
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Adjustment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_quantity: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<Decimal>,
}

/// One participant's decision on a proposal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CritiqueDecision {
    pub agent: String,
    /// Serialized as `decision` in message payloads
    #[serde(rename = "decision")]
    pub verdict: Verdict,
    pub reasoning: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_adjustments: Option<Adjustment>,
}

/// Capability every negotiating agent implements.
///
/// Calls may block internally (remote reasoning); the engine wraps each in
/// a deadline and never holds a lock across one.
#[async_trait]
pub trait ReasoningAgent: Send + Sync {
    /// Unique agent id
    fn id(&self) -> &str;

    /// Human-readable role
    fn role(&self) -> &str;

    /// Declare this agent's limits relevant to the scenario
    async fn propose_constraint(&self, context: &ScenarioContext) -> Result<ConstraintRecord>;

    /// Produce a proposal satisfying the collected constraints. Only the
    /// session initiator is asked; `critiques` carries the prior round's
    /// feedback and is empty on the first call.
    async fn generate_proposal(
        &self,
        context: &ScenarioContext,
        constraints: &ConstraintMap,
        critiques: &[CritiqueDecision],
    ) -> Result<Proposal>;

    /// Evaluate a proposal against this agent's own limits
    async fn critique(
        &self,
        proposal: &Proposal,
        context: &ScenarioContext,
    ) -> Result<CritiqueDecision>;
}
