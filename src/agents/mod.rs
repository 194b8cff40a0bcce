//! Reasoning agents — capability trait, registry and built-in implementations
//!
//! The engine talks to agents exclusively through [`ReasoningAgent`]; the
//! registry maps ids to shared agent handles in registration order.

mod heuristic;
mod registry;
mod traits;

pub use heuristic::{FacilityAgent, FinancialAgent, SupplyChainAgent};
pub use registry::{AgentInfo, AgentRegistry};
pub use traits::{
    Adjustment, ConstraintMap, ConstraintRecord, ConstraintsSatisfied, CritiqueDecision, Proposal,
    ReasoningAgent, Verdict,
};
