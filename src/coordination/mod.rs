//! Coordination protocol — messages, sessions and the eight-step engine

mod engine;
mod message;
mod session;

pub use engine::Coordinator;
pub use message::{Message, MessageKind, COORDINATOR, SMART_CONTRACT};
pub use session::{
    Agreement, CoordinationSession, FailureReason, NegotiationRound, ScenarioContext,
    ScenarioSpec, SessionState, SessionSummary, Urgency,
};
