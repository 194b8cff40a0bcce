//! Typed agent-communication messages (FIPA-ACL inspired)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known sender id for engine-originated messages
pub const COORDINATOR: &str = "COORDINATOR";
/// Well-known sender id for validator-originated messages
pub const SMART_CONTRACT: &str = "SMART_CONTRACT";

/// Message performatives exchanged during a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// "I need to order supplies"
    Intent,
    /// "What are your constraints?"
    Query,
    /// "My budget limit is $X"
    Constraint,
    /// Announcements from the engine
    Inform,
    /// "I propose ordering Y units at $Z"
    Proposal,
    /// "Proposal exceeds my limit by $W"
    Critique,
    /// "Proposal approved"
    Accept,
    /// "Proposal rejected"
    Reject,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageKind::Intent => "intent",
            MessageKind::Query => "query",
            MessageKind::Constraint => "constraint",
            MessageKind::Inform => "inform",
            MessageKind::Proposal => "proposal",
            MessageKind::Critique => "critique",
            MessageKind::Accept => "accept",
            MessageKind::Reject => "reject",
        };
        write!(f, "{s}")
    }
}

/// A single entry in a session's append-only message log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub recipients: Vec<String>,
    pub kind: MessageKind,
    /// Structured payload; shape depends on `kind`
    pub content: Value,
}
