//! Agent registry — id → agent lookup with stable registration order

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::error::{BlockOpsError, Result};

use super::traits::ReasoningAgent;

/// Compact registry row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInfo {
    pub id: String,
    pub role: String,
}

#[derive(Default)]
struct RegistryState {
    agents: HashMap<String, Arc<dyn ReasoningAgent>>,
    /// Registration order; constraint queries and critiques follow it so
    /// session logs are deterministic for a given registration sequence.
    order: Vec<String>,
}

/// Shared, read-mostly agent registry. Lookups clone the `Arc` out, so no
/// lock is ever held across a capability call.
#[derive(Default)]
pub struct AgentRegistry {
    state: RwLock<RegistryState>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent. Idempotent per id: re-registering replaces the
    /// agent and keeps its original order slot.
    pub fn register(&self, agent: Arc<dyn ReasoningAgent>) {
        let id = agent.id().to_string();
        let role = agent.role().to_string();
        let mut state = self.state.write().expect("registry lock poisoned");
        if state.agents.insert(id.clone(), agent).is_none() {
            state.order.push(id.clone());
        }
        info!(agent_id = %id, %role, "agent registered");
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn ReasoningAgent>> {
        let state = self.state.read().expect("registry lock poisoned");
        state
            .agents
            .get(id)
            .cloned()
            .ok_or_else(|| BlockOpsError::UnknownAgent(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        let state = self.state.read().expect("registry lock poisoned");
        state.agents.contains_key(id)
    }

    /// Registered agents in registration order
    pub fn list(&self) -> Vec<AgentInfo> {
        let state = self.state.read().expect("registry lock poisoned");
        state
            .order
            .iter()
            .filter_map(|id| {
                state.agents.get(id).map(|agent| AgentInfo {
                    id: id.clone(),
                    role: agent.role().to_string(),
                })
            })
            .collect()
    }

    /// Order the given ids by registration sequence, preserving relative
    /// order for ids registered earlier.
    pub fn in_registration_order<'a>(&self, ids: &'a [String]) -> Vec<&'a String> {
        let state = self.state.read().expect("registry lock poisoned");
        let mut out: Vec<&String> = ids.iter().collect();
        out.sort_by_key(|id| {
            state
                .order
                .iter()
                .position(|o| o == *id)
                .unwrap_or(usize::MAX)
        });
        out
    }
}
