use std::sync::Arc;

use crate::agent::{Agent, AgentInfo};

/// Shared application state
///
/// Agents are built once at startup and immutable afterwards; their
/// session and knowledge pools synchronise access internally.
pub struct AppState {
    agents: Vec<Arc<Agent>>,
}

impl AppState {
    pub fn new(agents: Vec<Agent>) -> Self {
        Self {
            agents: agents.into_iter().map(Arc::new).collect(),
        }
    }

    /// Look up an agent by its URL id
    pub fn agent(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.agents
            .iter()
            .find(|agent| agent.id() == agent_id)
            .cloned()
    }

    pub fn agent_infos(&self) -> Vec<AgentInfo> {
        self.agents.iter().map(|agent| agent.info()).collect()
    }
}
