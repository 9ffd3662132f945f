//! Agent directory.
//!
//! Resolves agent identifiers to display names for the chat view. The map
//! is fetched once per chat session; a lookup miss falls back to a generic
//! label rather than blocking the render.

use std::collections::HashMap;
use std::sync::Arc;

use crate::api::ChatApi;

/// Display-name fallback when an agent id isn't in the directory.
pub const UNKNOWN_AGENT_LABEL: &str = "AI Agent";

/// Session-scoped, read-only cache of agent display names.
#[derive(Debug, Default)]
pub struct AgentDirectory {
    names: HashMap<String, String>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the directory from the backend. Failures are logged and leave
    /// the cache empty; names degrade to the fallback label.
    pub async fn load(api: &Arc<dyn ChatApi>) -> Self {
        match api.agent_list().await {
            Ok(response) => Self {
                names: response
                    .agents
                    .into_iter()
                    .map(|agent| (agent.id, agent.name))
                    .collect(),
            },
            Err(e) => {
                tracing::warn!("failed to fetch agent names: {e}");
                Self::default()
            }
        }
    }

    pub fn display_name(&self, agent_id: &str) -> &str {
        self.names
            .get(agent_id)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_AGENT_LABEL)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Human label for the numeric agent state code used by the list endpoint.
pub fn agent_state_label(state: i32) -> &'static str {
    match state {
        0 | 1 => "active",
        2 => "error",
        _ => "unknown",
    }
}
