//! LLM-backed collaborators for the bizflow orchestrator.
//!
//! [`LlmReasoner`] proposes agent sequences and [`LlmAgent`] runs a single
//! agent, both through an [`LlmBackend`] (the Claude Messages API by default).
//! [`OfflineAgent`] stands in for every agent when no model is configured.

pub mod config;
pub mod llm;
pub mod offline;
pub mod profiles;
pub mod reasoner;
pub mod worker;

pub use config::ModelConfig;
pub use llm::{ClaudeBackend, LlmBackend};
pub use offline::OfflineAgent;
pub use profiles::AgentProfile;
pub use reasoner::LlmReasoner;
pub use worker::LlmAgent;

use bizflow_core::{Agent, AgentId};
use std::sync::Arc;

/// One agent per known id: model-backed when a backend is given, offline otherwise.
pub fn default_agents(backend: Option<Arc<dyn LlmBackend>>) -> Vec<Arc<dyn Agent>> {
    AgentId::ALL
        .iter()
        .map(|id| -> Arc<dyn Agent> {
            match &backend {
                Some(b) => Arc::new(LlmAgent::new(*id, Arc::clone(b))),
                None => Arc::new(OfflineAgent::new(*id)),
            }
        })
        .collect()
}
