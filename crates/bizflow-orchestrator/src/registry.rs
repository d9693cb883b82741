use bizflow_core::{Agent, AgentId};
use std::collections::HashMap;
use std::sync::Arc;

/// The agents available for execution, keyed by id.
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: HashMap<AgentId, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its own id, replacing any previous one.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.insert(agent.id(), agent);
    }

    pub fn with(mut self, agent: Arc<dyn Agent>) -> Self {
        self.register(agent);
        self
    }

    pub fn get(&self, id: AgentId) -> Option<Arc<dyn Agent>> {
        self.agents.get(&id).cloned()
    }

    /// Registered ids in canonical order.
    pub fn ids(&self) -> Vec<AgentId> {
        AgentId::ALL
            .into_iter()
            .filter(|id| self.agents.contains_key(id))
            .collect()
    }

    /// Agents of `sequence` without a registration.
    pub fn missing(&self, sequence: &[AgentId]) -> Vec<AgentId> {
        sequence
            .iter()
            .copied()
            .filter(|id| !self.agents.contains_key(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bizflow_core::{AgentInput, AgentOutput, BizflowResult};

    struct Echo(AgentId);

    #[async_trait]
    impl Agent for Echo {
        fn id(&self) -> AgentId {
            self.0
        }

        async fn invoke(&self, input: AgentInput<'_>) -> BizflowResult<AgentOutput> {
            Ok(AgentOutput::new(input.task_description))
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = AgentRegistry::new()
            .with(Arc::new(Echo(AgentId::Analysis)))
            .with(Arc::new(Echo(AgentId::Coordinator)));
        assert_eq!(registry.ids(), vec![AgentId::Coordinator, AgentId::Analysis]);
        assert!(registry.get(AgentId::Crm).is_none());
        assert_eq!(
            registry.missing(&[AgentId::Coordinator, AgentId::Crm]),
            vec![AgentId::Crm]
        );
    }
}
