use async_trait::async_trait;
use bizflow_core::{Agent, AgentId, AgentInput, AgentOutput, BizflowResult};

/// Deterministic agent used when no model is configured.
///
/// It reports what it was asked to do and what it could see, which is enough
/// to drive the gates and revision loops end to end without network access.
pub struct OfflineAgent {
    id: AgentId,
}

impl OfflineAgent {
    pub fn new(id: AgentId) -> Self {
        Self { id }
    }
}

#[async_trait]
impl Agent for OfflineAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    async fn invoke(&self, input: AgentInput<'_>) -> BizflowResult<AgentOutput> {
        let seen: Vec<String> = input
            .accumulated_results
            .keys()
            .filter(|a| **a != self.id)
            .map(ToString::to_string)
            .collect();

        let mut summary = format!(
            "{} handled \"{}\" (iteration {})",
            self.id, input.task_description, input.iteration
        );
        if let Some(feedback) = input.feedback {
            summary.push_str(&format!(" with feedback \"{feedback}\""));
        }

        Ok(AgentOutput::new(summary).with_data(serde_json::json!({
            "offline": true,
            "prior_results": seen,
            "history_len": input.execution_history.len(),
        })))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_offline_agent_reports_context() {
        let mut results = BTreeMap::new();
        results.insert(AgentId::Coordinator, AgentOutput::new("framed"));
        results.insert(AgentId::Invoice, AgentOutput::new("old invoice result"));

        let agent = OfflineAgent::new(AgentId::Invoice);
        let out = agent
            .invoke(AgentInput {
                workflow_id: Uuid::new_v4(),
                iteration: 2,
                task_description: "pay vendors",
                accumulated_results: &results,
                execution_history: &[],
                feedback: Some("only Acme"),
            })
            .await
            .unwrap();

        assert_eq!(
            out.summary,
            "invoice handled \"pay vendors\" (iteration 2) with feedback \"only Acme\""
        );
        assert_eq!(out.data["prior_results"], serde_json::json!(["coordinator"]));
        assert_eq!(out.data["offline"], true);
    }
}
