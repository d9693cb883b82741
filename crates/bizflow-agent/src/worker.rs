use crate::llm::LlmBackend;
use crate::profiles::{self, AgentProfile};
use async_trait::async_trait;
use bizflow_core::{Agent, AgentId, AgentInput, AgentOutput, BizflowError, BizflowResult};
use std::fmt::Write;
use std::sync::Arc;
use tracing::info;

/// Longest summary copied into the execution history.
const SUMMARY_MAX_CHARS: usize = 200;

/// An agent that runs its role prompt against a language model.
pub struct LlmAgent {
    profile: &'static AgentProfile,
    backend: Arc<dyn LlmBackend>,
}

impl LlmAgent {
    pub fn new(id: AgentId, backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            profile: profiles::profile(id),
            backend,
        }
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn id(&self) -> AgentId {
        self.profile.id
    }

    async fn invoke(&self, input: AgentInput<'_>) -> BizflowResult<AgentOutput> {
        let prompt = agent_prompt(&input);
        let text = self
            .backend
            .complete(Some(self.profile.system_prompt), &prompt)
            .await
            .map_err(|e| BizflowError::AgentFailure {
                agent: self.profile.id,
                message: e.to_string(),
            })?;

        info!(
            workflow_id = %input.workflow_id,
            agent = %self.profile.id,
            iteration = input.iteration,
            reply_len = text.len(),
            "Agent reply received"
        );

        Ok(AgentOutput::new(summarize(&text)).with_data(serde_json::json!({ "text": text })))
    }
}

/// Build the user message for one agent run.
pub fn agent_prompt(input: &AgentInput<'_>) -> String {
    let mut prompt = format!("Task:\n{}\n", input.task_description);

    if !input.accumulated_results.is_empty() {
        prompt.push_str("\nResults so far:\n");
        for (agent, output) in input.accumulated_results {
            let _ = writeln!(prompt, "- {agent}: {}", output.summary);
        }
    }

    if let Some(feedback) = input.feedback {
        let _ = write!(prompt, "\nReviewer feedback:\n{feedback}\n");
    }
    prompt
}

/// First non-empty line, trimmed to a history-friendly length.
pub fn summarize(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("(empty reply)");
    if line.chars().count() <= SUMMARY_MAX_CHARS {
        line.to_string()
    } else {
        let cut: String = line.chars().take(SUMMARY_MAX_CHARS).collect();
        format!("{cut}…")
    }
}
