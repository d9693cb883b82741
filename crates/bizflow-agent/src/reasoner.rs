use crate::llm::LlmBackend;
use crate::profiles;
use async_trait::async_trait;
use bizflow_core::{BizflowError, BizflowResult, EntryOutcome, PlanRequest, RawProposal, Reasoner};
use std::fmt::Write;
use std::sync::Arc;
use tracing::debug;

/// Most recent history entries included in a planning prompt.
const HISTORY_WINDOW: usize = 20;

const PLANNER_SYSTEM_PROMPT: &str = "You plan business-automation workflows. \
Pick the agents needed for the task, in execution order, each at most once. \
The coordinator is mandatory. Reply with a single JSON object and nothing else.";

/// Reasoner that asks a language model for a JSON plan.
///
/// The reply is not trusted: the orchestrator's planner validates it and
/// falls back on anything unusable.
pub struct LlmReasoner {
    backend: Arc<dyn LlmBackend>,
}

impl LlmReasoner {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Reasoner for LlmReasoner {
    async fn propose(&self, request: PlanRequest<'_>) -> BizflowResult<RawProposal> {
        let prompt = planning_prompt(&request);
        let reply = self
            .backend
            .complete(Some(PLANNER_SYSTEM_PROMPT), &prompt)
            .await
            .map_err(|e| BizflowError::Planning(e.to_string()))?;
        debug!(reply_len = reply.len(), "Planner reply received");
        parse_proposal(&reply)
    }
}

/// Build the user message for a planning call.
pub fn planning_prompt(request: &PlanRequest<'_>) -> String {
    let mut prompt = String::from("Available agents:\n");
    for p in profiles::all() {
        let _ = writeln!(prompt, "- {}: {}", p.id, p.capability);
    }

    let _ = write!(prompt, "\nTask:\n{}\n", request.task_description);

    if !request.history.is_empty() {
        prompt.push_str("\nPrevious executions (most recent last):\n");
        let skip = request.history.len().saturating_sub(HISTORY_WINDOW);
        for entry in &request.history[skip..] {
            let outcome = match &entry.outcome {
                EntryOutcome::Succeeded => "ok".to_string(),
                EntryOutcome::Failed { error } => format!("failed: {error}"),
                EntryOutcome::TimedOut { error } => format!("timed out: {error}"),
            };
            let _ = writeln!(
                prompt,
                "- iteration {} {}: {} ({outcome})",
                entry.iteration, entry.agent, entry.result_summary
            );
        }
    }

    if let Some(feedback) = request.feedback {
        let _ = write!(prompt, "\nReviewer feedback on the last attempt:\n{feedback}\n");
    }

    prompt.push_str(
        "\nRespond with JSON: {\"sequence\": [agent names], \"rationale\": {agent: reason}, \
         \"confidence\": 0.0-1.0, \"complexity\": \"simple\"|\"moderate\"|\"complex\"}",
    );
    prompt
}

/// Pull the JSON object out of a model reply that may wrap it in prose or a
/// code fence.
pub fn parse_proposal(reply: &str) -> BizflowResult<RawProposal> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &reply[s..=e],
        _ => {
            return Err(BizflowError::Planning(
                "reply contains no JSON object".into(),
            ))
        }
    };
    serde_json::from_str(json).map_err(|e| BizflowError::Planning(format!("malformed plan: {e}")))
}
