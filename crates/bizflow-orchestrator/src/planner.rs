use bizflow_core::{
    AgentId, Complexity, HistoryEntry, PlanRequest, RawProposal, Reasoner, WorkflowEvent,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Sequence used whenever no valid proposal is available.
pub const FALLBACK_SEQUENCE: [AgentId; 2] = [AgentId::Coordinator, AgentId::Analysis];

/// A validated agent sequence with its explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub sequence: Vec<AgentId>,
    pub rationale: BTreeMap<AgentId, String>,
    /// In `[0, 1]`. Zero for the fallback.
    pub confidence: f32,
    pub complexity: Complexity,
    /// Why the planner fell back, if it did.
    pub fallback_reason: Option<String>,
}

impl Plan {
    /// The default sequence, carrying the reason the proposal was unusable.
    pub fn fallback(reason: impl Into<String>) -> Self {
        let rationale = BTreeMap::from([
            (
                AgentId::Coordinator,
                "Frame the task and coordinate the run".to_string(),
            ),
            (
                AgentId::Analysis,
                "Summarize findings for the reviewer".to_string(),
            ),
        ]);
        Self {
            sequence: FALLBACK_SEQUENCE.to_vec(),
            rationale,
            confidence: 0.0,
            complexity: Complexity::from_len(FALLBACK_SEQUENCE.len()),
            fallback_reason: Some(reason.into()),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }

    /// The plan as a plan-gate request.
    pub fn to_event(&self, request_id: &str, task_description: &str) -> WorkflowEvent {
        WorkflowEvent::PlanApprovalRequest {
            request_id: request_id.to_string(),
            task_description: task_description.to_string(),
            sequence: self.sequence.clone(),
            rationale: self.rationale.clone(),
            confidence: self.confidence,
            complexity: self.complexity,
            estimated_steps: self.sequence.len(),
            fallback_reason: self.fallback_reason.clone(),
        }
    }

    /// Check a raw proposal. Any problem is returned as the fallback reason.
    pub fn validate(raw: RawProposal) -> Result<Self, String> {
        let sequence = AgentId::parse_list(&raw.sequence).map_err(|e| e.to_string())?;
        AgentId::validate_sequence(&sequence)?;

        let mut rationale = BTreeMap::new();
        for (name, text) in raw.rationale {
            if let Ok(agent) = name.parse::<AgentId>() {
                if sequence.contains(&agent) {
                    rationale.insert(agent, text);
                }
            }
        }
        for agent in &sequence {
            rationale
                .entry(*agent)
                .or_insert_with(|| "No rationale provided".to_string());
        }

        let confidence = if raw.confidence.is_finite() {
            raw.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let complexity = raw
            .complexity
            .as_deref()
            .and_then(Complexity::parse_label)
            .unwrap_or_else(|| Complexity::from_len(sequence.len()));

        Ok(Self {
            sequence,
            rationale,
            confidence,
            complexity,
            fallback_reason: None,
        })
    }
}

/// Turns a task into an agent sequence.
///
/// Never fails: an absent, slow, erroring or nonsensical reasoner yields
/// [`Plan::fallback`].
pub struct SequencePlanner {
    reasoner: Option<Arc<dyn Reasoner>>,
    timeout: Duration,
}

impl SequencePlanner {
    pub fn new(reasoner: Option<Arc<dyn Reasoner>>, timeout: Duration) -> Self {
        Self { reasoner, timeout }
    }

    pub async fn propose(
        &self,
        task_description: &str,
        history: &[HistoryEntry],
        feedback: Option<&str>,
    ) -> Plan {
        let Some(reasoner) = &self.reasoner else {
            return fallback("no reasoning backend configured");
        };

        let request = PlanRequest {
            task_description,
            history,
            feedback,
        };
        let raw = match tokio::time::timeout(self.timeout, reasoner.propose(request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return fallback(format!("reasoning backend error: {e}")),
            Err(_) => {
                return fallback(format!(
                    "reasoning backend timed out after {}s",
                    self.timeout.as_secs()
                ))
            }
        };

        match Plan::validate(raw) {
            Ok(plan) => {
                info!(
                    sequence = ?plan.sequence,
                    confidence = plan.confidence,
                    "Planner: proposal accepted"
                );
                plan
            }
            Err(reason) => fallback(format!("invalid proposal: {reason}")),
        }
    }
}

fn fallback(reason: impl Into<String>) -> Plan {
    let plan = Plan::fallback(reason);
    warn!(
        reason = plan.fallback_reason.as_deref().unwrap_or_default(),
        "Planner: using fallback sequence"
    );
    plan
}
