use crate::agent::{AgentId, AgentOutput};
use crate::reasoning::Complexity;
use crate::BizflowResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Events pushed to the human-facing UI.
///
/// The `type` tag values are the message kinds UI clients switch on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// The plan gate opened.
    PlanApprovalRequest {
        request_id: String,
        task_description: String,
        sequence: Vec<AgentId>,
        rationale: BTreeMap<AgentId, String>,
        confidence: f32,
        complexity: Complexity,
        estimated_steps: usize,
        /// Set when the planner fell back to the default sequence.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback_reason: Option<String>,
    },
    /// The result gate opened.
    FinalResultsApprovalRequest {
        request_id: String,
        iteration: u32,
        results: BTreeMap<AgentId, AgentOutput>,
        summary: String,
    },
    /// A step transition inside a pass.
    WorkflowProgressUpdate {
        iteration: u32,
        step: usize,
        total_steps: usize,
        agent: AgentId,
    },
    /// The workflow stopped on an error or timeout.
    WorkflowError {
        stage: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<AgentId>,
        message: String,
        status: String,
    },
    /// The workflow was cancelled.
    WorkflowCancelled { reason: String },
    /// The result was approved.
    WorkflowCompleted { iterations: u32, summary: String },
}

impl WorkflowEvent {
    /// The event's `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowEvent::PlanApprovalRequest { .. } => "plan_approval_request",
            WorkflowEvent::FinalResultsApprovalRequest { .. } => "final_results_approval_request",
            WorkflowEvent::WorkflowProgressUpdate { .. } => "workflow_progress_update",
            WorkflowEvent::WorkflowError { .. } => "workflow_error",
            WorkflowEvent::WorkflowCancelled { .. } => "workflow_cancelled",
            WorkflowEvent::WorkflowCompleted { .. } => "workflow_completed",
        }
    }
}

/// Envelope around a [`WorkflowEvent`].
///
/// Delivery is at-least-once; `id` lets consumers drop duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: WorkflowEvent,
}

impl Notification {
    /// Wrap an event for a workflow.
    pub fn new(workflow_id: Uuid, event: WorkflowEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Ordered outbound channel to the human reviewer.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> BizflowResult<()>;
}
