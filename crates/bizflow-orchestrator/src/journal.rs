use crate::types::{ApprovalState, WorkflowState, WorkflowStatus};
use bizflow_core::{
    AgentId, AgentOutput, ApprovalKind, BizflowError, BizflowResult, Complexity, Decision,
    HistoryEntry, PassKind,
};
use bizflow_journal::Journal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// One journaled fact about a workflow.
///
/// Replaying a workflow's records in order rebuilds its state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowRecord {
    Created {
        user_id: String,
        task_description: String,
        created_at: DateTime<Utc>,
    },
    StatusChanged {
        from: WorkflowStatus,
        to: WorkflowStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    PlanProposed {
        sequence: Vec<AgentId>,
        rationale: BTreeMap<AgentId, String>,
        confidence: f32,
        complexity: Complexity,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback_reason: Option<String>,
    },
    SequenceSet {
        sequence: Vec<AgentId>,
    },
    PlanGateSkipped,
    ApprovalRecorded {
        kind: ApprovalKind,
        decision: Decision,
    },
    PassStarted {
        iteration: u32,
        stage: PassKind,
        agents: Vec<AgentId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feedback: Option<String>,
        start_time: Option<DateTime<Utc>>,
        deadline: Option<DateTime<Utc>>,
    },
    StepRecorded {
        entry: HistoryEntry,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<AgentOutput>,
    },
}

impl WorkflowRecord {
    /// The journal `kind` of this record.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowRecord::Created { .. } => "created",
            WorkflowRecord::StatusChanged { .. } => "status_changed",
            WorkflowRecord::PlanProposed { .. } => "plan_proposed",
            WorkflowRecord::SequenceSet { .. } => "sequence_set",
            WorkflowRecord::PlanGateSkipped => "plan_gate_skipped",
            WorkflowRecord::ApprovalRecorded { .. } => "approval_recorded",
            WorkflowRecord::PassStarted { .. } => "pass_started",
            WorkflowRecord::StepRecorded { .. } => "step_recorded",
        }
    }

    /// Apply this record to a state under reconstruction.
    fn apply(self, state: &mut WorkflowState) {
        match self {
            WorkflowRecord::Created { .. } => {}
            WorkflowRecord::StatusChanged { to, reason, .. } => {
                state.status = to;
                if reason.is_some() {
                    state.failure_reason = reason;
                }
            }
            WorkflowRecord::PlanProposed {
                sequence,
                rationale,
                ..
            } => {
                state.agent_sequence = sequence;
                state.rationale = rationale;
            }
            WorkflowRecord::SequenceSet { sequence } => state.agent_sequence = sequence,
            WorkflowRecord::PlanGateSkipped => state.plan_approval = ApprovalState::skipped(),
            WorkflowRecord::ApprovalRecorded { kind, decision } => match kind {
                ApprovalKind::Plan => state.plan_approval.record(&decision),
                ApprovalKind::Result => state.result_approval.record(&decision),
            },
            WorkflowRecord::PassStarted {
                iteration,
                stage,
                agents,
                feedback,
                start_time,
                deadline,
            } => {
                state.iteration = iteration;
                state.current_step = 0;
                state.pass_agents = agents;
                state.pass_kind = Some(stage);
                state.pass_feedback = feedback;
                state.result_approval = ApprovalState::pending();
                state.start_time = start_time;
                state.deadline = deadline;
            }
            WorkflowRecord::StepRecorded { entry, output } => state.record_step(entry, output),
        }
    }
}

/// Typed, non-fatal writer over a [`Journal`].
#[derive(Clone)]
pub struct WorkflowJournal {
    inner: Arc<dyn Journal>,
}

impl WorkflowJournal {
    pub fn new(inner: Arc<dyn Journal>) -> Self {
        Self { inner }
    }

    /// Append a record. Failures are logged, never propagated: a broken
    /// journal must not stop a running workflow.
    pub async fn record(&self, workflow_id: Uuid, record: &WorkflowRecord) {
        let kind = record.kind();
        let payload = match serde_json::to_value(record) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(workflow_id = %workflow_id, kind, error = %e, "Journal record not serializable");
                return;
            }
        };
        if let Err(e) = self.inner.append(workflow_id, kind, payload).await {
            warn!(workflow_id = %workflow_id, kind, error = %e, "Journal append failed");
        }
    }

    /// The decoded records of a workflow, in append order.
    pub async fn records(&self, workflow_id: Uuid) -> BizflowResult<Vec<WorkflowRecord>> {
        self.inner
            .read(workflow_id)
            .await?
            .into_iter()
            .map(|entry| serde_json::from_value(entry.payload).map_err(BizflowError::from))
            .collect()
    }

    /// Rebuild a workflow's last journaled state.
    ///
    /// Returns `None` for a workflow the journal has never seen.
    pub async fn replay(&self, workflow_id: Uuid) -> BizflowResult<Option<WorkflowState>> {
        let mut records = self.records(workflow_id).await?.into_iter();
        let state = match records.next() {
            None => return Ok(None),
            Some(WorkflowRecord::Created {
                user_id,
                task_description,
                created_at,
            }) => {
                let mut state =
                    WorkflowState::restore(workflow_id, user_id, task_description, created_at);
                for record in records {
                    record.apply(&mut state);
                }
                state
            }
            Some(other) => {
                return Err(BizflowError::Journal(format!(
                    "journal of {workflow_id} starts with '{}' instead of 'created'",
                    other.kind()
                )))
            }
        };
        Ok(Some(state))
    }

    /// Every workflow with at least one record.
    pub async fn workflows(&self) -> BizflowResult<Vec<Uuid>> {
        self.inner.workflows().await
    }
}
