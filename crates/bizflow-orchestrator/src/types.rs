use bizflow_core::{AgentId, AgentOutput, Decision, HistoryEntry, PassKind, RevisionRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Created,
    Planning,
    AwaitingPlanApproval,
    Executing,
    AwaitingResultApproval,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    /// No further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Created => "created",
            WorkflowStatus::Planning => "planning",
            WorkflowStatus::AwaitingPlanApproval => "awaiting_plan_approval",
            WorkflowStatus::Executing => "executing",
            WorkflowStatus::AwaitingResultApproval => "awaiting_result_approval",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolution of one gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// The latest decision recorded for a gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalState {
    pub status: ApprovalStatus,
    pub feedback: Option<String>,
    pub request_id: Option<String>,
    pub reviewer: Option<String>,
    /// Approved with a reviewer-supplied sequence in place of the proposal.
    #[serde(default)]
    pub modified: bool,
}

impl ApprovalState {
    pub fn pending() -> Self {
        Self {
            status: ApprovalStatus::Pending,
            feedback: None,
            request_id: None,
            reviewer: None,
            modified: false,
        }
    }

    /// Approved without asking anyone (plan gate disabled).
    pub fn skipped() -> Self {
        Self {
            status: ApprovalStatus::Approved,
            feedback: Some("plan gate disabled".to_string()),
            request_id: None,
            reviewer: Some("system".to_string()),
            modified: false,
        }
    }

    /// Record a decision. A rejection that carries a modified sequence
    /// approves that sequence, so it counts as an approval.
    pub fn record(&mut self, decision: &Decision) {
        self.modified = matches!(
            decision.revision,
            Some(RevisionRequest::ModifiedSequence(_))
        );
        self.status = if decision.approved || self.modified {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        self.feedback = decision.feedback.clone();
        self.request_id = Some(decision.request_id.clone());
        self.reviewer = Some(decision.reviewer.clone());
    }
}

/// The mutable record of one workflow.
///
/// Owned by the task driving the workflow; everyone else sees clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: Uuid,
    pub user_id: String,
    task_description: String,
    /// The approved sequence, or the proposal while planning.
    pub agent_sequence: Vec<AgentId>,
    /// Planner rationale for the current sequence.
    #[serde(default)]
    pub rationale: BTreeMap<AgentId, String>,
    /// Agents executed in the current pass, a subset of `agent_sequence` on
    /// targeted revisions.
    #[serde(default)]
    pub pass_agents: Vec<AgentId>,
    #[serde(default)]
    pub pass_kind: Option<PassKind>,
    /// Feedback that triggered the current pass.
    #[serde(default)]
    pub pass_feedback: Option<String>,
    /// Index into `pass_agents` of the next agent to run.
    pub current_step: usize,
    /// Executed passes so far, starting at 1 with the first pass.
    pub iteration: u32,
    pub accumulated_results: BTreeMap<AgentId, AgentOutput>,
    pub execution_history: Vec<HistoryEntry>,
    pub plan_approval: ApprovalState,
    pub result_approval: ApprovalState,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Start of the current pass.
    pub start_time: Option<DateTime<Utc>>,
    /// Wall-clock deadline of the current pass.
    pub deadline: Option<DateTime<Utc>>,
}

impl WorkflowState {
    pub fn new(user_id: impl Into<String>, task_description: impl Into<String>) -> Self {
        Self::restore(Uuid::new_v4(), user_id, task_description, Utc::now())
    }

    /// Rebuild the initial state of a known workflow.
    pub fn restore(
        workflow_id: Uuid,
        user_id: impl Into<String>,
        task_description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            workflow_id,
            user_id: user_id.into(),
            task_description: task_description.into(),
            agent_sequence: Vec::new(),
            rationale: BTreeMap::new(),
            pass_agents: Vec::new(),
            pass_kind: None,
            pass_feedback: None,
            current_step: 0,
            iteration: 0,
            accumulated_results: BTreeMap::new(),
            execution_history: Vec::new(),
            plan_approval: ApprovalState::pending(),
            result_approval: ApprovalState::pending(),
            status: WorkflowStatus::Created,
            failure_reason: None,
            created_at,
            start_time: None,
            deadline: None,
        }
    }

    /// The task as submitted. Never changes.
    pub fn task_description(&self) -> &str {
        &self.task_description
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Set a new status and return the previous one.
    pub fn set_status(&mut self, status: WorkflowStatus) -> WorkflowStatus {
        std::mem::replace(&mut self.status, status)
    }

    /// Reset the cursor for a new pass over `agents`.
    pub fn begin_pass(
        &mut self,
        kind: PassKind,
        agents: Vec<AgentId>,
        feedback: Option<String>,
        timeout: Duration,
    ) {
        let now = Utc::now();
        self.iteration += 1;
        self.current_step = 0;
        self.pass_agents = agents;
        self.pass_kind = Some(kind);
        self.pass_feedback = feedback;
        self.result_approval = ApprovalState::pending();
        self.start_time = Some(now);
        self.deadline = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|d| now.checked_add_signed(d));
    }

    /// Record a finished step. Successful outputs overwrite the agent's
    /// previous result and advance the cursor.
    pub fn record_step(&mut self, entry: HistoryEntry, output: Option<AgentOutput>) {
        if let Some(output) = output {
            self.accumulated_results.insert(entry.agent, output);
            self.current_step += 1;
        }
        self.execution_history.push(entry);
    }

    /// History entries of one pass.
    pub fn pass_entries(&self, iteration: u32) -> impl Iterator<Item = &HistoryEntry> {
        self.execution_history
            .iter()
            .filter(move |e| e.iteration == iteration)
    }

    /// Human-readable digest of the accumulated results.
    pub fn result_summary(&self) -> String {
        let mut lines = vec![format!(
            "Iteration {}: {} agent result(s)",
            self.iteration,
            self.accumulated_results.len()
        )];
        for agent in &self.agent_sequence {
            if let Some(output) = self.accumulated_results.get(agent) {
                lines.push(format!("- {agent}: {}", output.summary));
            }
        }
        lines.join("\n")
    }
}

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    Failed { agent: AgentId, error: String },
    Cancelled { last_agent: Option<AgentId> },
    TimedOut { agent: Option<AgentId>, elapsed_secs: u64 },
}
