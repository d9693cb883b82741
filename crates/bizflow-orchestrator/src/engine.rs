use crate::config::{WorkflowConfig, MAX_TIMEOUT_SECS};
use crate::executor::LinearExecutor;
use crate::gate::{ApprovalGate, RespondOutcome};
use crate::graph::GraphBuilder;
use crate::journal::{WorkflowJournal, WorkflowRecord};
use crate::monitor::WorkflowMonitor;
use crate::planner::{Plan, SequencePlanner};
use crate::registry::AgentRegistry;
use crate::revision::{NextAction, RevisionController, Termination};
use crate::types::{ApprovalState, ExecutionOutcome, WorkflowState, WorkflowStatus};
use bizflow_core::{
    AgentId, ApprovalKind, ApprovalResponse, BizflowError, BizflowResult, Decision, Notification,
    Notifier, PassKind, Reasoner, WorkflowEvent,
};
use bizflow_journal::Journal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A submitted workflow running in the background.
pub struct WorkflowHandle {
    pub workflow_id: Uuid,
    join: JoinHandle<WorkflowState>,
}

impl WorkflowHandle {
    /// Wait for the workflow to reach a terminal status.
    pub async fn wait(self) -> BizflowResult<WorkflowState> {
        self.join
            .await
            .map_err(|e| BizflowError::Orchestrator(format!("workflow task aborted: {e}")))
    }
}

/// Why a pass was started, and with what.
struct PassPlan {
    kind: PassKind,
    agents: Vec<AgentId>,
    feedback: Option<String>,
}

/// Where the driver goes after a gate or pass.
enum Step {
    Plan { feedback: Option<String> },
    PlanGate {
        plan: Plan,
        feedback: Option<String>,
    },
    Execute(PassPlan),
    ResultGate,
    Done,
}

/// Drives workflows through plan, plan gate, passes and the result gate.
///
/// Each workflow runs in its own task and exclusively owns its
/// [`WorkflowState`]. Everyone else reads published snapshots.
pub struct Orchestrator {
    config: WorkflowConfig,
    planner: SequencePlanner,
    builder: GraphBuilder,
    gate: ApprovalGate,
    executor: LinearExecutor,
    notifier: Arc<dyn Notifier>,
    journal: WorkflowJournal,
    monitor: Arc<WorkflowMonitor>,
    snapshots: RwLock<HashMap<Uuid, WorkflowState>>,
    cancels: RwLock<HashMap<Uuid, CancellationToken>>,
}

impl Orchestrator {
    pub fn new(
        config: WorkflowConfig,
        agents: AgentRegistry,
        reasoner: Option<Arc<dyn Reasoner>>,
        notifier: Arc<dyn Notifier>,
        journal: Arc<dyn Journal>,
    ) -> Self {
        let journal = WorkflowJournal::new(journal);
        let monitor = Arc::new(WorkflowMonitor::new(config.max_active_per_user));
        let executor = LinearExecutor::new(
            agents,
            notifier.clone(),
            journal.clone(),
            monitor.clone(),
            config.agent_timeout(),
        );
        Self {
            planner: SequencePlanner::new(reasoner, config.planner_timeout()),
            builder: GraphBuilder::new(),
            gate: ApprovalGate::new(notifier.clone(), config.approval_timeout()),
            executor,
            notifier,
            journal,
            monitor,
            snapshots: RwLock::new(HashMap::new()),
            cancels: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<WorkflowMonitor> {
        &self.monitor
    }

    pub fn journal(&self) -> &WorkflowJournal {
        &self.journal
    }

    /// Start a workflow in the background.
    ///
    /// Refused with [`BizflowError::CapacityExceeded`] when the user already
    /// runs the configured number of active workflows.
    pub async fn submit(
        self: &Arc<Self>,
        user_id: &str,
        task_description: &str,
    ) -> BizflowResult<WorkflowHandle> {
        let task_description = task_description.trim();
        if task_description.is_empty() {
            return Err(BizflowError::Orchestrator(
                "task description must not be empty".into(),
            ));
        }

        let state = WorkflowState::new(user_id, task_description);
        let workflow_id = state.workflow_id;
        let slot = self.monitor.try_admit(user_id, workflow_id)?;

        let cancel = CancellationToken::new();
        self.cancels.write().await.insert(workflow_id, cancel.clone());
        self.journal
            .record(
                workflow_id,
                &WorkflowRecord::Created {
                    user_id: state.user_id.clone(),
                    task_description: state.task_description().to_string(),
                    created_at: state.created_at,
                },
            )
            .await;
        self.publish(&state).await;

        info!(workflow_id = %workflow_id, user_id, "Workflow submitted");

        let this = self.clone();
        let span = info_span!("workflow", workflow_id = %workflow_id);
        let join = tokio::spawn(
            async move {
                let _slot = slot;
                let mut state = state;
                this.drive(&mut state, &cancel).await;
                this.monitor.record_finished(state.status);
                this.cancels.write().await.remove(&workflow_id);
                // Terminal states are served from the journal from here on.
                this.snapshots.write().await.remove(&workflow_id);
                this.gate.forget(workflow_id).await;
                state
            }
            .instrument(span),
        );

        Ok(WorkflowHandle { workflow_id, join })
    }

    /// Submit and wait for the terminal state.
    pub async fn run(
        self: &Arc<Self>,
        user_id: &str,
        task_description: &str,
    ) -> BizflowResult<WorkflowState> {
        self.submit(user_id, task_description).await?.wait().await
    }

    /// Deliver a human response to the gate it answers.
    pub async fn respond(&self, response: ApprovalResponse) -> BizflowResult<RespondOutcome> {
        self.gate.respond(response).await
    }

    /// Request cancellation. Gates resolve immediately; a running pass stops
    /// at the next step boundary.
    pub async fn cancel(&self, workflow_id: Uuid) -> BizflowResult<()> {
        if let Some(token) = self.cancels.read().await.get(&workflow_id) {
            info!(workflow_id = %workflow_id, "Cancellation requested");
            token.cancel();
            return Ok(());
        }
        // Already terminal, or unknown.
        self.recover(workflow_id).await.map(|_| ())
    }

    /// Latest published state of a running workflow. Finished workflows are
    /// dropped from memory; use [`Orchestrator::recover`] for those.
    pub async fn snapshot(&self, workflow_id: Uuid) -> Option<WorkflowState> {
        self.snapshots.read().await.get(&workflow_id).cloned()
    }

    /// Ids of the workflows this process is running.
    pub async fn workflows(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.snapshots.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Open gates of a workflow, as `(request_id, kind)`.
    pub async fn pending_approvals(&self, workflow_id: Uuid) -> Vec<(String, ApprovalKind)> {
        self.gate.pending_for(workflow_id).await
    }

    /// Rebuild a workflow from the journal.
    pub async fn recover(&self, workflow_id: Uuid) -> BizflowResult<WorkflowState> {
        self.journal
            .replay(workflow_id)
            .await?
            .ok_or(BizflowError::UnknownWorkflow(workflow_id))
    }

    async fn drive(&self, state: &mut WorkflowState, cancel: &CancellationToken) {
        let mut step = Step::Plan { feedback: None };
        loop {
            step = match step {
                Step::Plan { feedback } => self.plan(state, feedback, cancel).await,
                Step::PlanGate { plan, feedback } => {
                    self.plan_gate(state, plan, feedback, cancel).await
                }
                Step::Execute(pass) => self.execute(state, pass, cancel).await,
                Step::ResultGate => self.result_gate(state, cancel).await,
                Step::Done => return,
            };
        }
    }

    async fn plan(
        &self,
        state: &mut WorkflowState,
        feedback: Option<String>,
        cancel: &CancellationToken,
    ) -> Step {
        self.transition(state, WorkflowStatus::Planning, None).await;
        let plan = tokio::select! {
            _ = cancel.cancelled() => {
                return self.cancelled(state, "cancelled during planning").await;
            }
            plan = self.planner.propose(
                state.task_description(),
                &state.execution_history,
                feedback.as_deref(),
            ) => plan,
        };

        state.agent_sequence = plan.sequence.clone();
        state.rationale = plan.rationale.clone();
        self.journal
            .record(
                state.workflow_id,
                &WorkflowRecord::PlanProposed {
                    sequence: plan.sequence.clone(),
                    rationale: plan.rationale.clone(),
                    confidence: plan.confidence,
                    complexity: plan.complexity,
                    fallback_reason: plan.fallback_reason.clone(),
                },
            )
            .await;

        if self.config.plan_gate {
            return Step::PlanGate { plan, feedback };
        }

        state.plan_approval = ApprovalState::skipped();
        self.journal
            .record(state.workflow_id, &WorkflowRecord::PlanGateSkipped)
            .await;
        Step::Execute(PassPlan {
            kind: self.fresh_pass_kind(state),
            agents: plan.sequence,
            feedback,
        })
    }

    /// `feedback` is the feedback that triggered this proposal; it carries
    /// into the pass unless the reviewer adds new feedback.
    async fn plan_gate(
        &self,
        state: &mut WorkflowState,
        plan: Plan,
        feedback: Option<String>,
        cancel: &CancellationToken,
    ) -> Step {
        self.transition(state, WorkflowStatus::AwaitingPlanApproval, None)
            .await;
        let task = state.task_description().to_string();
        let decision = match self
            .gate
            .request(
                state.workflow_id,
                ApprovalKind::Plan,
                Vec::new(),
                |request_id| plan.to_event(request_id, &task),
                cancel,
            )
            .await
        {
            Ok(decision) => decision,
            Err(_) => return self.cancelled(state, "cancelled at plan approval").await,
        };
        self.record_decision(state, ApprovalKind::Plan, &decision).await;

        match RevisionController::interpret(ApprovalKind::Plan, &decision, &state.agent_sequence) {
            NextAction::Proceed | NextAction::ReExecute(_) => Step::Execute(PassPlan {
                kind: self.fresh_pass_kind(state),
                agents: plan.sequence,
                feedback: decision.feedback.or(feedback),
            }),
            NextAction::ExecuteSequence(sequence) => {
                info!(workflow_id = %state.workflow_id, sequence = ?sequence, "Plan modified by reviewer");
                Step::Execute(PassPlan {
                    kind: PassKind::ModifiedPlan,
                    agents: sequence,
                    feedback: decision.feedback.or(feedback),
                })
            }
            NextAction::Replan => Step::Plan {
                feedback: decision.feedback.or(feedback),
            },
            NextAction::Terminate(termination) => self.terminate(state, termination).await,
        }
    }

    async fn execute(&self, state: &mut WorkflowState, pass: PassPlan, cancel: &CancellationToken) -> Step {
        // A targeted pass keeps the sequence; every other pass replaces it.
        if pass.kind != PassKind::TargetedRevision {
            state.agent_sequence = pass.agents.clone();
            self.journal
                .record(
                    state.workflow_id,
                    &WorkflowRecord::SequenceSet {
                        sequence: pass.agents.clone(),
                    },
                )
                .await;
        }

        let graph = match self.builder.compile(&pass.agents) {
            Ok(graph) => graph,
            Err(e) => return self.failed(state, "planning", None, e.to_string()).await,
        };

        let timeout = self.config.workflow_timeout();
        state.begin_pass(pass.kind, pass.agents.clone(), pass.feedback.clone(), timeout);
        self.journal
            .record(
                state.workflow_id,
                &WorkflowRecord::PassStarted {
                    iteration: state.iteration,
                    stage: pass.kind,
                    agents: pass.agents,
                    feedback: pass.feedback,
                    start_time: state.start_time,
                    deadline: state.deadline,
                },
            )
            .await;
        self.transition(state, WorkflowStatus::Executing, None).await;

        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + Duration::from_secs(MAX_TIMEOUT_SECS));
        let outcome = self.executor.run(&graph, state, cancel, deadline).await;
        self.publish(state).await;

        match outcome {
            ExecutionOutcome::Completed => Step::ResultGate,
            ExecutionOutcome::Failed { agent, error } => {
                self.failed(state, "execution", Some(agent), error).await
            }
            ExecutionOutcome::Cancelled { .. } => {
                self.cancelled(state, "cancelled during execution").await
            }
            ExecutionOutcome::TimedOut {
                agent,
                elapsed_secs,
            } => {
                let message = BizflowError::WorkflowTimeout { elapsed_secs }.to_string();
                self.failed(state, "execution", agent, message).await
            }
        }
    }

    async fn result_gate(&self, state: &mut WorkflowState, cancel: &CancellationToken) -> Step {
        self.transition(state, WorkflowStatus::AwaitingResultApproval, None)
            .await;
        let iteration = state.iteration;
        let results = state.accumulated_results.clone();
        let summary = state.result_summary();
        let decision = match self
            .gate
            .request(
                state.workflow_id,
                ApprovalKind::Result,
                state.agent_sequence.clone(),
                |request_id| WorkflowEvent::FinalResultsApprovalRequest {
                    request_id: request_id.to_string(),
                    iteration,
                    results,
                    summary,
                },
                cancel,
            )
            .await
        {
            Ok(decision) => decision,
            Err(_) => return self.cancelled(state, "cancelled at result approval").await,
        };
        self.record_decision(state, ApprovalKind::Result, &decision).await;

        match RevisionController::interpret(ApprovalKind::Result, &decision, &state.agent_sequence)
        {
            NextAction::Terminate(termination) => self.terminate(state, termination).await,
            NextAction::ReExecute(agents) => {
                info!(workflow_id = %state.workflow_id, agents = ?agents, "Targeted revision requested");
                Step::Execute(PassPlan {
                    kind: PassKind::TargetedRevision,
                    agents,
                    feedback: decision.feedback,
                })
            }
            NextAction::ExecuteSequence(agents) => Step::Execute(PassPlan {
                kind: PassKind::ModifiedPlan,
                agents,
                feedback: decision.feedback,
            }),
            NextAction::Replan => {
                info!(workflow_id = %state.workflow_id, "Full replan requested");
                Step::Plan {
                    feedback: decision.feedback,
                }
            }
            // Result-gate approvals terminate; `Proceed` is plan-gate only.
            NextAction::Proceed => self.terminate(state, Termination::Completed).await,
        }
    }

    fn fresh_pass_kind(&self, state: &WorkflowState) -> PassKind {
        if state.iteration == 0 {
            PassKind::Initial
        } else {
            PassKind::Replan
        }
    }

    async fn record_decision(&self, state: &mut WorkflowState, kind: ApprovalKind, decision: &Decision) {
        match kind {
            ApprovalKind::Plan => state.plan_approval.record(decision),
            ApprovalKind::Result => state.result_approval.record(decision),
        }
        self.journal
            .record(
                state.workflow_id,
                &WorkflowRecord::ApprovalRecorded {
                    kind,
                    decision: decision.clone(),
                },
            )
            .await;
        self.publish(state).await;
    }

    async fn terminate(&self, state: &mut WorkflowState, termination: Termination) -> Step {
        match termination {
            Termination::Completed => {
                self.transition(state, WorkflowStatus::Completed, None).await;
                info!(
                    workflow_id = %state.workflow_id,
                    iterations = state.iteration,
                    "Workflow completed"
                );
                self.emit(
                    state,
                    WorkflowEvent::WorkflowCompleted {
                        iterations: state.iteration,
                        summary: state.result_summary(),
                    },
                )
                .await;
                Step::Done
            }
            Termination::PlanRejected { feedback } => {
                let reason = match feedback {
                    Some(f) => format!("plan rejected: {f}"),
                    None => "plan rejected".to_string(),
                };
                self.cancelled(state, &reason).await
            }
            Termination::TimedOut { gate } => {
                let stage = match gate {
                    ApprovalKind::Plan => "plan_approval",
                    ApprovalKind::Result => "result_approval",
                };
                self.failed(state, stage, None, "timeout".to_string()).await
            }
        }
    }

    async fn failed(
        &self,
        state: &mut WorkflowState,
        stage: &str,
        agent: Option<AgentId>,
        message: String,
    ) -> Step {
        error!(
            workflow_id = %state.workflow_id,
            stage,
            agent = ?agent,
            error = %message,
            "Workflow failed"
        );
        self.transition(state, WorkflowStatus::Failed, Some(message.clone()))
            .await;
        self.emit(
            state,
            WorkflowEvent::WorkflowError {
                stage: stage.to_string(),
                agent,
                message,
                status: WorkflowStatus::Failed.to_string(),
            },
        )
        .await;
        Step::Done
    }

    async fn cancelled(&self, state: &mut WorkflowState, reason: &str) -> Step {
        self.transition(state, WorkflowStatus::Cancelled, Some(reason.to_string()))
            .await;
        info!(workflow_id = %state.workflow_id, reason, "Workflow cancelled");
        self.emit(
            state,
            WorkflowEvent::WorkflowCancelled {
                reason: reason.to_string(),
            },
        )
        .await;
        Step::Done
    }

    async fn transition(&self, state: &mut WorkflowState, to: WorkflowStatus, reason: Option<String>) {
        let from = state.set_status(to);
        if reason.is_some() {
            state.failure_reason = reason.clone();
        }
        self.journal
            .record(
                state.workflow_id,
                &WorkflowRecord::StatusChanged { from, to, reason },
            )
            .await;
        self.publish(state).await;
    }

    async fn publish(&self, state: &WorkflowState) {
        self.snapshots
            .write()
            .await
            .insert(state.workflow_id, state.clone());
    }

    async fn emit(&self, state: &WorkflowState, event: WorkflowEvent) {
        let notification = Notification::new(state.workflow_id, event);
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!(
                workflow_id = %state.workflow_id,
                kind = notification.event.kind(),
                error = %e,
                "Notification failed"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::notify::NullNotifier;
    use async_trait::async_trait;
    use bizflow_core::{Agent, AgentInput, AgentOutput};
    use bizflow_journal::MemoryJournal;

    struct Quick(AgentId);

    #[async_trait]
    impl Agent for Quick {
        fn id(&self) -> AgentId {
            self.0
        }

        async fn invoke(&self, _input: AgentInput<'_>) -> BizflowResult<AgentOutput> {
            Ok(AgentOutput::new(format!("{} done", self.0)))
        }
    }

    fn orchestrator(config: WorkflowConfig) -> Arc<Orchestrator> {
        let mut agents = AgentRegistry::new();
        for id in AgentId::ALL {
            agents.register(Arc::new(Quick(id)));
        }
        Arc::new(Orchestrator::new(
            config,
            agents,
            None,
            Arc::new(NullNotifier),
            Arc::new(MemoryJournal::new()),
        ))
    }

    async fn wait_for_gate(orch: &Orchestrator, workflow_id: Uuid) -> (String, ApprovalKind) {
        loop {
            if let Some(pending) = orch.pending_approvals(workflow_id).await.into_iter().next() {
                return pending;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_empty_task_is_refused() {
        let orch = orchestrator(WorkflowConfig::default());
        assert!(orch.submit("u1", "   ").await.is_err());
    }

    #[tokio::test]
    async fn test_single_gate_mode_skips_plan_gate() {
        let orch = orchestrator(WorkflowConfig {
            plan_gate: false,
            ..WorkflowConfig::default()
        });
        let handle = orch.submit("u1", "Summarize CRM pipeline").await.unwrap();
        let (request_id, kind) = wait_for_gate(&orch, handle.workflow_id).await;
        assert_eq!(kind, ApprovalKind::Result);

        orch.respond(ApprovalResponse::approve(request_id)).await.unwrap();
        let state = handle.wait().await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.plan_approval, ApprovalState::skipped());
        assert_eq!(state.iteration, 1);
    }

    #[tokio::test]
    async fn test_cancel_at_plan_gate() {
        let orch = orchestrator(WorkflowConfig::default());
        let handle = orch.submit("u1", "Send reminders").await.unwrap();
        wait_for_gate(&orch, handle.workflow_id).await;

        orch.cancel(handle.workflow_id).await.unwrap();
        let state = handle.wait().await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Cancelled);
        assert!(state.execution_history.is_empty());
        assert_eq!(orch.monitor().active_count("u1"), 0);
    }

    #[tokio::test]
    async fn test_finished_workflows_leave_memory() {
        let orch = orchestrator(WorkflowConfig {
            max_active_per_user: 50,
            ..WorkflowConfig::default()
        });
        let mut finished = Vec::new();
        for i in 0..20 {
            let handle = orch.submit("u1", &format!("Task {i}")).await.unwrap();
            wait_for_gate(&orch, handle.workflow_id).await;
            orch.cancel(handle.workflow_id).await.unwrap();
            finished.push(handle.wait().await.unwrap());
        }

        assert!(orch.workflows().await.is_empty());
        for state in finished {
            assert!(orch.snapshot(state.workflow_id).await.is_none());
            let recovered = orch.recover(state.workflow_id).await.unwrap();
            assert_eq!(recovered.status, WorkflowStatus::Cancelled);
            orch.cancel(state.workflow_id).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_cancel_unknown_workflow() {
        let orch = orchestrator(WorkflowConfig::default());
        let err = orch.cancel(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), "unknown_workflow");
    }
}
