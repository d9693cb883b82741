use crate::graph::ExecutionGraph;
use crate::journal::{WorkflowJournal, WorkflowRecord};
use crate::monitor::{InvocationOutcome, WorkflowMonitor};
use crate::registry::AgentRegistry;
use crate::types::{ExecutionOutcome, WorkflowState};
use bizflow_core::{
    AgentId, AgentInput, AgentOutput, BizflowResult, EntryOutcome, HistoryEntry, Notification,
    Notifier, PassKind, WorkflowEvent,
};
use chrono::Utc;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How one agent call ended.
enum AgentCall {
    Returned(Result<BizflowResult<AgentOutput>, Box<dyn Any + Send>>),
    AgentTimeout,
    PassTimeout,
}

/// Runs a compiled graph one agent at a time.
///
/// The only writer of step results and history entries. Each step sees the
/// outputs of every agent before it.
pub struct LinearExecutor {
    agents: AgentRegistry,
    notifier: Arc<dyn Notifier>,
    journal: WorkflowJournal,
    monitor: Arc<WorkflowMonitor>,
    agent_timeout: Duration,
}

impl LinearExecutor {
    pub fn new(
        agents: AgentRegistry,
        notifier: Arc<dyn Notifier>,
        journal: WorkflowJournal,
        monitor: Arc<WorkflowMonitor>,
        agent_timeout: Duration,
    ) -> Self {
        Self {
            agents,
            notifier,
            journal,
            monitor,
            agent_timeout,
        }
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// Execute one pass.
    ///
    /// `state.begin_pass` must have been called. Cancellation is honored at
    /// step boundaries; an agent already running finishes and its result is
    /// kept, flagged as cancelled.
    pub async fn run(
        &self,
        graph: &ExecutionGraph,
        state: &mut WorkflowState,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> ExecutionOutcome {
        let total = graph.len();
        let stage = state.pass_kind.unwrap_or(PassKind::Initial);
        let pass_started = Instant::now();
        let mut last_agent: Option<AgentId> = None;

        info!(
            workflow_id = %state.workflow_id,
            iteration = state.iteration,
            stage = ?stage,
            steps = total,
            "Pass started"
        );

        for node in graph.walk() {
            if cancel.is_cancelled() {
                info!(workflow_id = %state.workflow_id, step = node.index, "Pass cancelled");
                return ExecutionOutcome::Cancelled { last_agent };
            }
            if Instant::now() >= deadline {
                return ExecutionOutcome::TimedOut {
                    agent: None,
                    elapsed_secs: pass_started.elapsed().as_secs(),
                };
            }

            let agent_id = node.agent;
            self.progress(state, node.index, total, agent_id).await;

            let Some(agent) = self.agents.get(agent_id) else {
                let message = "no agent registered under this id".to_string();
                self.record_failure(state, node.index, agent_id, stage, &message, false)
                    .await;
                return ExecutionOutcome::Failed {
                    agent: agent_id,
                    error: message,
                };
            };

            let started = Instant::now();
            let call = {
                let input = AgentInput {
                    workflow_id: state.workflow_id,
                    iteration: state.iteration,
                    task_description: state.task_description(),
                    accumulated_results: &state.accumulated_results,
                    execution_history: &state.execution_history,
                    feedback: state.pass_feedback.as_deref(),
                };
                tokio::select! {
                    result = AssertUnwindSafe(agent.invoke(input)).catch_unwind() => AgentCall::Returned(result),
                    _ = tokio::time::sleep(self.agent_timeout) => AgentCall::AgentTimeout,
                    _ = tokio::time::sleep_until(deadline) => AgentCall::PassTimeout,
                }
            };
            let elapsed = started.elapsed();

            match call {
                AgentCall::Returned(Ok(Ok(output))) => {
                    self.monitor
                        .record_invocation(agent_id, elapsed, InvocationOutcome::Success);
                    let cancelled = cancel.is_cancelled();
                    let entry = HistoryEntry {
                        iteration: state.iteration,
                        stage,
                        step: node.index,
                        agent: agent_id,
                        result_summary: output.summary.clone(),
                        timestamp: Utc::now(),
                        human_feedback: state.pass_feedback.clone(),
                        outcome: EntryOutcome::Succeeded,
                        cancelled,
                    };
                    self.journal
                        .record(
                            state.workflow_id,
                            &WorkflowRecord::StepRecorded {
                                entry: entry.clone(),
                                output: Some(output.clone()),
                            },
                        )
                        .await;
                    state.record_step(entry, Some(output));
                    last_agent = Some(agent_id);

                    info!(
                        workflow_id = %state.workflow_id,
                        agent = %agent_id,
                        step = node.index,
                        duration_ms = elapsed.as_millis() as u64,
                        "Agent completed"
                    );

                    if cancelled {
                        return ExecutionOutcome::Cancelled { last_agent };
                    }
                }
                AgentCall::Returned(Ok(Err(e))) => {
                    self.monitor
                        .record_invocation(agent_id, elapsed, InvocationOutcome::Failure);
                    let message = e.to_string();
                    self.record_failure(state, node.index, agent_id, stage, &message, false)
                        .await;
                    return ExecutionOutcome::Failed {
                        agent: agent_id,
                        error: message,
                    };
                }
                AgentCall::Returned(Err(panic)) => {
                    self.monitor
                        .record_invocation(agent_id, elapsed, InvocationOutcome::Failure);
                    let message = format!("agent panicked: {}", panic_message(panic.as_ref()));
                    self.record_failure(state, node.index, agent_id, stage, &message, false)
                        .await;
                    return ExecutionOutcome::Failed {
                        agent: agent_id,
                        error: message,
                    };
                }
                AgentCall::AgentTimeout => {
                    self.monitor
                        .record_invocation(agent_id, elapsed, InvocationOutcome::Timeout);
                    let message = format!(
                        "agent exceeded its {}s timeout",
                        self.agent_timeout.as_secs()
                    );
                    self.record_failure(state, node.index, agent_id, stage, &message, true)
                        .await;
                    return ExecutionOutcome::Failed {
                        agent: agent_id,
                        error: message,
                    };
                }
                AgentCall::PassTimeout => {
                    self.monitor
                        .record_invocation(agent_id, elapsed, InvocationOutcome::Timeout);
                    let elapsed_secs = pass_started.elapsed().as_secs();
                    let message = format!("workflow deadline reached after {elapsed_secs}s");
                    self.record_failure(state, node.index, agent_id, stage, &message, true)
                        .await;
                    return ExecutionOutcome::TimedOut {
                        agent: Some(agent_id),
                        elapsed_secs,
                    };
                }
            }
        }

        info!(
            workflow_id = %state.workflow_id,
            iteration = state.iteration,
            duration_ms = pass_started.elapsed().as_millis() as u64,
            "Pass completed"
        );
        ExecutionOutcome::Completed
    }

    async fn progress(&self, state: &WorkflowState, step: usize, total: usize, agent: AgentId) {
        let notification = Notification::new(
            state.workflow_id,
            WorkflowEvent::WorkflowProgressUpdate {
                iteration: state.iteration,
                step,
                total_steps: total,
                agent,
            },
        );
        // Advisory: a lost progress update never stops the pass.
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!(workflow_id = %state.workflow_id, error = %e, "Progress notification failed");
        }
    }

    async fn record_failure(
        &self,
        state: &mut WorkflowState,
        step: usize,
        agent: AgentId,
        stage: PassKind,
        message: &str,
        timed_out: bool,
    ) {
        error!(
            workflow_id = %state.workflow_id,
            agent = %agent,
            step,
            error = %message,
            "Agent failed"
        );
        let outcome = if timed_out {
            EntryOutcome::TimedOut {
                error: message.to_string(),
            }
        } else {
            EntryOutcome::Failed {
                error: message.to_string(),
            }
        };
        let entry = HistoryEntry {
            iteration: state.iteration,
            stage,
            step,
            agent,
            result_summary: message.to_string(),
            timestamp: Utc::now(),
            human_feedback: state.pass_feedback.clone(),
            outcome,
            cancelled: false,
        };
        self.journal
            .record(
                state.workflow_id,
                &WorkflowRecord::StepRecorded {
                    entry: entry.clone(),
                    output: None,
                },
            )
            .await;
        state.record_step(entry, None);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
