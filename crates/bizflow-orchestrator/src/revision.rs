use bizflow_core::{AgentId, ApprovalKind, Decision, RevisionRequest};

/// Why a workflow stops at a gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The reviewer approved the results.
    Completed,
    /// The reviewer rejected the plan without asking for a new one.
    PlanRejected { feedback: Option<String> },
    /// Nobody answered in time.
    TimedOut { gate: ApprovalKind },
}

/// What the workflow does after a gate resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextAction {
    /// Execute the proposed plan.
    Proceed,
    /// Execute this human-chosen sequence instead of the proposal.
    ExecuteSequence(Vec<AgentId>),
    /// Ask the planner for a new sequence.
    Replan,
    /// Re-run these agents, in sequence order, keeping the other results.
    ReExecute(Vec<AgentId>),
    Terminate(Termination),
}

/// Maps gate decisions onto the next step of the workflow.
pub struct RevisionController;

impl RevisionController {
    /// Interpret a validated decision.
    ///
    /// `sequence` is the current agent sequence; targeted re-runs are ordered
    /// by it.
    pub fn interpret(kind: ApprovalKind, decision: &Decision, sequence: &[AgentId]) -> NextAction {
        if decision.timed_out {
            return NextAction::Terminate(Termination::TimedOut { gate: kind });
        }

        match (kind, decision.approved) {
            (ApprovalKind::Plan, true) => NextAction::Proceed,
            (ApprovalKind::Result, true) => NextAction::Terminate(Termination::Completed),
            (ApprovalKind::Plan, false) => match &decision.revision {
                Some(RevisionRequest::ModifiedSequence(seq)) => {
                    NextAction::ExecuteSequence(seq.clone())
                }
                Some(RevisionRequest::FullReplan) => NextAction::Replan,
                // Not produced by plan-gate validation.
                Some(RevisionRequest::SpecificAgents(_)) | None => {
                    NextAction::Terminate(Termination::PlanRejected {
                        feedback: decision.feedback.clone(),
                    })
                }
            },
            (ApprovalKind::Result, false) => match &decision.revision {
                Some(RevisionRequest::SpecificAgents(targets)) => {
                    let ordered: Vec<AgentId> = sequence
                        .iter()
                        .copied()
                        .filter(|a| targets.contains(a))
                        .collect();
                    if ordered.is_empty() {
                        NextAction::Replan
                    } else {
                        NextAction::ReExecute(ordered)
                    }
                }
                Some(RevisionRequest::ModifiedSequence(seq)) => {
                    NextAction::ExecuteSequence(seq.clone())
                }
                Some(RevisionRequest::FullReplan) | None => NextAction::Replan,
            },
        }
    }
}
