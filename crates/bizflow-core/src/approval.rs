//! Approval types for the two human-in-the-loop gates.
//!
//! These types live in `bizflow-core` so that both the orchestrator (which
//! owns the gates) and the gateway (which receives human responses over the
//! wire) can share them without circular deps.

use crate::agent::AgentId;
use crate::{BizflowError, BizflowResult};
use serde::{Deserialize, Serialize};

/// Which gate a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    /// Approval of the proposed agent sequence, before anything runs.
    Plan,
    /// Approval of the accumulated results, after a pass completes.
    Result,
}

impl ApprovalKind {
    /// Event type emitted when this gate opens.
    pub fn request_event(&self) -> &'static str {
        match self {
            ApprovalKind::Plan => "plan_approval_request",
            ApprovalKind::Result => "final_results_approval_request",
        }
    }
}

impl std::fmt::Display for ApprovalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalKind::Plan => write!(f, "plan"),
            ApprovalKind::Result => write!(f, "result"),
        }
    }
}

/// Revision mode requested with a result-gate rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionType {
    /// Ask the planner for a new sequence.
    FullReplan,
    /// Re-run only the named agents.
    SpecificAgents,
}

/// Inbound human response, as received from the UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalResponse {
    /// Identifier of the approval request this answers.
    pub request_id: String,
    /// Whether the reviewer approved.
    pub approved: bool,
    /// Free-text feedback.
    #[serde(default)]
    pub feedback: Option<String>,
    /// Revision mode for a result-gate rejection.
    #[serde(default)]
    pub revision_type: Option<RevisionType>,
    /// Agents to re-run for `specific_agents`.
    #[serde(default)]
    pub target_agents: Option<Vec<String>>,
    /// Replacement sequence for a plan-gate rejection.
    #[serde(default)]
    pub modified_sequence: Option<Vec<String>>,
    /// Who answered.
    #[serde(default)]
    pub reviewer: Option<String>,
}

impl ApprovalResponse {
    /// Plain approval.
    pub fn approve(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            approved: true,
            ..Default::default()
        }
    }

    /// Plain rejection with optional feedback.
    pub fn reject(request_id: impl Into<String>, feedback: Option<&str>) -> Self {
        Self {
            request_id: request_id.into(),
            approved: false,
            feedback: feedback.map(str::to_string),
            ..Default::default()
        }
    }

    /// Validate the response against the gate it answers and turn it into a
    /// [`Decision`].
    ///
    /// `allowed_targets` is the set of agents a targeted revision may name
    /// (the current sequence at the result gate).
    pub fn validate(&self, kind: ApprovalKind, allowed_targets: &[AgentId]) -> BizflowResult<Decision> {
        let reviewer = self.reviewer.clone().unwrap_or_else(|| "human".to_string());
        let decision = |revision| Decision {
            request_id: self.request_id.clone(),
            approved: self.approved,
            feedback: self.feedback.clone(),
            revision,
            timed_out: false,
            reviewer: reviewer.clone(),
        };

        if self.approved {
            if self.target_agents.is_some() || self.modified_sequence.is_some() {
                return Err(BizflowError::InvalidRevision(
                    "an approval must not carry a revision payload".into(),
                ));
            }
            return Ok(decision(None));
        }

        match kind {
            ApprovalKind::Plan => {
                if self.target_agents.is_some()
                    || self.revision_type == Some(RevisionType::SpecificAgents)
                {
                    return Err(BizflowError::InvalidRevision(
                        "targeted revision is only available at the result gate".into(),
                    ));
                }
                if let Some(names) = &self.modified_sequence {
                    let sequence = parse_agents(names)?;
                    AgentId::validate_sequence(&sequence).map_err(BizflowError::InvalidRevision)?;
                    return Ok(decision(Some(RevisionRequest::ModifiedSequence(sequence))));
                }
                match self.revision_type {
                    Some(RevisionType::FullReplan) => Ok(decision(Some(RevisionRequest::FullReplan))),
                    _ => Ok(decision(None)),
                }
            }
            ApprovalKind::Result => {
                if self.modified_sequence.is_some() {
                    return Err(BizflowError::InvalidRevision(
                        "a modified sequence is only accepted at the plan gate".into(),
                    ));
                }
                let wants_targets = self.revision_type == Some(RevisionType::SpecificAgents)
                    || (self.revision_type.is_none() && self.target_agents.is_some());
                if !wants_targets {
                    return Ok(decision(Some(RevisionRequest::FullReplan)));
                }

                let names = self.target_agents.as_deref().unwrap_or_default();
                if names.is_empty() {
                    return Err(BizflowError::InvalidRevision(
                        "specific_agents requires at least one target agent".into(),
                    ));
                }
                let requested = parse_agents(names)?;
                if let Some(outside) = requested.iter().find(|a| !allowed_targets.contains(a)) {
                    return Err(BizflowError::InvalidRevision(format!(
                        "agent '{outside}' is not part of the current sequence"
                    )));
                }
                // Original relative order, duplicates collapsed.
                let targets: Vec<AgentId> = allowed_targets
                    .iter()
                    .copied()
                    .filter(|a| requested.contains(a))
                    .collect();
                Ok(decision(Some(RevisionRequest::SpecificAgents(targets))))
            }
        }
    }
}

fn parse_agents(names: &[String]) -> BizflowResult<Vec<AgentId>> {
    AgentId::parse_list(names).map_err(|e| BizflowError::InvalidRevision(e.to_string()))
}

/// A validated revision request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "agents", rename_all = "snake_case")]
pub enum RevisionRequest {
    /// Discard the sequence and ask the planner again.
    FullReplan,
    /// Re-run these agents, in sequence order.
    SpecificAgents(Vec<AgentId>),
    /// Execute this sequence instead of the proposal.
    ModifiedSequence(Vec<AgentId>),
}

/// The resolved outcome of a gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Identifier of the approval request.
    pub request_id: String,
    /// Whether the reviewer approved.
    pub approved: bool,
    /// Reviewer feedback (`"timeout"` when the gate expired).
    pub feedback: Option<String>,
    /// Validated revision payload, for rejections.
    pub revision: Option<RevisionRequest>,
    /// The gate resolved because no response arrived in time.
    #[serde(default)]
    pub timed_out: bool,
    /// Who decided (`"system"` for timeouts).
    pub reviewer: String,
}

impl Decision {
    /// The decision a gate resolves to when its window elapses.
    pub fn timeout(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            approved: false,
            feedback: Some("timeout".to_string()),
            revision: None,
            timed_out: true,
            reviewer: "system".to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SEQ: [AgentId; 3] = [AgentId::Coordinator, AgentId::Invoice, AgentId::Analysis];

    #[test]
    fn test_plain_approval() {
        let d = ApprovalResponse::approve("r1")
            .validate(ApprovalKind::Plan, &SEQ)
            .unwrap();
        assert!(d.approved);
        assert!(d.revision.is_none());
        assert!(!d.timed_out);
    }

    #[test]
    fn test_plan_rejection_with_modified_sequence() {
        let resp = ApprovalResponse {
            request_id: "r1".into(),
            approved: false,
            feedback: Some("skip analysis".into()),
            modified_sequence: Some(vec!["coordinator".into(), "invoice".into()]),
            ..Default::default()
        };
        let d = resp.validate(ApprovalKind::Plan, &SEQ).unwrap();
        assert_eq!(
            d.revision,
            Some(RevisionRequest::ModifiedSequence(vec![
                AgentId::Coordinator,
                AgentId::Invoice
            ]))
        );
    }

    #[test]
    fn test_plan_rejection_unknown_agent_is_invalid() {
        let resp = ApprovalResponse {
            request_id: "r1".into(),
            modified_sequence: Some(vec!["coordinator".into(), "payroll".into()]),
            ..Default::default()
        };
        let err = resp.validate(ApprovalKind::Plan, &SEQ).unwrap_err();
        assert_eq!(err.code(), "invalid_revision_request");
    }

    #[test]
    fn test_plan_rejection_plain_terminates() {
        let d = ApprovalResponse::reject("r1", Some("no"))
            .validate(ApprovalKind::Plan, &SEQ)
            .unwrap();
        assert!(!d.approved);
        assert!(d.revision.is_none());
    }

    #[test]
    fn test_result_rejection_targets_keep_sequence_order() {
        let resp = ApprovalResponse {
            request_id: "r2".into(),
            revision_type: Some(RevisionType::SpecificAgents),
            target_agents: Some(vec!["analysis".into(), "invoice".into(), "invoice".into()]),
            ..Default::default()
        };
        let d = resp.validate(ApprovalKind::Result, &SEQ).unwrap();
        assert_eq!(
            d.revision,
            Some(RevisionRequest::SpecificAgents(vec![
                AgentId::Invoice,
                AgentId::Analysis
            ]))
        );
    }

    #[test]
    fn test_result_rejection_target_outside_sequence() {
        let resp = ApprovalResponse {
            request_id: "r2".into(),
            revision_type: Some(RevisionType::SpecificAgents),
            target_agents: Some(vec!["crm".into()]),
            ..Default::default()
        };
        assert!(resp.validate(ApprovalKind::Result, &SEQ).is_err());
    }

    #[test]
    fn test_result_rejection_empty_targets() {
        let resp = ApprovalResponse {
            request_id: "r2".into(),
            revision_type: Some(RevisionType::SpecificAgents),
            target_agents: Some(vec![]),
            ..Default::default()
        };
        assert!(resp.validate(ApprovalKind::Result, &SEQ).is_err());
    }

    #[test]
    fn test_result_rejection_defaults_to_full_replan() {
        let d = ApprovalResponse::reject("r2", Some("start over"))
            .validate(ApprovalKind::Result, &SEQ)
            .unwrap();
        assert_eq!(d.revision, Some(RevisionRequest::FullReplan));
    }

    #[test]
    fn test_approval_with_payload_is_malformed() {
        let resp = ApprovalResponse {
            request_id: "r1".into(),
            approved: true,
            target_agents: Some(vec!["invoice".into()]),
            ..Default::default()
        };
        assert!(resp.validate(ApprovalKind::Result, &SEQ).is_err());
    }

    #[test]
    fn test_response_deserializes_with_missing_optionals() {
        let resp: ApprovalResponse =
            serde_json::from_str(r#"{"request_id":"abc","approved":false,"revision_type":"full_replan"}"#)
                .unwrap();
        assert_eq!(resp.revision_type, Some(RevisionType::FullReplan));
        assert!(resp.target_agents.is_none());
    }

    #[test]
    fn test_timeout_decision() {
        let d = Decision::timeout("r9");
        assert!(!d.approved);
        assert!(d.timed_out);
        assert_eq!(d.feedback.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_request_event_names() {
        assert_eq!(ApprovalKind::Plan.request_event(), "plan_approval_request");
        assert_eq!(
            ApprovalKind::Result.request_event(),
            "final_results_approval_request"
        );
    }
}
