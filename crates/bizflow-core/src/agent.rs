use crate::{BizflowError, BizflowResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a specialized agent.
///
/// The set is closed: planner output and human revision payloads are parsed
/// into this enum, and anything outside it is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentId {
    /// Mandatory coordination agent; frames the task for the specialists.
    Coordinator,
    /// Reads and drafts email (Gmail).
    Email,
    /// Creates, reconciles and pays invoices (Bill.com).
    Invoice,
    /// Looks up and updates customer records (Salesforce).
    Crm,
    /// Analyzes the collected data and writes the final report.
    Analysis,
}

impl AgentId {
    /// Every known agent, in canonical order.
    pub const ALL: [AgentId; 5] = [
        AgentId::Coordinator,
        AgentId::Email,
        AgentId::Invoice,
        AgentId::Crm,
        AgentId::Analysis,
    ];

    /// The agent every valid sequence must contain.
    pub const MANDATORY: AgentId = AgentId::Coordinator;

    /// Wire name of the agent.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Coordinator => "coordinator",
            AgentId::Email => "email",
            AgentId::Invoice => "invoice",
            AgentId::Crm => "crm",
            AgentId::Analysis => "analysis",
        }
    }

    /// Check the structural rules every executable sequence obeys: non-empty,
    /// no agent twice, and the mandatory coordinator present.
    pub fn validate_sequence(sequence: &[AgentId]) -> Result<(), String> {
        if sequence.is_empty() {
            return Err("sequence is empty".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for agent in sequence {
            if !seen.insert(*agent) {
                return Err(format!("agent '{agent}' appears more than once"));
            }
        }
        if !sequence.contains(&AgentId::MANDATORY) {
            return Err(format!(
                "sequence omits the mandatory '{}' agent",
                AgentId::MANDATORY
            ));
        }
        Ok(())
    }

    /// Parse a list of wire names, failing on the first unknown one.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> BizflowResult<Vec<AgentId>> {
        names.iter().map(|n| n.as_ref().parse()).collect()
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentId {
    type Err = BizflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "coordinator" => Ok(AgentId::Coordinator),
            "email" => Ok(AgentId::Email),
            "invoice" => Ok(AgentId::Invoice),
            "crm" => Ok(AgentId::Crm),
            "analysis" => Ok(AgentId::Analysis),
            _ => Err(BizflowError::UnknownAgent(s.to_string())),
        }
    }
}

/// The record an agent returns. Stored verbatim in the accumulated results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// One-line summary, copied into the execution history.
    pub summary: String,
    /// Opaque structured payload.
    #[serde(default)]
    pub data: serde_json::Value,
    /// When the agent produced this output.
    pub produced_at: DateTime<Utc>,
}

impl AgentOutput {
    /// Create an output with a summary and no structured payload.
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            data: serde_json::Value::Null,
            produced_at: Utc::now(),
        }
    }

    /// Attach a structured payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// What started the pass an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    /// First execution of an approved proposal.
    Initial,
    /// First execution of a sequence the human edited at the plan gate.
    ModifiedPlan,
    /// Execution of a fresh proposal after a full replan.
    Replan,
    /// Re-execution of a named subset of agents.
    TargetedRevision,
}

/// How one agent execution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryOutcome {
    /// The agent returned a result.
    Succeeded,
    /// The agent returned an error or panicked.
    Failed {
        /// Error detail.
        error: String,
    },
    /// The agent exceeded its own timeout or the pass deadline.
    TimedOut {
        /// Error detail.
        error: String,
    },
}

/// One entry of the append-only execution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Pass number, starting at 1.
    pub iteration: u32,
    /// What started the pass.
    pub stage: PassKind,
    /// Zero-based position inside the pass.
    pub step: usize,
    /// The agent that ran.
    pub agent: AgentId,
    /// Summary of the result (or the error).
    pub result_summary: String,
    /// When the agent finished.
    pub timestamp: DateTime<Utc>,
    /// Feedback of the human decision that started this pass, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_feedback: Option<String>,
    /// How the execution ended.
    pub outcome: EntryOutcome,
    /// The result was kept but the pass stopped right after it on cancellation.
    #[serde(default)]
    pub cancelled: bool,
}

impl HistoryEntry {
    /// Whether the agent returned a result.
    pub fn succeeded(&self) -> bool {
        self.outcome == EntryOutcome::Succeeded
    }
}

/// Read-only view handed to an agent. Agents return new data; they never
/// mutate workflow state.
#[derive(Debug, Clone, Copy)]
pub struct AgentInput<'a> {
    /// Workflow the invocation belongs to.
    pub workflow_id: Uuid,
    /// Current pass number.
    pub iteration: u32,
    /// The original user task.
    pub task_description: &'a str,
    /// Results of every agent that ran so far, across passes.
    pub accumulated_results: &'a BTreeMap<AgentId, AgentOutput>,
    /// Every prior history entry, in insertion order.
    pub execution_history: &'a [HistoryEntry],
    /// Feedback of the decision that started this pass.
    pub feedback: Option<&'a str>,
}

/// The agent invocation interface.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Which agent this is.
    fn id(&self) -> AgentId;

    /// Run the agent once.
    async fn invoke(&self, input: AgentInput<'_>) -> BizflowResult<AgentOutput>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_parse() {
        assert_eq!("invoice".parse::<AgentId>().unwrap(), AgentId::Invoice);
        assert_eq!(" CRM ".parse::<AgentId>().unwrap(), AgentId::Crm);
        assert!("payroll".parse::<AgentId>().is_err());
    }

    #[test]
    fn test_parse_list_rejects_unknown() {
        let ok = AgentId::parse_list(&["coordinator", "analysis"]).unwrap();
        assert_eq!(ok, vec![AgentId::Coordinator, AgentId::Analysis]);

        let err = AgentId::parse_list(&["coordinator", "hr"]).unwrap_err();
        assert_eq!(err.code(), "unknown_agent");
    }

    #[test]
    fn test_validate_sequence() {
        assert!(AgentId::validate_sequence(&[AgentId::Coordinator, AgentId::Invoice]).is_ok());
        assert!(AgentId::validate_sequence(&[]).is_err());
        assert!(AgentId::validate_sequence(&[AgentId::Invoice, AgentId::Analysis])
            .unwrap_err()
            .contains("coordinator"));
        assert!(AgentId::validate_sequence(&[
            AgentId::Coordinator,
            AgentId::Email,
            AgentId::Email
        ])
        .unwrap_err()
        .contains("more than once"));
    }

    #[test]
    fn test_agent_id_serde_matches_display() {
        for id in AgentId::ALL {
            let json = serde_json::to_string(&id).unwrap();
            assert_eq!(json, format!("\"{id}\""));
        }
    }

    #[test]
    fn test_results_map_uses_agent_keys() {
        let mut results = BTreeMap::new();
        results.insert(AgentId::Invoice, AgentOutput::new("3 invoices matched"));
        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["invoice"]["summary"], "3 invoices matched");

        let parsed: BTreeMap<AgentId, AgentOutput> = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, results);
    }

    #[test]
    fn test_history_entry_outcome_tag() {
        let entry = HistoryEntry {
            iteration: 1,
            stage: PassKind::Initial,
            step: 0,
            agent: AgentId::Coordinator,
            result_summary: "failed".into(),
            timestamp: Utc::now(),
            human_feedback: None,
            outcome: EntryOutcome::Failed {
                error: "boom".into(),
            },
            cancelled: false,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["outcome"]["status"], "failed");
        assert!(json.get("human_feedback").is_none());
        assert!(!entry.succeeded());
    }
}
