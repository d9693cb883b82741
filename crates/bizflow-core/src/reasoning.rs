use crate::agent::HistoryEntry;
use crate::BizflowResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rough size estimate of a plan, shown to the reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    /// Estimate from the number of agents in a sequence.
    pub fn from_len(len: usize) -> Self {
        match len {
            0..=2 => Complexity::Simple,
            3..=4 => Complexity::Moderate,
            _ => Complexity::Complex,
        }
    }

    /// Lenient parse of a model-provided label.
    pub fn parse_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "simple" | "low" => Some(Complexity::Simple),
            "moderate" | "medium" => Some(Complexity::Moderate),
            "complex" | "high" => Some(Complexity::Complex),
            _ => None,
        }
    }
}

/// Input to a reasoning call.
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub task_description: &'a str,
    /// Every prior execution, so a replan can avoid repeating what failed.
    pub history: &'a [HistoryEntry],
    /// Feedback of the rejection that triggered this proposal.
    pub feedback: Option<&'a str>,
}

/// Unvalidated proposal, exactly as the reasoning backend returned it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProposal {
    pub sequence: Vec<String>,
    #[serde(default)]
    pub rationale: HashMap<String, String>,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub complexity: Option<String>,
}

/// The reasoning interface: task in, ranked agent list out.
///
/// Best-effort. The planner validates everything it returns.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn propose(&self, request: PlanRequest<'_>) -> BizflowResult<RawProposal>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_from_len() {
        assert_eq!(Complexity::from_len(1), Complexity::Simple);
        assert_eq!(Complexity::from_len(3), Complexity::Moderate);
        assert_eq!(Complexity::from_len(5), Complexity::Complex);
    }

    #[test]
    fn test_complexity_labels() {
        assert_eq!(Complexity::parse_label("HIGH"), Some(Complexity::Complex));
        assert_eq!(Complexity::parse_label("moderate"), Some(Complexity::Moderate));
        assert_eq!(Complexity::parse_label("??"), None);
    }
}
