use bizflow_core::{BizflowError, BizflowResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for every configured timeout: 30 days.
pub const MAX_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

/// Timeouts and limits applied to every workflow.
///
/// Loaded from the `[workflow]` table of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Maximum duration of a single agent invocation.
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_secs: u64,
    /// Maximum duration of one execution pass.
    #[serde(default = "default_workflow_timeout")]
    pub workflow_timeout_secs: u64,
    /// How long a gate waits for the reviewer.
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout_secs: u64,
    /// Budget for one reasoning call before falling back.
    #[serde(default = "default_planner_timeout")]
    pub planner_timeout_secs: u64,
    /// Concurrent non-terminal workflows per user.
    #[serde(default = "default_max_active")]
    pub max_active_per_user: usize,
    /// Ask the reviewer before the first pass. When off, only the result
    /// gate is used.
    #[serde(default = "default_true")]
    pub plan_gate: bool,
}

fn default_agent_timeout() -> u64 {
    300
}

fn default_workflow_timeout() -> u64 {
    1800
}

fn default_approval_timeout() -> u64 {
    3600
}

fn default_planner_timeout() -> u64 {
    60
}

fn default_max_active() -> usize {
    3
}

fn default_true() -> bool {
    true
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            agent_timeout_secs: default_agent_timeout(),
            workflow_timeout_secs: default_workflow_timeout(),
            approval_timeout_secs: default_approval_timeout(),
            planner_timeout_secs: default_planner_timeout(),
            max_active_per_user: default_max_active(),
            plan_gate: true,
        }
    }
}

impl WorkflowConfig {
    /// Reject zero and out-of-range values.
    pub fn validate(&self) -> BizflowResult<()> {
        for (name, secs) in [
            ("agent_timeout_secs", self.agent_timeout_secs),
            ("workflow_timeout_secs", self.workflow_timeout_secs),
            ("approval_timeout_secs", self.approval_timeout_secs),
            ("planner_timeout_secs", self.planner_timeout_secs),
        ] {
            if secs == 0 || secs > MAX_TIMEOUT_SECS {
                return Err(BizflowError::Config(format!(
                    "workflow.{name} must be between 1 and {MAX_TIMEOUT_SECS}, got {secs}"
                )));
            }
        }
        if self.max_active_per_user == 0 {
            return Err(BizflowError::Config(
                "workflow.max_active_per_user must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        clamped(self.agent_timeout_secs)
    }

    pub fn workflow_timeout(&self) -> Duration {
        clamped(self.workflow_timeout_secs)
    }

    pub fn approval_timeout(&self) -> Duration {
        clamped(self.approval_timeout_secs)
    }

    pub fn planner_timeout(&self) -> Duration {
        clamped(self.planner_timeout_secs)
    }
}

fn clamped(secs: u64) -> Duration {
    Duration::from_secs(secs.min(MAX_TIMEOUT_SECS))
}
