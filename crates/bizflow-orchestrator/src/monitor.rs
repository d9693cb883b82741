use bizflow_core::{AgentId, BizflowError, BizflowResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Counters for one agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub invocations: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub duration_ms: u64,
}

/// How an invocation ended, for the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    Success,
    Failure,
    Timeout,
}

/// Point-in-time copy of the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub agents: BTreeMap<AgentId, AgentMetrics>,
    pub active_workflows: usize,
    pub active_by_user: BTreeMap<String, usize>,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

#[derive(Default)]
struct Counters {
    agents: BTreeMap<AgentId, AgentMetrics>,
    completed: u64,
    failed: u64,
    cancelled: u64,
}

/// Tracks per-agent metrics and enforces the per-user workflow cap.
pub struct WorkflowMonitor {
    active: Mutex<HashMap<String, HashSet<Uuid>>>,
    counters: Mutex<Counters>,
    max_active_per_user: usize,
}

/// A held slot in the per-user cap. Released on drop.
pub struct ActiveSlot {
    monitor: Arc<WorkflowMonitor>,
    user_id: String,
    workflow_id: Uuid,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        let mut active = self.monitor.active.lock();
        if let Some(ids) = active.get_mut(&self.user_id) {
            ids.remove(&self.workflow_id);
            if ids.is_empty() {
                active.remove(&self.user_id);
            }
        }
    }
}

impl WorkflowMonitor {
    pub fn new(max_active_per_user: usize) -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            counters: Mutex::new(Counters::default()),
            max_active_per_user,
        }
    }

    /// Reserve a slot for a new workflow, or refuse if the user is at the cap.
    pub fn try_admit(
        self: &Arc<Self>,
        user_id: &str,
        workflow_id: Uuid,
    ) -> BizflowResult<ActiveSlot> {
        let mut active = self.active.lock();
        let ids = active.entry(user_id.to_string()).or_default();
        if ids.len() >= self.max_active_per_user {
            info!(user_id, limit = self.max_active_per_user, "Workflow refused: at capacity");
            return Err(BizflowError::CapacityExceeded {
                user_id: user_id.to_string(),
                limit: self.max_active_per_user,
            });
        }
        ids.insert(workflow_id);
        Ok(ActiveSlot {
            monitor: self.clone(),
            user_id: user_id.to_string(),
            workflow_id,
        })
    }

    pub fn active_count(&self, user_id: &str) -> usize {
        self.active.lock().get(user_id).map_or(0, HashSet::len)
    }

    /// Record one agent invocation.
    pub fn record_invocation(&self, agent: AgentId, elapsed: Duration, outcome: InvocationOutcome) {
        let mut counters = self.counters.lock();
        let metrics = counters.agents.entry(agent).or_default();
        metrics.invocations += 1;
        metrics.duration_ms += elapsed.as_millis() as u64;
        match outcome {
            InvocationOutcome::Success => {}
            InvocationOutcome::Failure => metrics.failures += 1,
            InvocationOutcome::Timeout => metrics.timeouts += 1,
        }
    }

    /// Count a workflow that reached a terminal status.
    pub fn record_finished(&self, status: crate::types::WorkflowStatus) {
        use crate::types::WorkflowStatus;
        let mut counters = self.counters.lock();
        match status {
            WorkflowStatus::Completed => counters.completed += 1,
            WorkflowStatus::Failed => counters.failed += 1,
            WorkflowStatus::Cancelled => counters.cancelled += 1,
            _ => {}
        }
    }

    pub fn agent_metrics(&self, agent: AgentId) -> AgentMetrics {
        self.counters
            .lock()
            .agents
            .get(&agent)
            .cloned()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let active = self.active.lock();
        let counters = self.counters.lock();
        MonitorSnapshot {
            agents: counters.agents.clone(),
            active_workflows: active.values().map(HashSet::len).sum(),
            active_by_user: active
                .iter()
                .map(|(user, ids)| (user.clone(), ids.len()))
                .collect(),
            completed: counters.completed,
            failed: counters.failed,
            cancelled: counters.cancelled,
        }
    }

    /// The snapshot as JSON, for the health endpoint.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or_default()
    }
}
