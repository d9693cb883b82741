//! Linear workflow orchestration with human approval gates.
//!
//! A task is turned into an agent sequence by an untrusted planner, shown
//! to a human at the plan gate, compiled into a strictly linear graph and
//! walked one agent at a time. The accumulated results go through a second
//! gate; rejections start new, independently bounded passes.
//!
//! # Main types
//!
//! - [`Orchestrator`]: drives workflows and owns their state.
//! - [`SequencePlanner`]: validated proposals with a deterministic fallback.
//! - [`GraphBuilder`]: compiles sequences into cached linear graphs.
//! - [`ApprovalGate`]: suspends a workflow until a human decides.
//! - [`LinearExecutor`]: runs one pass with timeouts and cancellation.
//! - [`RevisionController`]: maps gate decisions to the next action.
//! - [`WorkflowMonitor`]: per-agent metrics and the per-user cap.

/// Workflow timeouts and limits.
pub mod config;
/// The workflow driver.
pub mod engine;
/// Step-by-step execution of a compiled graph.
pub mod executor;
/// Human approval gates.
pub mod gate;
/// Linear execution graphs.
pub mod graph;
/// Typed journal records and replay.
pub mod journal;
/// Metrics and per-user capacity.
pub mod monitor;
/// In-process notifiers.
pub mod notify;
/// Sequence proposals and the fallback plan.
pub mod planner;
/// Available agents.
pub mod registry;
/// Decision interpretation.
pub mod revision;
/// Workflow state and status types.
pub mod types;

pub use config::WorkflowConfig;
pub use engine::{Orchestrator, WorkflowHandle};
pub use executor::LinearExecutor;
pub use gate::{ApprovalGate, RespondOutcome};
pub use graph::{Edge, ExecutionGraph, GraphBuilder, GraphNode};
pub use journal::{WorkflowJournal, WorkflowRecord};
pub use monitor::{AgentMetrics, MonitorSnapshot, WorkflowMonitor};
pub use notify::{BroadcastNotifier, NullNotifier};
pub use planner::{Plan, SequencePlanner, FALLBACK_SEQUENCE};
pub use registry::AgentRegistry;
pub use revision::{NextAction, RevisionController, Termination};
pub use types::{ApprovalState, ApprovalStatus, ExecutionOutcome, WorkflowState, WorkflowStatus};
