//! Core types and error definitions for the bizflow orchestrator.
//!
//! This crate provides the foundational types shared across all bizflow crates:
//! error handling, agent identifiers and result records, the approval wire
//! types, notification events, and the collaborator traits the orchestrator
//! consumes.
//!
//! # Main types
//!
//! - [`BizflowError`]: Unified error enum for all bizflow subsystems.
//! - [`BizflowResult`]: Convenience alias for `Result<T, BizflowError>`.
//! - [`AgentId`]: The fixed set of specialized agents a plan can contain.
//! - [`HistoryEntry`]: One record of the append-only execution history.
//! - [`ApprovalResponse`] / [`Decision`]: Human response on the wire and after validation.
//! - [`Notification`]: An outbound event for the human-facing UI.
//! - [`Agent`], [`Reasoner`], [`Notifier`]: Collaborator interfaces.

/// Agent identifiers, agent results and the agent invocation interface.
pub mod agent;
/// Approval types for the plan and result gates.
pub mod approval;
/// Outbound notification events and the notification channel interface.
pub mod event;
/// The reasoning interface used to propose agent sequences.
pub mod reasoning;

pub use agent::{Agent, AgentId, AgentInput, AgentOutput, EntryOutcome, HistoryEntry, PassKind};
pub use approval::{ApprovalKind, ApprovalResponse, Decision, RevisionRequest, RevisionType};
pub use event::{Notification, Notifier, WorkflowEvent};
pub use reasoning::{Complexity, PlanRequest, RawProposal, Reasoner};

use uuid::Uuid;

// --- Error types ---

/// Top-level error type for bizflow.
///
/// String variants correspond to a subsystem; the structured variants carry the
/// workflow-level failure taxonomy the orchestrator converts into status
/// transitions.
#[derive(Debug, thiserror::Error)]
pub enum BizflowError {
    /// An error raised by an agent implementation.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An error from an outbound HTTP request (e.g. LLM API call).
    #[error("HTTP error: {0}")]
    Http(String),

    /// An error appending to or reading from the workflow journal.
    #[error("Journal error: {0}")]
    Journal(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from a notification channel.
    #[error("Channel error: {0}")]
    Channel(String),

    /// An error from the gateway layer.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// An error from the orchestrator itself (invalid graph, bad state).
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// The reasoning call failed or returned an unusable proposal.
    #[error("Planning failure: {0}")]
    Planning(String),

    /// No human response arrived before the gate timed out.
    #[error("Approval request {request_id} timed out")]
    ApprovalTimeout {
        /// Identifier of the approval request that expired.
        request_id: String,
    },

    /// An agent returned an error, panicked, or exceeded its timeout.
    #[error("Agent '{agent}' failed: {message}")]
    AgentFailure {
        /// The failing agent.
        agent: AgentId,
        /// Human-readable failure detail.
        message: String,
    },

    /// The whole-pass deadline elapsed.
    #[error("Workflow timed out after {elapsed_secs}s")]
    WorkflowTimeout {
        /// Seconds elapsed since the pass started.
        elapsed_secs: u64,
    },

    /// An agent identifier outside the known set.
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// A human response named an unknown agent or carried a malformed payload.
    #[error("Invalid revision request: {0}")]
    InvalidRevision(String),

    /// The workflow was cancelled.
    #[error("Workflow cancelled")]
    Cancelled,

    /// The user already runs the maximum number of active workflows.
    #[error("User '{user_id}' already has {limit} active workflows")]
    CapacityExceeded {
        /// The submitting user.
        user_id: String,
        /// The configured per-user cap.
        limit: usize,
    },

    /// No workflow with this identifier is known.
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(Uuid),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BizflowError {
    /// Short machine-readable code, used in gateway error replies.
    pub fn code(&self) -> &'static str {
        match self {
            BizflowError::Agent(_) => "agent_error",
            BizflowError::Http(_) => "http_error",
            BizflowError::Journal(_) => "journal_error",
            BizflowError::Config(_) => "config_error",
            BizflowError::Channel(_) => "channel_error",
            BizflowError::Gateway(_) => "gateway_error",
            BizflowError::Orchestrator(_) => "orchestrator_error",
            BizflowError::Planning(_) => "planning_failure",
            BizflowError::ApprovalTimeout { .. } => "approval_timeout",
            BizflowError::AgentFailure { .. } => "agent_failure",
            BizflowError::WorkflowTimeout { .. } => "workflow_timeout",
            BizflowError::UnknownAgent(_) => "unknown_agent",
            BizflowError::InvalidRevision(_) => "invalid_revision_request",
            BizflowError::Cancelled => "cancelled",
            BizflowError::CapacityExceeded { .. } => "capacity_exceeded",
            BizflowError::UnknownWorkflow(_) => "unknown_workflow",
            BizflowError::Json(_) => "json_error",
            BizflowError::Io(_) => "io_error",
        }
    }
}

/// A convenience `Result` alias using [`BizflowError`].
pub type BizflowResult<T> = Result<T, BizflowError>;
