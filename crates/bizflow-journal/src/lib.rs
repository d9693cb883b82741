//! Append-only, per-workflow journal.
//!
//! Every workflow state transition and execution-history entry is appended
//! here keyed by workflow id, so a workflow can be reconstructed after a
//! crash. The journal only knows `append` and `read`; the orchestrator owns
//! the meaning of the payloads.

pub mod file;
pub mod memory;

pub use file::FileJournal;
pub use memory::MemoryJournal;

use async_trait::async_trait;
use bizflow_core::BizflowResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One appended record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Position within the workflow's journal, starting at 0.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    /// Record type, e.g. `status_changed`.
    pub kind: String,
    pub payload: serde_json::Value,
}

/// Durable append + read-by-key storage.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Append a record and return it with its assigned sequence number.
    async fn append(
        &self,
        workflow_id: Uuid,
        kind: &str,
        payload: serde_json::Value,
    ) -> BizflowResult<JournalEntry>;

    /// All records of a workflow, in append order. Unknown ids yield an empty vec.
    async fn read(&self, workflow_id: Uuid) -> BizflowResult<Vec<JournalEntry>>;

    /// Every workflow id with at least one record.
    async fn workflows(&self) -> BizflowResult<Vec<Uuid>>;
}
