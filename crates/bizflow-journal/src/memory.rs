use crate::{Journal, JournalEntry};
use async_trait::async_trait;
use bizflow_core::BizflowResult;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process journal. Lost on restart; used by tests and the offline CLI.
#[derive(Default)]
pub struct MemoryJournal {
    entries: RwLock<HashMap<Uuid, Vec<JournalEntry>>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records across all workflows.
    pub async fn len(&self) -> usize {
        self.entries.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn append(
        &self,
        workflow_id: Uuid,
        kind: &str,
        payload: serde_json::Value,
    ) -> BizflowResult<JournalEntry> {
        let mut entries = self.entries.write().await;
        let log = entries.entry(workflow_id).or_default();
        let entry = JournalEntry {
            id: Uuid::new_v4(),
            workflow_id,
            seq: log.len() as u64,
            timestamp: Utc::now(),
            kind: kind.to_string(),
            payload,
        };
        log.push(entry.clone());
        Ok(entry)
    }

    async fn read(&self, workflow_id: Uuid) -> BizflowResult<Vec<JournalEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .get(&workflow_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn workflows(&self) -> BizflowResult<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self.entries.read().await.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
