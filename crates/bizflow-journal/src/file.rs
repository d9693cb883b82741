use crate::{Journal, JournalEntry};
use async_trait::async_trait;
use bizflow_core::{BizflowError, BizflowResult};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

const SUFFIX: &str = ".journal.jsonl";

/// Next sequence number of one workflow. `None` until the file was read.
type SeqSlot = Arc<Mutex<Option<u64>>>;

/// JSON-lines journal, one file per workflow.
///
/// Appends to the same workflow are serialized through that workflow's
/// lock so sequence numbers match line order. Different workflows never
/// wait on each other.
pub struct FileJournal {
    dir: PathBuf,
    slots: Mutex<HashMap<Uuid, SeqSlot>>,
}

/// Parsed contents of a journal file.
struct Loaded {
    entries: Vec<JournalEntry>,
    /// Byte length of the intact prefix when the last line is incomplete.
    torn_at: Option<u64>,
}

impl FileJournal {
    pub async fn new(dir: PathBuf) -> BizflowResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            slots: Mutex::new(HashMap::new()),
        })
    }

    fn journal_path(&self, workflow_id: Uuid) -> PathBuf {
        self.dir.join(format!("{workflow_id}{SUFFIX}"))
    }

    async fn slot(&self, workflow_id: Uuid) -> SeqSlot {
        self.slots
            .lock()
            .await
            .entry(workflow_id)
            .or_default()
            .clone()
    }

    async fn load(path: &Path) -> BizflowResult<Loaded> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(Loaded {
                entries: Vec::new(),
                torn_at: None,
            });
        }
        let data = tokio::fs::read_to_string(path).await?;
        let (complete, tail) = match data.rfind('\n') {
            Some(end) => data.split_at(end + 1),
            None => ("", data.as_str()),
        };

        let mut entries = Vec::new();
        for line in complete.lines().filter(|l| !l.trim().is_empty()) {
            let entry: JournalEntry = serde_json::from_str(line).map_err(|e| {
                BizflowError::Journal(format!("corrupt journal {}: {e}", path.display()))
            })?;
            entries.push(entry);
        }

        // A write interrupted mid-line leaves a tail without a newline.
        let mut torn_at = None;
        if !tail.trim().is_empty() {
            match serde_json::from_str::<JournalEntry>(tail) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring incomplete journal line");
                    torn_at = Some(complete.len() as u64);
                }
            }
        }

        entries.sort_by_key(|e| e.seq);
        Ok(Loaded { entries, torn_at })
    }

    /// Read the file for the first append and cut off an incomplete last line.
    async fn recover_seq(path: &Path) -> BizflowResult<u64> {
        let loaded = Self::load(path).await?;
        if let Some(len) = loaded.torn_at {
            let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
            file.set_len(len).await?;
            warn!(path = %path.display(), len, "truncated incomplete journal line");
        }
        Ok(loaded.entries.last().map_or(0, |e| e.seq + 1))
    }

    async fn write_line(path: &Path, entry: &JournalEntry) -> BizflowResult<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Journal for FileJournal {
    async fn append(
        &self,
        workflow_id: Uuid,
        kind: &str,
        payload: serde_json::Value,
    ) -> BizflowResult<JournalEntry> {
        let slot = self.slot(workflow_id).await;
        let mut next_seq = slot.lock().await;
        let path = self.journal_path(workflow_id);
        let seq = match *next_seq {
            Some(seq) => seq,
            // First append since startup: continue after what is on disk.
            None => Self::recover_seq(&path).await?,
        };

        let entry = JournalEntry {
            id: Uuid::new_v4(),
            workflow_id,
            seq,
            timestamp: Utc::now(),
            kind: kind.to_string(),
            payload,
        };

        if let Err(e) = Self::write_line(&path, &entry).await {
            // The file may now end mid-line; re-read it on the next append.
            *next_seq = None;
            return Err(e);
        }

        *next_seq = Some(seq + 1);
        debug!(workflow_id = %workflow_id, seq, kind, "journal append");
        Ok(entry)
    }

    async fn read(&self, workflow_id: Uuid) -> BizflowResult<Vec<JournalEntry>> {
        Ok(Self::load(&self.journal_path(workflow_id)).await?.entries)
    }

    async fn workflows(&self) -> BizflowResult<Vec<Uuid>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(SUFFIX) {
                    if let Ok(id) = Uuid::parse_str(stem) {
                        ids.push(id);
                    }
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
