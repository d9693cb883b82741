#![allow(clippy::unwrap_used, clippy::expect_used)]

use bizflow_journal::{FileJournal, Journal, MemoryJournal};
use std::sync::Arc;
use uuid::Uuid;

/// Helper: create a FileJournal in a temp directory.
async fn temp_journal() -> (FileJournal, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let journal = FileJournal::new(tmp.path().join("journal")).await.unwrap();
    (journal, tmp)
}

async fn concurrent_appends_keep_dense_seq(journal: Arc<dyn Journal>) {
    let wid = Uuid::new_v4();
    let mut handles = Vec::new();
    for i in 0..20 {
        let j = journal.clone();
        handles.push(tokio::spawn(async move {
            j.append(wid, "tick", serde_json::json!({ "i": i })).await.unwrap()
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let entries = journal.read(wid).await.unwrap();
    let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (0..20).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_file_journal_concurrent_appends() {
    let (journal, _tmp) = temp_journal().await;
    concurrent_appends_keep_dense_seq(Arc::new(journal)).await;
}

#[tokio::test]
async fn test_memory_journal_concurrent_appends() {
    concurrent_appends_keep_dense_seq(Arc::new(MemoryJournal::new())).await;
}

#[tokio::test]
async fn test_file_journal_lists_workflows() {
    let (journal, _tmp) = temp_journal().await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    journal.append(a, "created", serde_json::json!({})).await.unwrap();
    journal.append(b, "created", serde_json::json!({})).await.unwrap();

    let ids = journal.workflows().await.unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&a));
    assert!(ids.contains(&b));
}

#[tokio::test]
async fn test_payload_is_stored_verbatim() {
    let (journal, _tmp) = temp_journal().await;
    let wid = Uuid::new_v4();
    let payload = serde_json::json!({
        "agent": "invoice",
        "output": {"summary": "3 matched", "data": {"ids": [1, 2, 3]}}
    });
    journal.append(wid, "result_stored", payload.clone()).await.unwrap();

    let entries = journal.read(wid).await.unwrap();
    assert_eq!(entries[0].payload, payload);
    assert_eq!(entries[0].workflow_id, wid);
}
