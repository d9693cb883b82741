use bizflow_core::{
    AgentId, ApprovalKind, ApprovalResponse, BizflowError, BizflowResult, Decision, Notification,
    Notifier, WorkflowEvent,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// A gate waiting for its response.
struct PendingApproval {
    workflow_id: Uuid,
    kind: ApprovalKind,
    /// Agents a targeted revision may name.
    allowed_targets: Vec<AgentId>,
    tx: oneshot::Sender<Decision>,
}

/// What happened to an inbound response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespondOutcome {
    /// Delivered to the waiting workflow.
    Delivered,
    /// The gate was already resolved or never existed.
    Ignored,
}

/// Suspends workflows at a gate until a human responds, the window elapses,
/// or the workflow is cancelled.
///
/// Each request id resolves at most once. Responses arriving after that are
/// logged and dropped.
pub struct ApprovalGate {
    pending: RwLock<HashMap<String, PendingApproval>>,
    /// Request ids already resolved, by workflow.
    resolved: RwLock<HashMap<String, Uuid>>,
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl ApprovalGate {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            resolved: RwLock::new(HashMap::new()),
            notifier,
            timeout,
        }
    }

    /// Open a gate and wait for its decision.
    ///
    /// `event` builds the request notification from the generated request
    /// id. An elapsed window resolves to [`Decision::timeout`]; cancellation
    /// resolves to [`BizflowError::Cancelled`].
    pub async fn request(
        &self,
        workflow_id: Uuid,
        kind: ApprovalKind,
        allowed_targets: Vec<AgentId>,
        event: impl FnOnce(&str) -> WorkflowEvent + Send,
        cancel: &CancellationToken,
    ) -> BizflowResult<Decision> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, mut rx) = oneshot::channel();

        self.pending.write().await.insert(
            request_id.clone(),
            PendingApproval {
                workflow_id,
                kind,
                allowed_targets,
                tx,
            },
        );

        info!(
            workflow_id = %workflow_id,
            request_id = %request_id,
            gate = %kind,
            "Approval requested"
        );

        let notification = Notification::new(workflow_id, event(&request_id));
        if let Err(e) = self.notifier.notify(&notification).await {
            warn!(
                workflow_id = %workflow_id,
                request_id = %request_id,
                error = %e,
                "Failed to deliver approval request"
            );
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                self.settle(&request_id, workflow_id).await;
                info!(workflow_id = %workflow_id, request_id = %request_id, "Approval cancelled");
                Err(BizflowError::Cancelled)
            }
            received = tokio::time::timeout(self.timeout, &mut rx) => match received {
                Ok(Ok(decision)) => Ok(decision),
                Ok(Err(_)) => {
                    self.settle(&request_id, workflow_id).await;
                    Err(BizflowError::Cancelled)
                }
                Err(_) => {
                    if !self.settle(&request_id, workflow_id).await {
                        // A response won the race against the timer.
                        if let Ok(decision) = rx.try_recv() {
                            return Ok(decision);
                        }
                    }
                    warn!(
                        workflow_id = %workflow_id,
                        request_id = %request_id,
                        timeout_secs = self.timeout.as_secs(),
                        "Approval timed out"
                    );
                    Ok(Decision::timeout(request_id))
                }
            },
        }
    }

    /// Remove the pending entry and mark the id resolved. Returns whether the
    /// entry was still pending.
    async fn settle(&self, request_id: &str, workflow_id: Uuid) -> bool {
        let removed = self.pending.write().await.remove(request_id).is_some();
        self.resolved
            .write()
            .await
            .insert(request_id.to_string(), workflow_id);
        removed
    }

    /// Deliver a human response.
    ///
    /// The response is validated against its gate first; an invalid one is
    /// returned as an error and the gate stays open.
    pub async fn respond(&self, response: ApprovalResponse) -> BizflowResult<RespondOutcome> {
        let mut pending = self.pending.write().await;
        let Some(entry) = pending.get(&response.request_id) else {
            drop(pending);
            if self.resolved.read().await.contains_key(&response.request_id) {
                warn!(request_id = %response.request_id, "Ignoring response for resolved approval");
            } else {
                warn!(request_id = %response.request_id, "Ignoring response for unknown approval");
            }
            return Ok(RespondOutcome::Ignored);
        };

        let decision = response.validate(entry.kind, &entry.allowed_targets)?;
        let Some(entry) = pending.remove(&response.request_id) else {
            return Ok(RespondOutcome::Ignored);
        };

        info!(
            workflow_id = %entry.workflow_id,
            request_id = %response.request_id,
            gate = %entry.kind,
            approved = decision.approved,
            "Approval response received"
        );

        // Send before releasing `pending`: a waiter whose window elapsed
        // meanwhile finds the entry gone and the decision in its channel.
        let delivered = entry.tx.send(decision).is_ok();
        self.resolved
            .write()
            .await
            .insert(response.request_id.clone(), entry.workflow_id);
        drop(pending);

        if !delivered {
            warn!(request_id = %response.request_id, "Approval waiter already gone");
            return Ok(RespondOutcome::Ignored);
        }
        Ok(RespondOutcome::Delivered)
    }

    /// Open gates of a workflow, as `(request_id, kind)`.
    pub async fn pending_for(&self, workflow_id: Uuid) -> Vec<(String, ApprovalKind)> {
        self.pending
            .read()
            .await
            .iter()
            .filter(|(_, p)| p.workflow_id == workflow_id)
            .map(|(id, p)| (id.clone(), p.kind))
            .collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Drop the resolved-id bookkeeping of a finished workflow.
    pub async fn forget(&self, workflow_id: Uuid) {
        self.resolved
            .write()
            .await
            .retain(|_, wid| *wid != workflow_id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::notify::BroadcastNotifier;
    use bizflow_core::RevisionRequest;

    fn gate(timeout: Duration) -> (Arc<ApprovalGate>, Arc<BroadcastNotifier>) {
        let notifier = Arc::new(BroadcastNotifier::new(16));
        (
            Arc::new(ApprovalGate::new(notifier.clone(), timeout)),
            notifier,
        )
    }

    fn completed(request_id: &str) -> WorkflowEvent {
        WorkflowEvent::FinalResultsApprovalRequest {
            request_id: request_id.to_string(),
            iteration: 1,
            results: Default::default(),
            summary: String::new(),
        }
    }

    /// Open a result gate in the background and return the request id.
    async fn open(
        gate: &Arc<ApprovalGate>,
        notifier: &BroadcastNotifier,
        cancel: CancellationToken,
    ) -> (String, tokio::task::JoinHandle<BizflowResult<Decision>>) {
        let mut rx = notifier.subscribe();
        let g = gate.clone();
        let handle = tokio::spawn(async move {
            g.request(
                Uuid::new_v4(),
                ApprovalKind::Result,
                vec![AgentId::Coordinator, AgentId::Invoice],
                completed,
                &cancel,
            )
            .await
        });
        let request_id = match rx.recv().await.unwrap().event {
            WorkflowEvent::FinalResultsApprovalRequest { request_id, .. } => request_id,
            other => panic!("unexpected {other:?}"),
        };
        (request_id, handle)
    }

    #[tokio::test]
    async fn test_response_resolves_gate() {
        let (gate, notifier) = gate(Duration::from_secs(60));
        let (id, handle) = open(&gate, &notifier, CancellationToken::new()).await;

        let outcome = gate.respond(ApprovalResponse::approve(&id)).await.unwrap();
        assert_eq!(outcome, RespondOutcome::Delivered);
        let decision = handle.await.unwrap().unwrap();
        assert!(decision.approved);
        assert_eq!(gate.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_response_is_ignored() {
        let (gate, notifier) = gate(Duration::from_secs(60));
        let (id, handle) = open(&gate, &notifier, CancellationToken::new()).await;

        gate.respond(ApprovalResponse::approve(&id)).await.unwrap();
        let second = gate
            .respond(ApprovalResponse::reject(&id, Some("changed my mind")))
            .await
            .unwrap();
        assert_eq!(second, RespondOutcome::Ignored);
        assert!(handle.await.unwrap().unwrap().approved);
    }

    #[tokio::test]
    async fn test_invalid_response_keeps_gate_open() {
        let (gate, notifier) = gate(Duration::from_secs(60));
        let (id, handle) = open(&gate, &notifier, CancellationToken::new()).await;

        let mut bad = ApprovalResponse::reject(&id, None);
        bad.target_agents = Some(vec!["crm".into()]);
        let err = gate.respond(bad).await.unwrap_err();
        assert_eq!(err.code(), "invalid_revision_request");
        assert_eq!(gate.pending_count().await, 1);

        let mut good = ApprovalResponse::reject(&id, Some("redo invoices"));
        good.target_agents = Some(vec!["invoice".into()]);
        gate.respond(good).await.unwrap();
        let decision = handle.await.unwrap().unwrap();
        assert_eq!(
            decision.revision,
            Some(RevisionRequest::SpecificAgents(vec![AgentId::Invoice]))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resolves_to_rejection() {
        let (gate, notifier) = gate(Duration::from_secs(30));
        let (id, handle) = open(&gate, &notifier, CancellationToken::new()).await;

        let decision = handle.await.unwrap().unwrap();
        assert!(decision.timed_out);
        assert!(!decision.approved);
        assert_eq!(decision.feedback.as_deref(), Some("timeout"));

        let late = gate.respond(ApprovalResponse::approve(&id)).await.unwrap();
        assert_eq!(late, RespondOutcome::Ignored);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_response_at_deadline_agrees_with_waiter() {
        for _ in 0..50 {
            let (gate, notifier) = gate(Duration::from_millis(10));
            let (id, handle) = open(&gate, &notifier, CancellationToken::new()).await;

            let g = gate.clone();
            let responder = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                g.respond(ApprovalResponse::approve(&id)).await.unwrap()
            });

            let decision = handle.await.unwrap().unwrap();
            let outcome = responder.await.unwrap();
            match outcome {
                RespondOutcome::Delivered => {
                    assert!(decision.approved);
                    assert!(!decision.timed_out);
                }
                RespondOutcome::Ignored => assert!(decision.timed_out),
            }
            assert_eq!(gate.pending_count().await, 0);
        }
    }

    #[tokio::test]
    async fn test_cancel_resolves_waiter() {
        let (gate, notifier) = gate(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let (_id, handle) = open(&gate, &notifier, cancel.clone()).await;

        cancel.cancel();
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.code(), "cancelled");
        assert_eq!(gate.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_request_is_ignored() {
        let (gate, _notifier) = gate(Duration::from_secs(60));
        let outcome = gate
            .respond(ApprovalResponse::approve("no-such-request"))
            .await
            .unwrap();
        assert_eq!(outcome, RespondOutcome::Ignored);
    }
}
