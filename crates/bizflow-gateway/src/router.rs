use crate::connection::ConnectionManager;
use bizflow_core::{ApprovalKind, ApprovalResponse, BizflowError, BizflowResult};
use bizflow_orchestrator::{Orchestrator, RespondOutcome, WorkflowState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Messages a reviewer client sends over the WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    SubmitTask {
        user_id: String,
        task_description: String,
    },
    ApprovalResponse(ApprovalResponse),
    Cancel {
        workflow_id: Uuid,
    },
    GetWorkflow {
        workflow_id: Uuid,
    },
}

/// An open gate, as shown in a workflow snapshot.
#[derive(Debug, Serialize, Deserialize)]
pub struct PendingApproval {
    pub request_id: String,
    pub kind: ApprovalKind,
}

/// Direct replies to a single connection. Workflow events are broadcast
/// separately by the [`ConnectionManager`].
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    WorkflowSubmitted {
        workflow_id: Uuid,
    },
    ApprovalAck {
        request_id: String,
        delivered: bool,
    },
    CancelAck {
        workflow_id: Uuid,
    },
    WorkflowSnapshot {
        workflow: WorkflowState,
        pending_approvals: Vec<PendingApproval>,
    },
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl OutboundMessage {
    fn error(err: &BizflowError, request_id: Option<String>) -> Self {
        OutboundMessage::Error {
            code: err.code().to_string(),
            message: err.to_string(),
            request_id,
        }
    }
}

/// Routes inbound messages to the orchestrator and replies to the sender.
pub struct MessageRouter {
    orchestrator: Arc<Orchestrator>,
    connections: Arc<ConnectionManager>,
}

impl MessageRouter {
    pub fn new(orchestrator: Arc<Orchestrator>, connections: Arc<ConnectionManager>) -> Self {
        Self {
            orchestrator,
            connections,
        }
    }

    /// Handle one raw text frame from a connection.
    pub async fn handle_text(&self, text: &str, connection_id: Uuid) -> BizflowResult<()> {
        let reply = match serde_json::from_str::<InboundMessage>(text) {
            Ok(msg) => self.dispatch(msg).await,
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "Rejected malformed message");
                OutboundMessage::Error {
                    code: "invalid_message".into(),
                    message: e.to_string(),
                    request_id: None,
                }
            }
        };
        let json = serde_json::to_string(&reply)?;
        self.connections.send_to(connection_id, &json).await;
        Ok(())
    }

    /// Execute a parsed message and build the reply.
    pub async fn dispatch(&self, msg: InboundMessage) -> OutboundMessage {
        match msg {
            InboundMessage::SubmitTask {
                user_id,
                task_description,
            } => match self.orchestrator.submit(&user_id, &task_description).await {
                Ok(handle) => {
                    info!(workflow_id = %handle.workflow_id, user_id = %user_id, "Task submitted via gateway");
                    OutboundMessage::WorkflowSubmitted {
                        workflow_id: handle.workflow_id,
                    }
                }
                Err(e) => OutboundMessage::error(&e, None),
            },
            InboundMessage::ApprovalResponse(response) => {
                let request_id = response.request_id.clone();
                match self.orchestrator.respond(response).await {
                    Ok(outcome) => OutboundMessage::ApprovalAck {
                        request_id,
                        delivered: outcome == RespondOutcome::Delivered,
                    },
                    Err(e) => OutboundMessage::error(&e, Some(request_id)),
                }
            }
            InboundMessage::Cancel { workflow_id } => {
                match self.orchestrator.cancel(workflow_id).await {
                    Ok(()) => OutboundMessage::CancelAck { workflow_id },
                    Err(e) => OutboundMessage::error(&e, None),
                }
            }
            InboundMessage::GetWorkflow { workflow_id } => {
                match self.workflow_view(workflow_id).await {
                    Ok((workflow, pending_approvals)) => OutboundMessage::WorkflowSnapshot {
                        workflow,
                        pending_approvals,
                    },
                    Err(e) => OutboundMessage::error(&e, None),
                }
            }
        }
    }

    /// Live snapshot, or the journal replay for workflows this process no
    /// longer (or never) held.
    pub async fn workflow_view(
        &self,
        workflow_id: Uuid,
    ) -> BizflowResult<(WorkflowState, Vec<PendingApproval>)> {
        let state = match self.orchestrator.snapshot(workflow_id).await {
            Some(state) => state,
            None => self.orchestrator.recover(workflow_id).await?,
        };
        let pending = self
            .orchestrator
            .pending_approvals(workflow_id)
            .await
            .into_iter()
            .map(|(request_id, kind)| PendingApproval { request_id, kind })
            .collect();
        Ok((state, pending))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_approval_response_shape() {
        let msg: InboundMessage = serde_json::from_str(
            r#"{"type":"approval_response","request_id":"r1","approved":false,
                "feedback":"redo","revision_type":"specific_agents","target_agents":["crm"]}"#,
        )
        .unwrap();
        match msg {
            InboundMessage::ApprovalResponse(r) => {
                assert_eq!(r.request_id, "r1");
                assert!(!r.approved);
                assert_eq!(r.target_agents.unwrap(), vec!["crm".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_error_reply_carries_code() {
        let reply = OutboundMessage::error(
            &BizflowError::InvalidRevision("unknown agent 'hr'".into()),
            Some("r9".into()),
        );
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "invalid_revision_request");
        assert_eq!(json["request_id"], "r9");
    }
}
