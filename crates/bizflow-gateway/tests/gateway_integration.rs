#![allow(clippy::unwrap_used, clippy::expect_used)]

use bizflow_core::Notifier;
use bizflow_gateway::{ConnectionManager, GatewayServer};
use bizflow_journal::{Journal, MemoryJournal};
use bizflow_orchestrator::{AgentRegistry, Orchestrator, WorkflowConfig};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Helper: build a test server on a random port with offline agents and no
/// planner model, so every workflow runs the fallback sequence.
async fn start_test_server() -> String {
    let connections = ConnectionManager::new();
    let mut agents = AgentRegistry::new();
    for agent in bizflow_agent::default_agents(None) {
        agents.register(agent);
    }
    let journal: Arc<dyn Journal> = Arc::new(MemoryJournal::new());
    let notifier: Arc<dyn Notifier> = connections.clone();
    let orchestrator = Arc::new(Orchestrator::new(
        WorkflowConfig::default(),
        agents,
        None,
        notifier,
        journal,
    ));
    let app = GatewayServer::build(orchestrator, connections);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("127.0.0.1:{}", addr.port())
}

async fn connect_ws(addr: &str) -> Ws {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    let welcome = next_json(&mut ws).await;
    assert_eq!(welcome["type"], "connected");
    ws
}

async fn next_json(ws: &mut Ws) -> serde_json::Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("no message within 5s")
        .unwrap()
        .unwrap();
    serde_json::from_str(&msg.into_text().unwrap()).unwrap()
}

/// Skip messages until one of the given type arrives.
async fn next_of_type(ws: &mut Ws, kind: &str) -> serde_json::Value {
    loop {
        let msg = next_json(ws).await;
        if msg["type"] == kind {
            return msg;
        }
    }
}

async fn send(ws: &mut Ws, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn submit(ws: &mut Ws, task: &str) -> (String, serde_json::Value) {
    send(
        ws,
        serde_json::json!({"type": "submit_task", "user_id": "ops", "task_description": task}),
    )
    .await;
    // The plan request may overtake the submit reply.
    let mut workflow_id = None;
    let mut plan = None;
    while workflow_id.is_none() || plan.is_none() {
        let msg = next_json(ws).await;
        match msg["type"].as_str().unwrap() {
            "workflow_submitted" => workflow_id = Some(msg["workflow_id"].as_str().unwrap().to_string()),
            "plan_approval_request" => plan = Some(msg),
            _ => {}
        }
    }
    (workflow_id.unwrap(), plan.unwrap())
}

#[tokio::test]
async fn test_health_endpoint() {
    let addr = start_test_server().await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "bizflow");
}

#[tokio::test]
async fn test_full_workflow_over_websocket() {
    let addr = start_test_server().await;
    let mut ws = connect_ws(&addr).await;

    let (workflow_id, plan) = submit(&mut ws, "Summarize this week's invoices").await;
    assert_eq!(plan["workflow_id"], workflow_id.as_str());
    assert_eq!(plan["sequence"], serde_json::json!(["coordinator", "analysis"]));
    assert!(plan["fallback_reason"].is_string());
    let plan_request = plan["request_id"].as_str().unwrap().to_string();

    // An unknown agent is rejected and the gate stays open.
    send(
        &mut ws,
        serde_json::json!({
            "type": "approval_response",
            "request_id": plan_request,
            "approved": false,
            "modified_sequence": ["coordinator", "payroll"]
        }),
    )
    .await;
    let err = next_of_type(&mut ws, "error").await;
    assert_eq!(err["code"], "invalid_revision_request");
    assert_eq!(err["request_id"], plan_request.as_str());

    let snapshot: serde_json::Value = reqwest::get(format!("http://{addr}/workflows/{workflow_id}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot["workflow"]["status"], "awaiting_plan_approval");
    assert_eq!(snapshot["pending_approvals"][0]["request_id"], plan_request.as_str());
    assert_eq!(snapshot["pending_approvals"][0]["kind"], "plan");

    send(
        &mut ws,
        serde_json::json!({"type": "approval_response", "request_id": plan_request, "approved": true}),
    )
    .await;
    let ack = next_of_type(&mut ws, "approval_ack").await;
    assert_eq!(ack["delivered"], true);

    let results = next_of_type(&mut ws, "final_results_approval_request").await;
    assert_eq!(results["iteration"], 1);
    assert!(results["results"]["coordinator"]["summary"].is_string());
    assert!(results["results"]["analysis"]["summary"].is_string());

    send(
        &mut ws,
        serde_json::json!({
            "type": "approval_response",
            "request_id": results["request_id"],
            "approved": true
        }),
    )
    .await;
    let done = next_of_type(&mut ws, "workflow_completed").await;
    assert_eq!(done["iterations"], 1);

    let get = serde_json::json!({"type": "get_workflow", "workflow_id": workflow_id});
    send(&mut ws, get).await;
    let snap = next_of_type(&mut ws, "workflow_snapshot").await;
    assert_eq!(snap["workflow"]["status"], "completed");
    assert_eq!(snap["workflow"]["execution_history"].as_array().unwrap().len(), 2);
    assert_eq!(snap["pending_approvals"], serde_json::json!([]));

    // A second answer to the resolved gate is acknowledged but not delivered.
    send(
        &mut ws,
        serde_json::json!({"type": "approval_response", "request_id": plan_request, "approved": true}),
    )
    .await;
    let late = next_of_type(&mut ws, "approval_ack").await;
    assert_eq!(late["delivered"], false);
}

#[tokio::test]
async fn test_cancel_at_plan_gate() {
    let addr = start_test_server().await;
    let mut ws = connect_ws(&addr).await;

    let (workflow_id, _plan) = submit(&mut ws, "Update CRM contacts").await;
    send(
        &mut ws,
        serde_json::json!({"type": "cancel", "workflow_id": workflow_id}),
    )
    .await;
    let ack = next_of_type(&mut ws, "cancel_ack").await;
    assert_eq!(ack["workflow_id"], workflow_id.as_str());
    next_of_type(&mut ws, "workflow_cancelled").await;

    let snapshot: serde_json::Value = reqwest::get(format!("http://{addr}/workflows/{workflow_id}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot["workflow"]["status"], "cancelled");
}

#[tokio::test]
async fn test_unknown_workflow_and_bad_messages() {
    let addr = start_test_server().await;

    let resp = reqwest::get(format!(
        "http://{addr}/workflows/00000000-0000-0000-0000-000000000000"
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "unknown_workflow");

    let mut ws = connect_ws(&addr).await;
    ws.send(Message::Text("not json".into())).await.unwrap();
    let err = next_of_type(&mut ws, "error").await;
    assert_eq!(err["code"], "invalid_message");

    send(
        &mut ws,
        serde_json::json!({"type": "submit_task", "user_id": "ops", "task_description": "   "}),
    )
    .await;
    let err = next_of_type(&mut ws, "error").await;
    assert_eq!(err["code"], "orchestrator_error");
}

#[tokio::test]
async fn test_late_reviewer_sees_open_plan_request() {
    let addr = start_test_server().await;
    let mut submitter = connect_ws(&addr).await;
    let (workflow_id, _plan) = submit(&mut submitter, "Draft replies to vendor emails").await;

    let mut reviewer = connect_ws(&addr).await;
    let replayed = next_of_type(&mut reviewer, "plan_approval_request").await;
    assert_eq!(replayed["workflow_id"], workflow_id.as_str());

    let metrics: serde_json::Value = reqwest::get(format!("http://{addr}/metrics"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metrics["active_by_user"]["ops"], 1);
}
