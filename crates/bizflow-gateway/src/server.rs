use crate::connection::{Connection, ConnectionManager};
use crate::router::MessageRouter;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use bizflow_orchestrator::Orchestrator;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

/// Shared application state.
pub struct AppState {
    pub router: Arc<MessageRouter>,
    pub connections: Arc<ConnectionManager>,
    pub orchestrator: Arc<Orchestrator>,
}

/// The main gateway server.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the gateway routes.
    ///
    /// `connections` must be the notifier the orchestrator was built with,
    /// otherwise reviewers never see workflow events.
    pub fn build(orchestrator: Arc<Orchestrator>, connections: Arc<ConnectionManager>) -> Router {
        let router = Arc::new(MessageRouter::new(orchestrator.clone(), connections.clone()));
        let state = Arc::new(AppState {
            router,
            connections,
            orchestrator,
        });

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/workflows/{id}", get(workflow_handler))
            .with_state(state)
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "bizflow",
        "connections": state.connections.connection_count().await,
    }))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.orchestrator.monitor().to_json())
}

async fn workflow_handler(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    match state.router.workflow_view(id).await {
        Ok((workflow, pending)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "workflow": workflow,
                "pending_approvals": pending,
            })),
        ),
        Err(e) => {
            let status = match e {
                bizflow_core::BizflowError::UnknownWorkflow(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(serde_json::json!({"code": e.code(), "message": e.to_string()})),
            )
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for sending messages back to the WebSocket
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let welcome = serde_json::json!({
        "type": "connected",
        "connection_id": connection_id,
    });
    let _ = tx.send(welcome.to_string());

    state
        .connections
        .add(Connection {
            id: connection_id,
            tx,
        })
        .await;

    info!(connection_id = %connection_id, "WebSocket connected");

    use futures_util::SinkExt;
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    use futures_util::StreamExt;
    let router = state.router.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Err(e) = router.handle_text(text.as_str(), connection_id).await {
                        error!(error = %e, "Failed to handle message");
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.connections.remove(connection_id).await;
    info!(connection_id = %connection_id, "WebSocket disconnected");
}
