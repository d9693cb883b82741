use async_trait::async_trait;
use bizflow_core::{BizflowError, BizflowResult, Notification, Notifier};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Notifications kept for reviewers that connect late.
const DEFAULT_BACKLOG: usize = 256;

/// Represents a connected WebSocket client.
#[derive(Debug)]
pub struct Connection {
    pub id: Uuid,
    pub tx: mpsc::UnboundedSender<String>,
}

/// Manages active WebSocket connections and fans workflow notifications
/// out to them.
///
/// Every connection receives every notification; clients filter on
/// `workflow_id` and drop duplicates by notification `id`. New connections
/// first receive the recent backlog.
pub struct ConnectionManager {
    connections: RwLock<HashMap<Uuid, Connection>>,
    backlog: RwLock<VecDeque<String>>,
    backlog_capacity: usize,
}

impl ConnectionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_backlog(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            backlog_capacity: capacity,
            ..Self::default()
        })
    }

    /// Register a connection and replay the backlog to it.
    pub async fn add(&self, conn: Connection) {
        let id = conn.id;
        {
            let backlog = self.backlog.read().await;
            for msg in backlog.iter() {
                let _ = conn.tx.send(msg.clone());
            }
        }
        self.connections.write().await.insert(id, conn);
        tracing::info!(connection_id = %id, "Connection added");
    }

    pub async fn remove(&self, id: Uuid) {
        self.connections.write().await.remove(&id);
        tracing::info!(connection_id = %id, "Connection removed");
    }

    /// Send a message to one connection. Returns false if it is gone.
    pub async fn send_to(&self, connection_id: Uuid, message: &str) -> bool {
        let conns = self.connections.read().await;
        conns
            .get(&connection_id)
            .is_some_and(|c| c.tx.send(message.to_string()).is_ok())
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Broadcast a message to all connected clients; returns how many accepted it.
    pub async fn broadcast(&self, message: &str) -> usize {
        let conns = self.connections.read().await;
        conns
            .values()
            .filter(|c| c.tx.send(message.to_string()).is_ok())
            .count()
    }

    async fn remember(&self, message: &str) {
        if self.backlog_capacity == 0 {
            return;
        }
        let mut backlog = self.backlog.write().await;
        if backlog.len() == self.backlog_capacity {
            backlog.pop_front();
        }
        backlog.push_back(message.to_string());
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            backlog: RwLock::new(VecDeque::new()),
            backlog_capacity: DEFAULT_BACKLOG,
        }
    }
}

#[async_trait]
impl Notifier for ConnectionManager {
    async fn notify(&self, notification: &Notification) -> BizflowResult<()> {
        let json = serde_json::to_string(notification)?;
        self.remember(&json).await;
        if self.broadcast(&json).await == 0 {
            return Err(BizflowError::Channel(format!(
                "no reviewer connected for {}",
                notification.event.kind()
            )));
        }
        Ok(())
    }
}
