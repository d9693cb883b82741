use async_trait::async_trait;
use bizflow_core::{BizflowError, BizflowResult, Notification, Notifier};
use tokio::sync::broadcast;

/// In-process fan-out of notifications, in publish order.
///
/// Used by the CLI and by tests; the gateway has its own socket notifier.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, notification: &Notification) -> BizflowResult<()> {
        self.tx
            .send(notification.clone())
            .map(|_| ())
            .map_err(|_| BizflowError::Channel("no notification subscribers".into()))
    }
}

/// Drops every notification.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _notification: &Notification) -> BizflowResult<()> {
        Ok(())
    }
}
