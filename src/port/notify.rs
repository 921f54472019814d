use async_trait::async_trait;

use crate::domain::{error::WorkflowError, event::Notification};

/// Port for delivering workflow signals (push, e-mail, websocket...)
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), WorkflowError>;
}
