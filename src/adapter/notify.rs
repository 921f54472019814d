use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{Level, event};

use crate::{
    domain::{constant::notifier, error::WorkflowError, event::Notification},
    port::notify::NotificationDispatcher
};

/// Dispatcher that only records notifications in the log
#[derive(Debug, Default, Clone)]
pub struct LoggingDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn notify(&self, notification: Notification) -> Result<(), WorkflowError> {
        event!(
            Level::INFO,
            event = notifier::NOTIFICATION_SENT,
            kind = %notification.kind,
            process_id = %notification.process_id,
            entity_id = %notification.entity_id,
            recipient_id = %notification.recipient_id,
            urgent = notification.urgent
        );
        Ok(())
    }
}

/// Dispatcher that forwards notifications to an in-process consumer
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::Sender<Notification>
}

impl ChannelDispatcher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl NotificationDispatcher for ChannelDispatcher {
    async fn notify(&self, notification: Notification) -> Result<(), WorkflowError> {
        self.sender
            .send(notification)
            .await
            .map_err(|e| WorkflowError::Notification(format!("Notification consumer is gone: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::NotificationKind;

    fn notification() -> Notification {
        Notification {
            kind:         NotificationKind::OpinionRequested,
            process_id:   "p-1".to_string(),
            entity_id:    "o-1".to_string(),
            recipient_id: "S1".to_string(),
            due_at:       None,
            urgent:       false
        }
    }

    #[tokio::test]
    async fn test_channel_dispatcher_delivers() {
        let (dispatcher, mut receiver) = ChannelDispatcher::new(4);
        dispatcher.notify(notification()).await.unwrap();
        assert_eq!(receiver.recv().await.unwrap(), notification());
    }

    #[tokio::test]
    async fn test_channel_dispatcher_fails_without_consumer() {
        let (dispatcher, receiver) = ChannelDispatcher::new(1);
        drop(receiver);
        let err = dispatcher.notify(notification()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Notification(_)));
    }
}
