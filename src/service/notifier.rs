use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tracing::{Level, event};

use crate::{
    domain::{constant::notifier, event::Notification},
    port::notify::NotificationDispatcher
};

/// Fire-and-forget front for the notification dispatcher.
///
/// Every call runs on its own task under a timeout; failures are logged and
/// never reach the workflow operation that raised the notification.
#[derive(Clone)]
pub struct Notifier {
    dispatcher: Arc<dyn NotificationDispatcher>,
    timeout:    Duration
}

impl Notifier {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>, timeout: Duration) -> Self {
        Self { dispatcher, timeout }
    }

    /// Dispatch in the background. The handle is only useful to tests.
    pub fn notify(&self, notification: Notification) -> JoinHandle<()> {
        let dispatcher = self.dispatcher.clone();
        let timeout = self.timeout;

        tokio::spawn(async move {
            let kind = notification.kind;
            let entity_id = notification.entity_id.clone();

            match tokio::time::timeout(timeout, dispatcher.notify(notification)).await {
                Ok(Ok(())) => {
                    event!(Level::DEBUG, event = notifier::NOTIFICATION_SENT, kind = %kind, entity_id = %entity_id);
                }
                Ok(Err(e)) => {
                    event!(Level::WARN, event = notifier::NOTIFICATION_FAILED, kind = %kind, entity_id = %entity_id,
                           error = %e);
                }
                Err(_) => {
                    event!(Level::WARN, event = notifier::NOTIFICATION_TIMED_OUT, kind = %kind, entity_id = %entity_id,
                           timeout_ms = timeout.as_millis() as u64);
                }
            }
        })
    }
}
