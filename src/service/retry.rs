use std::{future::Future, time::Duration};

use tracing::{Level, event};

use crate::domain::{constant::store, error::WorkflowError};

/// Run `operation` up to `max_attempts` times while it fails with a retryable error.
///
/// Each attempt must reload what it validates: only `ConcurrentModification`
/// is retried, and it means the copy the attempt worked on went stale.
pub async fn with_retry<T, F, Fut>(max_attempts: u32, mut operation: F) -> Result<T, WorkflowError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, WorkflowError>>
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                event!(Level::DEBUG, event = store::RETRY_SCHEDULED, attempt = attempt, error = %err);
                tokio::time::sleep(backoff(attempt)).await;
                attempt += 1;
            }
            result => return result
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(2u64 << attempt.min(6))
}
