//! Queue consumer driving the dispatcher.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::services::{DispatchOutcome, NotificationDispatcher, NotificationQueue, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    Delivered(DispatchOutcome),
    /// Failed; re-queued after a backoff as this attempt number.
    Retrying { attempt: u32 },
    /// Failed on the last allowed attempt and was discarded.
    Dropped,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_attempts: u32,
    /// Multiplied by the attempt number.
    pub retry_backoff: Duration,
    pub poll_timeout: Duration,
}

pub struct NotificationWorker {
    queue: Arc<dyn NotificationQueue>,
    dispatcher: Arc<NotificationDispatcher>,
    settings: WorkerSettings,
}

impl NotificationWorker {
    pub fn new(
        queue: Arc<dyn NotificationQueue>,
        dispatcher: Arc<NotificationDispatcher>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            settings,
        }
    }

    /// Reserve and handle one message. `None` when the poll timed out.
    pub async fn process_next(&self) -> Result<Option<WorkOutcome>, ServiceError> {
        let Some(reservation) = self
            .queue
            .reserve(self.settings.poll_timeout)
            .await
            .map_err(ServiceError::Queue)?
        else {
            return Ok(None);
        };

        let message = &reservation.notification;
        match self.dispatcher.handle(message.event).await {
            Ok(outcome) => {
                self.queue.ack(&reservation).await.map_err(ServiceError::Queue)?;
                Ok(Some(WorkOutcome::Delivered(outcome)))
            }
            Err(e) => {
                let attempts_made = message.attempt + 1;
                if attempts_made >= self.settings.max_attempts {
                    tracing::error!(
                        message_id = %message.message_id,
                        entity_type = message.event.entity_type(),
                        entity_id = %message.event.entity_id(),
                        attempt = attempts_made,
                        error = %e,
                        "Notification dropped after max attempts"
                    );
                    self.queue.ack(&reservation).await.map_err(ServiceError::Queue)?;
                    return Ok(Some(WorkOutcome::Dropped));
                }

                let delay = self.settings.retry_backoff * attempts_made;
                tracing::warn!(
                    message_id = %message.message_id,
                    attempt = attempts_made,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Notification failed, scheduling retry"
                );

                // The reservation stays in processing until the retry lands, so
                // a crash during the delay is recovered on restart.
                let queue = self.queue.clone();
                let next = message.next_attempt();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = queue.retry(&reservation, &next).await {
                        tracing::error!(message_id = %next.message_id, error = %e, "Failed to requeue notification");
                    }
                });

                Ok(Some(WorkOutcome::Retrying {
                    attempt: attempts_made,
                }))
            }
        }
    }

    /// Consume until `shutdown` fires. In-flight messages left by a previous
    /// run are re-queued first.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ServiceError> {
        let recovered = self
            .queue
            .recover_inflight()
            .await
            .map_err(ServiceError::Queue)?;
        if recovered > 0 {
            tracing::warn!(recovered, "Re-queued in-flight notifications from a previous run");
        }

        tracing::info!("Notification worker started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = self.process_next() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Notification worker iteration failed");
                        tokio::time::sleep(self.settings.retry_backoff).await;
                    }
                }
            }
        }
        tracing::info!("Notification worker stopped");
        Ok(())
    }
}
