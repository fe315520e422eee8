//! Notification events carried by the delivery queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    InvitationSent { invitation_id: Uuid },
    VerificationSent { user_id: Uuid },
}

impl NotificationEvent {
    pub fn entity_type(&self) -> &'static str {
        match self {
            NotificationEvent::InvitationSent { .. } => "invitation",
            NotificationEvent::VerificationSent { .. } => "verification",
        }
    }

    pub fn entity_id(&self) -> Uuid {
        match self {
            NotificationEvent::InvitationSent { invitation_id } => *invitation_id,
            NotificationEvent::VerificationSent { user_id } => *user_id,
        }
    }

    /// Cache key marking this entity's notification as delivered.
    pub fn dedup_key(&self) -> String {
        format!("sent:{}:{}", self.entity_type(), self.entity_id())
    }
}

/// Queue envelope around an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedNotification {
    pub message_id: Uuid,
    pub event: NotificationEvent,
    /// Delivery attempts already made; 0 on first enqueue.
    pub attempt: u32,
    pub enqueued_utc: DateTime<Utc>,
}

impl QueuedNotification {
    pub fn new(event: NotificationEvent) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            event,
            attempt: 0,
            enqueued_utc: Utc::now(),
        }
    }

    /// Same message, one attempt further along.
    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}
