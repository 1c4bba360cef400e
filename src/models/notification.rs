use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub event_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub created_at: DateTime<Utc>,
}

/// Join row carrying per-recipient read state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserNotification {
    pub user_id: Uuid,
    pub notification_id: Uuid,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

impl UserNotification {
    pub fn unread(user_id: Uuid, notification_id: Uuid) -> Self {
        Self {
            user_id,
            notification_id,
            is_read: false,
            read_at: None,
        }
    }
}

/// A notification as seen from one recipient's inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct InboxEntry {
    pub id: Uuid,
    pub event_id: Option<Uuid>,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

impl InboxEntry {
    pub fn new(notification: &Notification, receipt: &UserNotification) -> Self {
        Self {
            id: notification.id,
            event_id: notification.event_id,
            title: notification.title.clone(),
            message: notification.message.clone(),
            priority: notification.priority,
            created_at: notification.created_at,
            is_read: receipt.is_read,
            read_at: receipt.read_at,
        }
    }
}
