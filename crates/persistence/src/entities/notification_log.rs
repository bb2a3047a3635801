//! Notification log entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{ChannelKind, NotificationLogEntry};
use sqlx::FromRow;

/// Database row mapping for the notification_logs table.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationLogEntity {
    pub id: i64,
    pub recipient: String,
    pub channel: String,
    pub message: String,
    pub status: String,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub sent_at: DateTime<Utc>,
}

impl TryFrom<NotificationLogEntity> for NotificationLogEntry {
    type Error = String;

    fn try_from(entity: NotificationLogEntity) -> Result<Self, Self::Error> {
        Ok(Self {
            id: entity.id,
            recipient: entity.recipient,
            channel: entity.channel.parse::<ChannelKind>()?,
            message: entity.message,
            status: entity.status,
            kind: entity.kind,
            sent_at: entity.sent_at,
        })
    }
}

/// Staff contact details used to build report recipients.
#[derive(Debug, Clone, FromRow)]
pub struct StaffContactEntity {
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub notify_method: Option<String>,
}
