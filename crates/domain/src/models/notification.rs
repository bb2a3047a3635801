//! Notification domain models: recipients, outgoing messages and the delivery log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::pagination::PageRequest;
use std::str::FromStr;

/// Delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Sms,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
        }
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "email" => Ok(ChannelKind::Email),
            "sms" => Ok(ChannelKind::Sms),
            _ => Err(format!("Unknown channel: {}", s)),
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A delivery target: an email address or an E.164 phone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub channel: ChannelKind,
    pub address: String,
}

impl Recipient {
    pub fn email(address: impl Into<String>) -> Self {
        Self {
            channel: ChannelKind::Email,
            address: address.into(),
        }
    }

    pub fn sms(address: impl Into<String>) -> Self {
        Self {
            channel: ChannelKind::Sms,
            address: address.into(),
        }
    }

    /// Picks the address matching a staff member's preferred channel.
    ///
    /// Returns `None` when the preferred address is missing or blank.
    pub fn from_preference(
        notify_method: Option<&str>,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Option<Self> {
        let (channel, address) = match notify_method {
            Some(m) if m.eq_ignore_ascii_case("sms") => (ChannelKind::Sms, phone),
            _ => (ChannelKind::Email, email),
        };
        address
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(|a| Self {
                channel,
                address: a.to_string(),
            })
    }
}

/// A file attached to an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Message content handed to a channel.
///
/// SMS channels send only `body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub subject: Option<String>,
    pub body: String,
    pub attachment: Option<Attachment>,
}

impl OutgoingMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            subject: None,
            body: body.into(),
            attachment: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Why a message was sent. Stored as the log entry's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Weekly,
    Monthly,
    Yearly,
    Milestone,
    OnDemand,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Weekly => "weekly",
            NotificationKind::Monthly => "monthly",
            NotificationKind::Yearly => "yearly",
            NotificationKind::Milestone => "milestone",
            NotificationKind::OnDemand => "on_demand",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status text stored for a successful delivery.
pub const STATUS_SENT: &str = "sent";

/// Status text stored for a failed delivery.
pub fn failed_status(reason: &str) -> String {
    format!("FAILED: {}", reason)
}

/// Whether a stored status satisfies a status filter.
///
/// Matches case-insensitively, either exactly or on the `FAILED` marker
/// before the `: reason` suffix.
pub fn status_matches(stored: &str, filter: &str) -> bool {
    if stored.eq_ignore_ascii_case(filter) {
        return true;
    }
    match stored.split_once(':') {
        Some((marker, _)) => marker.eq_ignore_ascii_case(filter),
        None => false,
    }
}

/// A delivery attempt to append to the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotificationLog {
    pub recipient: String,
    pub channel: ChannelKind,
    pub message: String,
    pub status: String,
    pub kind: NotificationKind,
}

/// A logged delivery attempt. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationLogEntry {
    pub id: i64,
    pub recipient: String,
    pub channel: ChannelKind,
    pub message: String,
    pub status: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sent_at: DateTime<Utc>,
}

/// Filters for listing the notification log, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationLogQuery {
    pub recipient: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the message.
    pub search: Option<String>,
    /// See [`status_matches`].
    pub status: Option<String>,
    pub channel: Option<ChannelKind>,
    pub page: PageRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_from_preference() {
        let r = Recipient::from_preference(Some("sms"), Some("a@clinic.test"), Some("+263771234567"))
            .unwrap();
        assert_eq!(r, Recipient::sms("+263771234567"));

        let r = Recipient::from_preference(Some("email"), Some("a@clinic.test"), None).unwrap();
        assert_eq!(r, Recipient::email("a@clinic.test"));

        let r = Recipient::from_preference(None, Some("a@clinic.test"), None).unwrap();
        assert_eq!(r.channel, ChannelKind::Email);
    }

    #[test]
    fn test_recipient_from_preference_missing_address() {
        assert!(Recipient::from_preference(Some("sms"), Some("a@clinic.test"), None).is_none());
        assert!(Recipient::from_preference(Some("email"), Some("  "), None).is_none());
    }

    #[test]
    fn test_channel_kind_parse() {
        assert_eq!("SMS".parse::<ChannelKind>().unwrap(), ChannelKind::Sms);
        assert!("fax".parse::<ChannelKind>().is_err());
    }

    #[test]
    fn test_failed_status() {
        assert_eq!(failed_status("timeout"), "FAILED: timeout");
    }

    #[test]
    fn test_status_matches_failure_marker() {
        let stored = failed_status("timeout");
        assert!(status_matches(&stored, "failed"));
        assert!(status_matches(&stored, "FAILED: timeout"));
        assert!(!status_matches(&stored, "fail"));
        assert!(status_matches(STATUS_SENT, "SENT"));
        assert!(!status_matches(STATUS_SENT, "failed"));
    }

    #[test]
    fn test_notification_kind_display() {
        assert_eq!(NotificationKind::OnDemand.to_string(), "on_demand");
        assert_eq!(NotificationKind::Weekly.to_string(), "weekly");
    }

    #[test]
    fn test_outgoing_message_builder() {
        let msg = OutgoingMessage::text("body")
            .with_subject("subject")
            .with_attachment(Attachment {
                filename: "report.xlsx".to_string(),
                content_type: "application/octet-stream".to_string(),
                bytes: vec![1, 2, 3],
            });
        assert_eq!(msg.subject.as_deref(), Some("subject"));
        assert_eq!(msg.attachment.unwrap().bytes.len(), 3);
    }
}
