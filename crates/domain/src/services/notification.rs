//! Notification dispatch over email and SMS.
//!
//! Delivery is best-effort per recipient: a failure for one recipient is
//! logged and the fan-out continues. Every attempt appends exactly one entry
//! to the notification log.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use shared::pagination::Page;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::notification::{
    failed_status, status_matches, ChannelKind, NewNotificationLog, NotificationKind,
    NotificationLogEntry, NotificationLogQuery, OutgoingMessage, Recipient, STATUS_SENT,
};

/// A single delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("{0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No {0} channel configured")]
    ChannelUnavailable(ChannelKind),
}

#[derive(Debug, Error)]
#[error("Notification log error: {0}")]
pub struct NotificationLogError(pub String);

/// The fan-out as a whole failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("No deliveries succeeded ({failed} of {attempted} failed)")]
    NoDeliveriesSucceeded { attempted: usize, failed: usize },
}

/// An outbound delivery channel.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn send(&self, address: &str, message: &OutgoingMessage) -> Result<(), DeliveryError>;
}

/// Append-only log of delivery attempts.
#[async_trait]
pub trait NotificationLogStore: Send + Sync {
    async fn append(&self, entry: NewNotificationLog) -> Result<(), NotificationLogError>;

    async fn list(
        &self,
        query: &NotificationLogQuery,
    ) -> Result<Page<NotificationLogEntry>, NotificationLogError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientOutcome {
    pub recipient: Recipient,
    pub outcome: DeliveryOutcome,
}

/// Per-recipient results of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub outcomes: Vec<RecipientOutcome>,
}

impl DispatchSummary {
    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == DeliveryOutcome::Delivered)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }

    /// Succeeds if at least one recipient was reached.
    pub fn into_result(self) -> Result<Self, DispatchError> {
        if self.delivered() == 0 {
            return Err(DispatchError::NoDeliveriesSucceeded {
                attempted: self.outcomes.len(),
                failed: self.failed(),
            });
        }
        Ok(self)
    }
}

/// Fans messages out to recipients over the configured channels.
#[derive(Clone)]
pub struct NotificationDispatcher {
    email: Option<Arc<dyn NotificationChannel>>,
    sms: Option<Arc<dyn NotificationChannel>>,
    log: Arc<dyn NotificationLogStore>,
}

impl NotificationDispatcher {
    pub fn new(log: Arc<dyn NotificationLogStore>) -> Self {
        Self {
            email: None,
            sms: None,
            log,
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        match channel.kind() {
            ChannelKind::Email => self.email = Some(channel),
            ChannelKind::Sms => self.sms = Some(channel),
        }
        self
    }

    fn channel(&self, kind: ChannelKind) -> Option<&Arc<dyn NotificationChannel>> {
        match kind {
            ChannelKind::Email => self.email.as_ref(),
            ChannelKind::Sms => self.sms.as_ref(),
        }
    }

    /// Attempts delivery to every recipient in order.
    ///
    /// Never fails as a whole; use [`DispatchSummary::into_result`] to apply
    /// the "at least one delivered" policy.
    pub async fn dispatch(
        &self,
        recipients: &[Recipient],
        message: &OutgoingMessage,
        kind: NotificationKind,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for recipient in recipients {
            let result = match self.channel(recipient.channel) {
                Some(channel) => channel.send(&recipient.address, message).await,
                None => Err(DeliveryError::ChannelUnavailable(recipient.channel)),
            };

            let (outcome, status) = match result {
                Ok(()) => {
                    info!(
                        channel = %recipient.channel,
                        recipient = %recipient.address,
                        kind = %kind,
                        "Notification delivered"
                    );
                    (DeliveryOutcome::Delivered, STATUS_SENT.to_string())
                }
                Err(e) => {
                    warn!(
                        channel = %recipient.channel,
                        recipient = %recipient.address,
                        kind = %kind,
                        error = %e,
                        "Notification delivery failed"
                    );
                    let reason = e.to_string();
                    (DeliveryOutcome::Failed(reason.clone()), failed_status(&reason))
                }
            };

            let outcome_label = match &outcome {
                DeliveryOutcome::Delivered => "delivered",
                DeliveryOutcome::Failed(_) => "failed",
            };
            counter!(
                "notifications_sent_total",
                "channel" => recipient.channel.as_str(),
                "outcome" => outcome_label
            )
            .increment(1);

            let entry = NewNotificationLog {
                recipient: recipient.address.clone(),
                channel: recipient.channel,
                message: message.body.clone(),
                status,
                kind,
            };
            if let Err(e) = self.log.append(entry).await {
                warn!(recipient = %recipient.address, error = %e, "Failed to write notification log");
            }

            summary.outcomes.push(RecipientOutcome {
                recipient: recipient.clone(),
                outcome,
            });
        }

        summary
    }

    pub async fn list_log(
        &self,
        query: &NotificationLogQuery,
    ) -> Result<Page<NotificationLogEntry>, NotificationLogError> {
        self.log.list(query).await
    }
}

/// Mock channel for development and testing.
///
/// Records every message and fails for addresses listed in `failing`.
#[derive(Debug)]
pub struct MockChannel {
    kind: ChannelKind,
    failing: Vec<String>,
    sent: Mutex<Vec<(String, OutgoingMessage)>>,
}

impl MockChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            failing: Vec::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Simulates a failure for each of `addresses`.
    pub fn failing_for(mut self, addresses: &[&str]) -> Self {
        self.failing = addresses.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn sent(&self) -> Vec<(String, OutgoingMessage)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationChannel for MockChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn send(&self, address: &str, message: &OutgoingMessage) -> Result<(), DeliveryError> {
        if self.failing.iter().any(|a| a == address) {
            return Err(DeliveryError::Rejected("Simulated failure".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((address.to_string(), message.clone()));
        }
        Ok(())
    }
}

/// Notification log kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryNotificationLog {
    entries: Mutex<Vec<NotificationLogEntry>>,
}

impl InMemoryNotificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<NotificationLogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

fn matches_query(entry: &NotificationLogEntry, query: &NotificationLogQuery) -> bool {
    query.recipient.as_ref().map_or(true, |r| &entry.recipient == r)
        && query.start.map_or(true, |s| entry.sent_at >= s)
        && query.end.map_or(true, |e| entry.sent_at <= e)
        && query.channel.map_or(true, |c| entry.channel == c)
        && query
            .status
            .as_ref()
            .map_or(true, |s| status_matches(&entry.status, s))
        && query.search.as_ref().map_or(true, |s| {
            entry.message.to_lowercase().contains(&s.to_lowercase())
        })
}

#[async_trait]
impl NotificationLogStore for InMemoryNotificationLog {
    async fn append(&self, entry: NewNotificationLog) -> Result<(), NotificationLogError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| NotificationLogError(e.to_string()))?;
        let id = entries.len() as i64 + 1;
        entries.push(NotificationLogEntry {
            id,
            recipient: entry.recipient,
            channel: entry.channel,
            message: entry.message,
            status: entry.status,
            kind: entry.kind.as_str().to_string(),
            sent_at: Utc::now(),
        });
        Ok(())
    }

    async fn list(
        &self,
        query: &NotificationLogQuery,
    ) -> Result<Page<NotificationLogEntry>, NotificationLogError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| NotificationLogError(e.to_string()))?;

        let mut matching: Vec<NotificationLogEntry> = entries
            .iter()
            .filter(|e| matches_query(e, query))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(query.page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(query.page.limit).unwrap_or(0))
            .collect();
        Ok(Page::new(query.page, total, items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::pagination::PageRequest;

    struct Fixture {
        dispatcher: NotificationDispatcher,
        email: Arc<MockChannel>,
        sms: Arc<MockChannel>,
        log: Arc<InMemoryNotificationLog>,
    }

    fn fixture(email_failing: &[&str], sms_failing: &[&str]) -> Fixture {
        let email = Arc::new(MockChannel::new(ChannelKind::Email).failing_for(email_failing));
        let sms = Arc::new(MockChannel::new(ChannelKind::Sms).failing_for(sms_failing));
        let log = Arc::new(InMemoryNotificationLog::new());
        let dispatcher = NotificationDispatcher::new(log.clone())
            .with_channel(email.clone())
            .with_channel(sms.clone());
        Fixture {
            dispatcher,
            email,
            sms,
            log,
        }
    }

    fn report_message() -> OutgoingMessage {
        OutgoingMessage::text("Weekly Clinic Report:\n\nDental: 15").with_subject("WEEKLY Report")
    }

    #[tokio::test]
    async fn test_partial_failure_still_succeeds() {
        let f = fixture(&["bad@clinic.test"], &[]);
        let recipients = vec![
            Recipient::email("bad@clinic.test"),
            Recipient::email("good@clinic.test"),
            Recipient::sms("+263771234567"),
        ];

        let summary = f
            .dispatcher
            .dispatch(&recipients, &report_message(), NotificationKind::Weekly)
            .await;

        assert_eq!(summary.delivered(), 2);
        assert_eq!(summary.failed(), 1);
        assert!(summary.clone().into_result().is_ok());

        assert_eq!(f.email.sent().len(), 1);
        assert_eq!(f.sms.sent().len(), 1);

        let entries = f.log.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].status, "FAILED: Simulated failure");
        assert_eq!(entries[1].status, "sent");
        assert_eq!(entries[2].kind, "weekly");
    }

    #[tokio::test]
    async fn test_all_failures_report_overall_failure() {
        let f = fixture(&["a@clinic.test"], &["+263771234567"]);
        let recipients = vec![
            Recipient::email("a@clinic.test"),
            Recipient::sms("+263771234567"),
        ];

        let summary = f
            .dispatcher
            .dispatch(&recipients, &report_message(), NotificationKind::OnDemand)
            .await;

        assert_eq!(
            summary.into_result().unwrap_err(),
            DispatchError::NoDeliveriesSucceeded {
                attempted: 2,
                failed: 2
            }
        );
        assert_eq!(f.log.entries().len(), 2);
        assert!(f.log.entries().iter().all(|e| e.status.starts_with("FAILED")));
    }

    #[tokio::test]
    async fn test_zero_recipients_is_failure() {
        let f = fixture(&[], &[]);
        let summary = f
            .dispatcher
            .dispatch(&[], &report_message(), NotificationKind::OnDemand)
            .await;
        assert!(summary.into_result().is_err());
        assert!(f.log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_missing_channel_is_logged_failure() {
        let log = Arc::new(InMemoryNotificationLog::new());
        let dispatcher = NotificationDispatcher::new(log.clone())
            .with_channel(Arc::new(MockChannel::new(ChannelKind::Email)));

        let summary = dispatcher
            .dispatch(
                &[Recipient::sms("+263771234567")],
                &report_message(),
                NotificationKind::Milestone,
            )
            .await;

        assert_eq!(summary.failed(), 1);
        assert_eq!(log.entries()[0].status, "FAILED: No sms channel configured");
    }

    #[tokio::test]
    async fn test_log_query_filters_and_paginates() {
        let f = fixture(&["bad@clinic.test"], &[]);
        for i in 0..5 {
            f.dispatcher
                .dispatch(
                    &[Recipient::email(format!("user{}@clinic.test", i))],
                    &OutgoingMessage::text(format!("Report number {}", i)),
                    NotificationKind::Weekly,
                )
                .await;
        }
        f.dispatcher
            .dispatch(
                &[Recipient::email("bad@clinic.test")],
                &OutgoingMessage::text("Milestone reached"),
                NotificationKind::Milestone,
            )
            .await;

        let page = f
            .dispatcher
            .list_log(&NotificationLogQuery {
                search: Some("REPORT".to_string()),
                page: PageRequest::new(Some(1), Some(2)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more());
        assert_eq!(page.items[0].recipient, "user4@clinic.test");

        let failed = f
            .dispatcher
            .list_log(&NotificationLogQuery {
                recipient: Some("bad@clinic.test".to_string()),
                channel: Some(ChannelKind::Email),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(failed.total, 1);
        assert!(failed.items[0].status.starts_with("FAILED"));

        let by_status = f
            .dispatcher
            .list_log(&NotificationLogQuery {
                status: Some("failed".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_status.total, 1);
        assert_eq!(by_status.items[0].recipient, "bad@clinic.test");
    }
}
