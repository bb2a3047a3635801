//! Email delivery channel for reports and milestone announcements.
//!
//! Supports two providers:
//! - `console`: Logs emails (development)
//! - `sendgrid`: Uses the SendGrid v3 mail API, attachments base64-encoded

use crate::config::EmailConfig;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use domain::models::{ChannelKind, OutgoingMessage};
use domain::services::{DeliveryError, NotificationChannel};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};
use validator::ValidateEmail;

/// Subject used when a message carries none.
const DEFAULT_SUBJECT: &str = "ClinicCore Notification";

/// Errors that can occur during email operations.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email service not configured")]
    NotConfigured,

    #[error("Email service disabled")]
    Disabled,

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Provider error: {0}")]
    ProviderError(String),
}

impl From<EmailError> for DeliveryError {
    fn from(err: EmailError) -> Self {
        match err {
            EmailError::SendFailed(msg) => DeliveryError::Transport(msg),
            EmailError::Disabled => DeliveryError::ChannelUnavailable(ChannelKind::Email),
            other => DeliveryError::Rejected(other.to_string()),
        }
    }
}

/// Email service backed by the configured provider.
#[derive(Clone)]
pub struct EmailService {
    config: Arc<EmailConfig>,
    client: reqwest::Client,
}

impl EmailService {
    /// Creates a new EmailService with the given configuration.
    pub fn new(config: EmailConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            config: Arc::new(config),
            client,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Send `message` to a single address.
    pub async fn send_message(&self, to: &str, message: &OutgoingMessage) -> Result<(), EmailError> {
        if !self.config.enabled {
            debug!(to = %to, "Email service disabled, refusing send");
            return Err(EmailError::Disabled);
        }

        if !to.validate_email() {
            return Err(EmailError::InvalidAddress(to.to_string()));
        }

        match self.config.provider.as_str() {
            "console" => self.send_console(to, message),
            "sendgrid" => self.send_sendgrid(to, message).await,
            provider => {
                error!(provider = %provider, "Unknown email provider");
                Err(EmailError::NotConfigured)
            }
        }
    }

    /// Console provider - logs the email instead of sending it.
    fn send_console(&self, to: &str, message: &OutgoingMessage) -> Result<(), EmailError> {
        info!(
            to = %to,
            subject = %message.subject.as_deref().unwrap_or(DEFAULT_SUBJECT),
            from = %self.config.sender_email,
            attachment = ?message.attachment.as_ref().map(|a| a.filename.as_str()),
            "Email (console provider)"
        );
        debug!(body = %message.body, "Email body");
        Ok(())
    }

    /// Request body for the SendGrid v3 mail API.
    fn sendgrid_body(&self, to: &str, message: &OutgoingMessage) -> serde_json::Value {
        let mut body = serde_json::json!({
            "personalizations": [{
                "to": [{ "email": to }]
            }],
            "from": {
                "email": self.config.sender_email,
                "name": self.config.sender_name
            },
            "subject": message.subject.as_deref().unwrap_or(DEFAULT_SUBJECT),
            "content": [{
                "type": "text/plain",
                "value": message.body
            }]
        });

        if let Some(attachment) = &message.attachment {
            body["attachments"] = serde_json::json!([{
                "content": STANDARD.encode(&attachment.bytes),
                "filename": attachment.filename,
                "type": attachment.content_type,
                "disposition": "attachment"
            }]);
        }

        body
    }

    /// SendGrid provider - sends via the SendGrid API.
    async fn send_sendgrid(&self, to: &str, message: &OutgoingMessage) -> Result<(), EmailError> {
        if self.config.sendgrid_api_key.is_empty() {
            return Err(EmailError::NotConfigured);
        }

        let response = self
            .client
            .post(&self.config.sendgrid_url)
            .bearer_auth(&self.config.sendgrid_api_key)
            .json(&self.sendgrid_body(to, message))
            .send()
            .await
            .map_err(|e| EmailError::SendFailed(format!("SendGrid request failed: {}", e)))?;

        if response.status().is_success() {
            info!(to = %to, "Email sent via SendGrid");
            Ok(())
        } else {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, error = %error_body, "SendGrid API error");
            Err(EmailError::ProviderError(format!(
                "SendGrid returned {}: {}",
                status, error_body
            )))
        }
    }
}

#[async_trait]
impl NotificationChannel for EmailService {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, address: &str, message: &OutgoingMessage) -> Result<(), DeliveryError> {
        self.send_message(address, message).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::Attachment;

    fn config(enabled: bool, provider: &str) -> EmailConfig {
        EmailConfig {
            enabled,
            provider: provider.to_string(),
            ..EmailConfig::default()
        }
    }

    #[tokio::test]
    async fn test_console_provider_succeeds() {
        let service = EmailService::new(config(true, "console"));
        let message = OutgoingMessage::text("hello").with_subject("Weekly Report");
        assert!(service.send_message("admin@clinic.test", &message).await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_service_refuses() {
        let service = EmailService::new(config(false, "console"));
        let result = service
            .send_message("admin@clinic.test", &OutgoingMessage::text("hello"))
            .await;
        assert!(matches!(result, Err(EmailError::Disabled)));
    }

    #[tokio::test]
    async fn test_invalid_address_rejected() {
        let service = EmailService::new(config(true, "console"));
        let err = NotificationChannel::send(&service, "not-an-email", &OutgoingMessage::text("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected(ref m) if m.contains("not-an-email")));
    }

    #[tokio::test]
    async fn test_sendgrid_without_key_not_configured() {
        let service = EmailService::new(config(true, "sendgrid"));
        let result = service
            .send_message("admin@clinic.test", &OutgoingMessage::text("x"))
            .await;
        assert!(matches!(result, Err(EmailError::NotConfigured)));
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let service = EmailService::new(config(true, "pigeon"));
        let result = service
            .send_message("admin@clinic.test", &OutgoingMessage::text("x"))
            .await;
        assert!(matches!(result, Err(EmailError::NotConfigured)));
    }

    #[test]
    fn test_sendgrid_body_with_attachment() {
        let service = EmailService::new(config(true, "sendgrid"));
        let message = OutgoingMessage::text("See attached weekly report")
            .with_subject("WEEKLY Report")
            .with_attachment(Attachment {
                filename: "report.xlsx".into(),
                content_type: "application/octet-stream".into(),
                bytes: b"abc".to_vec(),
            });

        let body = service.sendgrid_body("dr@clinic.test", &message);
        assert_eq!(body["personalizations"][0]["to"][0]["email"], "dr@clinic.test");
        assert_eq!(body["subject"], "WEEKLY Report");
        assert_eq!(body["attachments"][0]["content"], "YWJj");
        assert_eq!(body["attachments"][0]["filename"], "report.xlsx");
    }

    #[test]
    fn test_sendgrid_body_defaults_subject() {
        let service = EmailService::new(config(true, "sendgrid"));
        let body = service.sendgrid_body("dr@clinic.test", &OutgoingMessage::text("hi"));
        assert_eq!(body["subject"], DEFAULT_SUBJECT);
        assert!(body.get("attachments").is_none());
    }

    #[test]
    fn test_email_error_to_delivery_error() {
        assert_eq!(
            DeliveryError::from(EmailError::Disabled),
            DeliveryError::ChannelUnavailable(ChannelKind::Email)
        );
        assert!(matches!(
            DeliveryError::from(EmailError::SendFailed("timeout".into())),
            DeliveryError::Transport(_)
        ));
    }
}
