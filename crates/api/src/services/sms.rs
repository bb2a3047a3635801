//! SMS delivery channel.
//!
//! Supports two providers:
//! - `console`: Logs messages (development)
//! - `africastalking`: Africa's Talking bulk messaging API (form POST)
//!
//! SMS carries the message body only; subjects and attachments are ignored.

use crate::config::SmsConfig;
use async_trait::async_trait;
use domain::models::{ChannelKind, OutgoingMessage};
use domain::services::{DeliveryError, NotificationChannel};
use serde::Deserialize;
use shared::validation::validate_phone_number;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("SMS service not configured")]
    NotConfigured,

    #[error("SMS service disabled")]
    Disabled,

    #[error("Invalid phone number: {0}")]
    InvalidNumber(String),

    #[error("Failed to send SMS: {0}")]
    SendFailed(String),

    #[error("Provider error: {0}")]
    ProviderError(String),
}

impl From<SmsError> for DeliveryError {
    fn from(err: SmsError) -> Self {
        match err {
            SmsError::SendFailed(msg) => DeliveryError::Transport(msg),
            SmsError::Disabled => DeliveryError::ChannelUnavailable(ChannelKind::Sms),
            other => DeliveryError::Rejected(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AtResponse {
    #[serde(rename = "SMSMessageData")]
    data: AtMessageData,
}

#[derive(Debug, Deserialize)]
struct AtMessageData {
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Recipients", default)]
    recipients: Vec<AtRecipient>,
}

#[derive(Debug, Deserialize)]
struct AtRecipient {
    status: String,
    #[serde(default)]
    number: String,
}

/// SMS service backed by the configured provider.
#[derive(Clone)]
pub struct SmsService {
    config: Arc<SmsConfig>,
    client: reqwest::Client,
}

impl SmsService {
    pub fn new(config: SmsConfig) -> Self {
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

    pub async fn send_text(&self, to: &str, body: &str) -> Result<(), SmsError> {
        if !self.config.enabled {
            debug!(to = %to, "SMS service disabled, refusing send");
            return Err(SmsError::Disabled);
        }

        if validate_phone_number(to).is_err() {
            return Err(SmsError::InvalidNumber(to.to_string()));
        }

        match self.config.provider.as_str() {
            "console" => {
                info!(to = %to, length = body.len(), "SMS (console provider)");
                debug!(body = %body, "SMS body");
                Ok(())
            }
            "africastalking" => self.send_africastalking(to, body).await,
            provider => {
                error!(provider = %provider, "Unknown SMS provider");
                Err(SmsError::NotConfigured)
            }
        }
    }

    async fn send_africastalking(&self, to: &str, body: &str) -> Result<(), SmsError> {
        if self.config.api_key.is_empty() || self.config.username.is_empty() {
            return Err(SmsError::NotConfigured);
        }

        let mut form = vec![
            ("username", self.config.username.as_str()),
            ("to", to),
            ("message", body),
        ];
        if let Some(sender_id) = self.config.sender_id.as_deref() {
            form.push(("from", sender_id));
        }

        let response = self
            .client
            .post(&self.config.base_url)
            .header("apiKey", &self.config.api_key)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| SmsError::SendFailed(format!("SMS gateway request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, error = %error_body, "SMS gateway error");
            return Err(SmsError::ProviderError(format!(
                "Gateway returned {}: {}",
                status, error_body
            )));
        }

        let parsed: AtResponse = response
            .json()
            .await
            .map_err(|e| SmsError::ProviderError(format!("Unreadable gateway response: {}", e)))?;

        check_recipients(&parsed)?;
        info!(to = %to, "SMS sent via Africa's Talking");
        Ok(())
    }
}

/// The gateway answers 201 even when individual numbers are rejected.
fn check_recipients(response: &AtResponse) -> Result<(), SmsError> {
    if response.data.recipients.is_empty() {
        return Err(SmsError::ProviderError(response.data.message.clone()));
    }

    match response
        .data
        .recipients
        .iter()
        .find(|r| !r.status.eq_ignore_ascii_case("success"))
    {
        Some(rejected) => Err(SmsError::ProviderError(format!(
            "{}: {}",
            rejected.number, rejected.status
        ))),
        None => Ok(()),
    }
}

#[async_trait]
impl NotificationChannel for SmsService {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    async fn send(&self, address: &str, message: &OutgoingMessage) -> Result<(), DeliveryError> {
        self.send_text(address, &message.body).await.map_err(Into::into)
    }
}
