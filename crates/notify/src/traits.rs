//! Notification service trait and shared types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// One templated message to one or more email recipients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRequest {
    pub context: String,
    pub key: String,
    pub replacements: BTreeMap<String, String>,
    pub recipients: Vec<String>,
}

/// A recipient the service could not deliver to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientError {
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub error: String,
}

/// Per-recipient delivery outcome reported by the service.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NotificationReport {
    pub delivered: usize,
    pub errors: Vec<RecipientError>,
}

impl NotificationReport {
    /// True only when the service reported no recipient errors.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[async_trait::async_trait]
pub trait NotificationService: Send + Sync {
    /// Send the request. Transport failures are `Err`; per-recipient delivery
    /// failures come back in the report.
    async fn send(&self, request: &NotificationRequest) -> Result<NotificationReport, NotifyError>;
}
