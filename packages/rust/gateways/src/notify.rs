//! Outcome notifiers. Publishing is best-effort: callers log failures and move on.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rowpipe_shared::{Result, RowpipeError};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::USER_AGENT;

/// Structured outcome event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub message: serde_json::Value,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(subject: impl Into<String>, message: serde_json::Value) -> Self {
        Self {
            subject: subject.into(),
            message,
            tags: BTreeMap::new(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publish one notification. Errors are [`RowpipeError::NotificationFailed`].
    async fn publish(&self, notification: &Notification) -> Result<()>;
}

fn prefixed(prefix: &str, subject: &str) -> String {
    if prefix.is_empty() {
        subject.to_string()
    } else {
        format!("[{prefix}] {subject}")
    }
}

// ---------------------------------------------------------------------------
// Log notifier
// ---------------------------------------------------------------------------

/// Emits notifications as `tracing` events. Used when no webhook is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    subject_prefix: String,
}

impl LogNotifier {
    pub fn new(subject_prefix: impl Into<String>) -> Self {
        Self {
            subject_prefix: subject_prefix.into(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        info!(
            subject = %prefixed(&self.subject_prefix, &notification.subject),
            tags = ?notification.tags,
            message = %notification.message,
            "notification"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Webhook notifier
// ---------------------------------------------------------------------------

/// POSTs each notification as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    endpoint: Url,
    token: Option<String>,
    subject_prefix: String,
}

impl WebhookNotifier {
    pub fn new(
        endpoint: Url,
        token: Option<String>,
        subject_prefix: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| RowpipeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            token,
            subject_prefix: subject_prefix.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, notification: &Notification) -> Result<()> {
        let body = Notification {
            subject: prefixed(&self.subject_prefix, &notification.subject),
            ..notification.clone()
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RowpipeError::NotificationFailed(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RowpipeError::NotificationFailed(format!(
                "{}: HTTP {status}",
                self.endpoint
            )));
        }
        Ok(())
    }
}
