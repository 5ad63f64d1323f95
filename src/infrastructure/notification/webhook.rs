//! Webhook notification sink
//!
//! Posts event payloads as JSON to a configured URL. Delivery is best
//! effort: failures are logged and never surfaced to callers, so a dead
//! webhook cannot stall the control loop.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::notification::{NotificationSink, Severity};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    body: &'a str,
    severity: &'a str,
    timestamp: String,
    fields: &'a HashMap<String, String>,
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(DELIVERY_TIMEOUT)
                .build()
                .unwrap_or_default(),
            url,
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify(
        &self,
        title: &str,
        body: &str,
        severity: Severity,
        fields: HashMap<String, String>,
    ) {
        let payload = WebhookPayload {
            title,
            body,
            severity: severity.as_str(),
            timestamp: Utc::now().to_rfc3339(),
            fields: &fields,
        };

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Webhook delivered: {}", title);
            }
            Ok(response) => {
                warn!(
                    "Webhook rejected ({}): {}",
                    response.status(),
                    title
                );
            }
            Err(e) => {
                warn!("Webhook delivery failed for '{}': {}", title, e);
            }
        }
    }
}

/// Fallback sink used when no webhook is configured
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(
        &self,
        title: &str,
        body: &str,
        severity: Severity,
        fields: HashMap<String, String>,
    ) {
        match severity {
            Severity::Error => tracing::error!("{}: {} {:?}", title, body, fields),
            Severity::Warning => warn!("{}: {} {:?}", title, body, fields),
            Severity::Info => tracing::info!("{}: {} {:?}", title, body, fields),
        }
    }
}
