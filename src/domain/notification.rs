//! Notification sink contract
//!
//! Fire-and-forget: implementations log delivery failures and never
//! surface them to the caller.

use async_trait::async_trait;
use std::collections::HashMap;

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// Structured event notifications, best-effort delivery
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        title: &str,
        body: &str,
        severity: Severity,
        fields: HashMap<String, String>,
    );
}
