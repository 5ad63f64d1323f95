//! Notification delivery - webhook and log-only sinks

mod webhook;

pub use webhook::{LogNotifier, WebhookNotifier};
