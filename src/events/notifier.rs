//! Operator failure notification.
//!
//! Notification is fire-and-forget: implementations must never fail back into
//! the caller. Delivery problems are logged and dropped.

use crate::config::NotificationConfig;
use std::fmt::Debug;
use tracing::{error, info};

pub trait Notifier: Send + Sync + Debug {
    fn notify(&self, subject: &str, body: &str);
}

/// Writes notifications to the structured log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    enabled: bool,
    recipients: Vec<String>,
}

impl LogNotifier {
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            enabled: config.enabled,
            recipients: config.recipients.clone(),
        }
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, subject: &str, body: &str) {
        if !self.enabled {
            info!(subject = %subject, "notification suppressed (disabled)");
            return;
        }
        error!(
            subject = %subject,
            body = %body,
            recipients = ?self.recipients,
            "📣 OPERATOR_NOTIFICATION"
        );
    }
}
