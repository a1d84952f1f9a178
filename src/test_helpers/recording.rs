//! Notifier and event capture for assertions.

use crate::events::{Notifier, PublishedEvent};
use parking_lot::Mutex;
use tokio::sync::broadcast;

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(subject, body)` pairs in delivery order
    pub fn notifications(&self) -> Vec<(String, String)> {
        self.notifications.lock().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.notifications
            .lock()
            .iter()
            .map(|(subject, _)| subject.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, subject: &str, body: &str) {
        self.notifications
            .lock()
            .push((subject.to_string(), body.to_string()));
    }
}

/// Everything currently buffered on an event subscription
pub fn drain_events(receiver: &mut broadcast::Receiver<PublishedEvent>) -> Vec<PublishedEvent> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}
