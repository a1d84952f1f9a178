use serde_json::{json, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::constants::defaults;
use crate::constants::Level;
use crate::error::RunContext;

/// Broadcast publisher for node and workflow lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub id: Uuid,
    pub name: String,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl PublishedEvent {
    /// Node id carried in the context, if any
    pub fn node_id(&self) -> Option<i64> {
        self.context.get("node_id").and_then(Value::as_i64)
    }

    pub fn level(&self) -> Option<&str> {
        self.context.get("level").and_then(Value::as_str)
    }
}

impl EventPublisher {
    /// Create a new event publisher with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event with the given name and context
    ///
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event_name: impl Into<String>, context: Value) {
        let event = PublishedEvent {
            id: Uuid::new_v4(),
            name: event_name.into(),
            context,
            published_at: chrono::Utc::now(),
        };

        // send() only fails when nobody is subscribed
        let _ = self.sender.send(event);
    }

    /// Publish a node lifecycle event with the standard context layout
    pub fn publish_node(
        &self,
        event_name: &str,
        level: Level,
        node_id: i64,
        run_context: &RunContext,
        details: Option<&str>,
    ) {
        self.publish(
            event_name,
            json!({
                "level": level.as_str(),
                "node_id": node_id,
                "run_context": run_context,
                "details": details,
            }),
        );
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(defaults::EVENT_CHANNEL_CAPACITY)
    }
}
