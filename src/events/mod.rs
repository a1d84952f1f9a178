pub mod notifier;
pub mod publisher;

pub use notifier::{LogNotifier, Notifier};
pub use publisher::{EventPublisher, PublishedEvent};
