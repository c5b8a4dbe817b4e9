//! Publish progress events
//!
//! An in-process broadcast bus. The orchestrator and the scheduler emit
//! events as each platform finishes; any number of subscribers (a CLI
//! progress line, the daemon's log) can listen. With no subscribers, events
//! are dropped without blocking the emitter.
//!
//! # Example
//!
//! ```no_run
//! use libcrosscast::service::events::{Event, EventBus};
//! use libcrosscast::Platform;
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::PublishStarted {
//!     post_id: "abc123".to_string(),
//!     platforms: vec![Platform::Twitter],
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{Platform, PostStatus};

pub type EventReceiver = broadcast::Receiver<Event>;

/// Event bus for distributing progress events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers; never blocks
    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Fan-out to the listed platforms is about to begin
    PublishStarted {
        post_id: String,
        platforms: Vec<Platform>,
    },

    PlatformSucceeded {
        post_id: String,
        platform: Platform,
        platform_post_id: String,
        url: String,
    },

    PlatformFailed {
        post_id: String,
        platform: Platform,
        code: String,
        message: String,
    },

    /// Every platform has answered
    PublishCompleted {
        post_id: String,
        succeeded: usize,
        failed: usize,
    },

    /// A scheduled post reached its terminal state
    ScheduledPostFinalized {
        post_id: String,
        status: PostStatus,
    },
}

impl Event {
    pub fn post_id(&self) -> &str {
        match self {
            Event::PublishStarted { post_id, .. }
            | Event::PlatformSucceeded { post_id, .. }
            | Event::PlatformFailed { post_id, .. }
            | Event::PublishCompleted { post_id, .. }
            | Event::ScheduledPostFinalized { post_id, .. } => post_id,
        }
    }
}
