//! Build events and progress reporting.
//!
//! The tree builder reports progress through a [`ProgressSink`]. The
//! broadcast [`EventBus`] is the sink the CLI uses: any number of
//! subscribers can follow a build without the builder knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Everything observable about a tree build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BuildEvent {
    /// Partitioning finished and the inference count is known
    BuildStarted {
        leaves: usize,
        total_inferences: usize,
        timestamp: DateTime<Utc>,
    },

    /// One leaf summarization or group reduction finished
    Progress { completed: usize, total: usize },

    /// A reduction round finished; `nodes` is what remains
    RoundCompleted {
        round: usize,
        nodes: usize,
        timestamp: DateTime<Utc>,
    },

    /// A call was served by a fallback summarizer
    FallbackUsed { stage: String, summarizer: String },

    /// The root is in place
    BuildFinished {
        rounds: usize,
        nodes: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The build was abandoned; no tree was produced
    BuildFailed {
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// Receives build progress. Advisory: implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn report_progress(&self, completed: usize, total: usize);

    /// Receive any other build event. Ignored by default.
    fn on_event(&self, _event: BuildEvent) {}
}

/// A sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report_progress(&self, _completed: usize, _total: usize) {}
}

/// A broadcast-based event bus for build events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<BuildEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: BuildEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BuildEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressSink for EventBus {
    fn report_progress(&self, completed: usize, total: usize) {
        self.publish(BuildEvent::Progress { completed, total });
    }

    fn on_event(&self, event: BuildEvent) {
        self.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.report_progress(3, 10);

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            BuildEvent::Progress { completed, total } => {
                assert_eq!(*completed, 3);
                assert_eq!(*total, 10);
            }
            _ => panic!("Expected Progress event"),
        }
    }

    #[tokio::test]
    async fn on_event_is_forwarded() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.on_event(BuildEvent::FallbackUsed {
            stage: "leaf [0, 9]".into(),
            summarizer: "local".into(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event.as_ref(), BuildEvent::FallbackUsed { .. }));
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(BuildEvent::BuildFailed {
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
        NoopProgress.report_progress(1, 1);
    }
}
