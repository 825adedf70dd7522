//! Event types for the Pixa event system
//!
//! Provides shared event definitions and the broadcast-based [`EventBus`].
//! Model lifecycle changes and completed tagging runs are published here so a
//! settings surface can observe them without polling.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pixa event types
///
/// Events are broadcast via [`EventBus`] and are serializable so they can be
/// forwarded to any front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PixaEvent {
    /// A model download began
    ModelDownloadStarted {
        /// Model family name (e.g. "vision")
        family: String,
        /// Total bytes expected for the files still missing
        expected_bytes: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Composite download progress changed
    ModelDownloadProgress {
        family: String,
        /// File currently transferring
        current_file: String,
        /// Overall progress in [0, 1]
        progress: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// All required files for a model family are on disk
    ModelDownloadCompleted {
        family: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A model download failed
    ModelDownloadFailed {
        family: String,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A model download was cancelled by the user
    ModelDownloadCancelled {
        family: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A model file was imported from a local path
    ModelImported {
        family: String,
        /// Canonical file name written into the managed directory
        file_name: String,
        /// Whether the family is now complete
        complete: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Model files were deleted
    ModelDeleted {
        family: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Auto-tagging finished for a photo
    PhotoTagged {
        photo_id: Uuid,
        /// Tags handed to persistence
        tag_count: usize,
        /// Whether a description was produced
        has_description: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast bus for [`PixaEvent`]s
///
/// Cloning the bus shares the same underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PixaEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use pixa_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PixaEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: PixaEvent) -> Result<usize, broadcast::error::SendError<PixaEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PixaEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit(PixaEvent::ModelDeleted {
            family: "vision".to_string(),
            timestamp: chrono::Utc::now(),
        })
        .unwrap();

        match rx.recv().await.unwrap() {
            PixaEvent::ModelDeleted { family, .. } => assert_eq!(family, "vision"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers_errors_but_lossy_does_not() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus
            .emit(PixaEvent::ModelDownloadCancelled {
                family: "text".to_string(),
                timestamp: chrono::Utc::now(),
            })
            .is_err());
        bus.emit_lossy(PixaEvent::ModelDownloadCancelled {
            family: "text".to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PixaEvent::ModelDownloadProgress {
            family: "vision".to_string(),
            current_file: "mmproj-model-f16.gguf".to_string(),
            progress: 0.25,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ModelDownloadProgress");
        assert_eq!(json["progress"], 0.25);
    }
}
