//! Ingest event types and the broadcast event bus
//!
//! The pipeline emits one event per observable step. Consumers are the
//! `/events` SSE endpoint and the CLI progress printer; neither is required,
//! so emitting never fails the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Per-item pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Fetch,
    Transcribe,
    Embed,
    Index,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::Fetch => "fetch",
            IngestStage::Transcribe => "transcribe",
            IngestStage::Embed => "embed",
            IngestStage::Index => "index",
        }
    }
}

impl std::fmt::Display for IngestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events broadcast while an `add` batch runs
///
/// Serialized with an internal `type` tag for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IngestEvent {
    /// A batch of sources was accepted
    BatchStarted {
        batch_id: Uuid,
        source_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A source resolved into a concrete media item
    ItemResolved {
        batch_id: Uuid,
        media_id: String,
        title: String,
        source_kind: String,
        timestamp: DateTime<Utc>,
    },

    /// An item finished one pipeline stage
    StageCompleted {
        batch_id: Uuid,
        media_id: String,
        stage: IngestStage,
        /// Segments produced or indexed so far, when meaningful for the stage
        segment_count: Option<usize>,
        timestamp: DateTime<Utc>,
    },

    /// A source or item failed; siblings continue
    ItemFailed {
        batch_id: Uuid,
        /// `None` when the source never resolved into an item
        media_id: Option<String>,
        source: String,
        /// Stable error kind (`fetch_error`, `transcription_error`, ...)
        kind: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// An item was already indexed or the batch was cancelled before it started
    ItemSkipped {
        batch_id: Uuid,
        media_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Every item of the batch reached a terminal outcome
    BatchCompleted {
        batch_id: Uuid,
        indexed: usize,
        skipped: usize,
        failed: usize,
        cancelled: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl IngestEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            IngestEvent::BatchStarted { .. } => "BatchStarted",
            IngestEvent::ItemResolved { .. } => "ItemResolved",
            IngestEvent::StageCompleted { .. } => "StageCompleted",
            IngestEvent::ItemFailed { .. } => "ItemFailed",
            IngestEvent::ItemSkipped { .. } => "ItemSkipped",
            IngestEvent::BatchCompleted { .. } => "BatchCompleted",
        }
    }

    /// Batch the event belongs to
    pub fn batch_id(&self) -> Uuid {
        match self {
            IngestEvent::BatchStarted { batch_id, .. }
            | IngestEvent::ItemResolved { batch_id, .. }
            | IngestEvent::StageCompleted { batch_id, .. }
            | IngestEvent::ItemFailed { batch_id, .. }
            | IngestEvent::ItemSkipped { batch_id, .. }
            | IngestEvent::BatchCompleted { batch_id, .. } => *batch_id,
        }
    }
}

/// Broadcast bus for ingest events
///
/// Cloning is cheap; all clones share one channel. Slow subscribers lag and
/// lose the oldest events once `capacity` is exceeded.
///
/// ```
/// use frogbase_common::events::EventBus;
///
/// let bus = EventBus::new(100);
/// let _rx = bus.subscribe();
/// assert_eq!(bus.subscriber_count(), 1);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IngestEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: IngestEvent,
    ) -> Result<usize, broadcast::error::SendError<IngestEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: IngestEvent) {
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

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
