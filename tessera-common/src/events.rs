//! Event types for the Tessera event system
//!
//! Playback controllers publish a small, fixed set of events for UI and
//! telemetry collaborators. They are broadcast through [`EventBus`] and can be
//! serialized for SSE transmission.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Why a queue item failed to play
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed locator or missing local file, detected before any engine call
    Validation,
    /// Page-to-direct locator lookup failed or timed out
    Resolution,
    /// Engine reported a failure that will not go away on retry
    /// (missing codec, confirmed-missing file, dead remote locator)
    Unrecoverable,
    /// Engine reported a failure that may succeed on a later attempt
    Transient,
    /// Transient failure caused by resource exhaustion; retried after a longer delay
    ResourceExhaustion,
}

impl FailureKind {
    /// Failures of this kind exhaust the item's retry budget immediately
    pub fn exhausts_item(self) -> bool {
        matches!(self, FailureKind::Validation | FailureKind::Unrecoverable)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Validation => write!(f, "validation"),
            FailureKind::Resolution => write!(f, "resolution"),
            FailureKind::Unrecoverable => write!(f, "unrecoverable"),
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::ResourceExhaustion => write!(f, "resource_exhaustion"),
        }
    }
}

/// Why a controller stopped retrying
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// A full sweep of the queue found no item eligible to load
    AllItemsExhausted,
    /// Self-triggered retries exceeded the recursion ceiling
    RecursionCeiling,
    /// Session-wide consecutive failures reached the halt threshold
    ConsecutiveFailures,
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalReason::AllItemsExhausted => write!(f, "all queue items exhausted"),
            TerminalReason::RecursionCeiling => write!(f, "retry recursion ceiling exceeded"),
            TerminalReason::ConsecutiveFailures => write!(f, "too many consecutive failures"),
        }
    }
}

/// Tessera event types
///
/// These are the only integration points a presentation layer needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// A queue item finished opening and playback can begin
    ///
    /// Triggers:
    /// - SSE: Update now-playing display for the window
    ItemOpened {
        /// Window that opened the item
        window_id: String,
        /// Queue index of the item
        index: usize,
        /// Locator submitted to the media engine
        locator: String,
        /// Optional display title of the item
        title: Option<String>,
        /// When the open completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A queue item failed (informational; the controller handles retry itself)
    ItemFailed {
        /// Window that experienced the failure
        window_id: String,
        /// Queue index of the failed item
        index: usize,
        /// Identity locator of the failed item
        locator: String,
        /// Failure classification
        kind: FailureKind,
        /// Human-readable reason
        reason: String,
        /// When the failure was handled
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The controller halted and will not retry until its queue is replaced
    TerminalFailure {
        /// Window that halted
        window_id: String,
        /// Why the controller halted
        reason: TerminalReason,
        /// When the controller halted
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The window has its item open and is not buffering
    ///
    /// Shared-clock groups start once every member has reported this.
    ReadyForCoordinatedStart {
        /// Window that became ready
        window_id: String,
        /// Queue index that is ready
        index: usize,
        /// When the window became ready
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback position update forwarded from the media engine
    PositionChanged {
        /// Window whose position changed
        window_id: String,
        /// Current position in milliseconds
        position_ms: i64,
        /// When the position was reported
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Event type name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::ItemOpened { .. } => "ItemOpened",
            PlayerEvent::ItemFailed { .. } => "ItemFailed",
            PlayerEvent::TerminalFailure { .. } => "TerminalFailure",
            PlayerEvent::ReadyForCoordinatedStart { .. } => "ReadyForCoordinatedStart",
            PlayerEvent::PositionChanged { .. } => "PositionChanged",
        }
    }

    /// Window the event belongs to
    pub fn window_id(&self) -> &str {
        match self {
            PlayerEvent::ItemOpened { window_id, .. }
            | PlayerEvent::ItemFailed { window_id, .. }
            | PlayerEvent::TerminalFailure { window_id, .. }
            | PlayerEvent::ReadyForCoordinatedStart { window_id, .. }
            | PlayerEvent::PositionChanged { window_id, .. } => window_id,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Uses `tokio::sync::broadcast` internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use tessera_common::events::{EventBus, PlayerEvent};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(PlayerEvent::PositionChanged {
///     window_id: "left".to_string(),
///     position_ms: 1500,
///     timestamp: chrono::Utc::now(),
/// });
///
/// let event = rx.try_recv().unwrap();
/// assert_eq!(event.event_type(), "PositionChanged");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
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
