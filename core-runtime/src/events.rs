//! # Event Bus System
//!
//! Broadcasts what the destructor tracker observes, using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: [`TrackerEvent`], one variant per observable step
//! - **EventBus**: Central broadcast channel the tracker publishes on
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   emit    ┌───────────┐   subscribe   ┌────────────┐
//! │ Hook handler ├──────────>│           ├──────────────>│ Test body  │
//! └──────────────┘           │ EventBus  │               └────────────┘
//! ┌──────────────┐   emit    │ (broadcast│   subscribe   ┌────────────┐
//! │ Collection   ├──────────>│  channel) ├──────────────>│ Leak report│
//! │ pump         │           │           │               └────────────┘
//! └──────────────┘           └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, EventStream, TrackerEvent};
//! use bridge_traits::LifecycleId;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut destroyed = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, TrackerEvent::ResourceDestroyed { .. }));
//!
//! bus.emit(TrackerEvent::ResourceDestroyed { id: LifecycleId::new(2) }).ok();
//!
//! let event = destroyed.recv().await.unwrap();
//! assert_eq!(event, TrackerEvent::ResourceDestroyed { id: LifecycleId::new(2) });
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   The collection pump can produce events quickly, so keep subscribers
//!   draining or size the buffer through `TrackerConfig::event_buffer_size`.
//! - **`RecvError::Closed`**: The tracker (and every bus clone) was dropped.

use bridge_traits::LifecycleId;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

pub use crate::config::DEFAULT_EVENT_BUFFER_SIZE;

/// Something the destructor tracker observed or did.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum TrackerEvent {
    /// Hooks were enabled and the collection pump started.
    TrackerStarted {
        /// Pump period in milliseconds.
        collection_interval_ms: u64,
    },
    /// A resource got a pending destructor signal.
    ResourceTracked {
        id: LifecycleId,
        type_name: String,
        trigger_id: LifecycleId,
    },
    /// A resource of an ignored type was reported and skipped.
    ResourceIgnored { id: LifecycleId, type_name: String },
    /// A pending destructor signal was resolved.
    ResourceDestroyed { id: LifecycleId },
    /// A collection pass reclaimed at least one resource.
    CollectionCompleted { reclaimed: usize },
    /// Hooks were disabled and the pump halted.
    TrackerStopped {
        /// Destructor signals that will now never resolve.
        pending: usize,
    },
}

impl TrackerEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            TrackerEvent::TrackerStarted { .. } => "Destructor tracking started",
            TrackerEvent::ResourceTracked { .. } => "Resource tracked",
            TrackerEvent::ResourceIgnored { .. } => "Resource of ignored type skipped",
            TrackerEvent::ResourceDestroyed { .. } => "Resource destroyed",
            TrackerEvent::CollectionCompleted { .. } => "Collection pass reclaimed resources",
            TrackerEvent::TrackerStopped { .. } => "Destructor tracking stopped",
        }
    }

    /// Returns the severity level of the event.
    ///
    /// Stopping with outstanding destructor signals is a warning: those
    /// resources were never observed to be released.
    pub fn severity(&self) -> EventSeverity {
        match self {
            TrackerEvent::TrackerStopped { pending } if *pending > 0 => EventSeverity::Warning,
            TrackerEvent::TrackerStarted { .. } | TrackerEvent::TrackerStopped { .. } => {
                EventSeverity::Info
            }
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
}

/// Broadcast channel for [`TrackerEvent`]s.
///
/// Cloning the bus yields another sender on the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TrackerEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: TrackerEvent) -> Result<usize, SendError<TrackerEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<TrackerEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

type EventFilter = Box<dyn Fn(&TrackerEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter predicate.
pub struct EventStream {
    receiver: Receiver<TrackerEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<TrackerEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TrackerEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &TrackerEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<TrackerEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<TrackerEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
