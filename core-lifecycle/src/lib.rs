//! # Destructor Tracking Module
//!
//! Lets tests assert that host-managed asynchronous resources (media tracks,
//! sources, connections) are actually released.
//!
//! ## Overview
//!
//! Destruction of such resources is only observable through the host's
//! lifecycle notifications, which in turn only arrive after the host reclaims
//! memory. This crate:
//! - Subscribes to creation and destruction notifications
//! - Skips host housekeeping resources by type name
//! - Hands out a one-shot signal per tracked resource that settles on destruction
//! - Periodically asks the host to collect so the signals settle promptly
//!
//! ## Components
//!
//! - **Type Filter** (`type_filter`): Resource kinds that are never tracked
//! - **Completion** (`completion`): One-shot `Deferred`/`Completion` pair
//! - **Registry** (`registry`): Weak resource identity to id, id to pending signal
//! - **Collection Pump** (`pump`): Cancellable periodic collection requests
//! - **Tracker** (`tracker`): Hook handlers, start/stop lifecycle and queries
//!
//! ## Usage
//!
//! ```rust
//! use bridge_local::LocalHost;
//! use core_lifecycle::{track_destructors, TrackerError};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let host = LocalHost::new();
//! let tracker = track_destructors(Arc::new(host.clone())).unwrap();
//!
//! let timer = host.allocate("Timeout", ());
//! assert_eq!(tracker.destructor(&timer).await, Err(TrackerError::ResourceNotTracked));
//!
//! let connection = host.allocate("RTCPeerConnection", ());
//! let destroyed = tracker.destructor(&connection);
//! drop(connection);
//! assert_eq!(destroyed.await, Ok(()));
//!
//! tracker.stop();
//! # }
//! ```

pub mod completion;
pub mod error;
pub mod pump;
pub mod registry;
pub mod tracker;
pub mod type_filter;

pub use completion::{Completion, CompletionState, Deferred};
pub use error::{Result, TrackerError};
pub use pump::CollectionPump;
pub use registry::ResourceRegistry;
pub use tracker::{track_destructors, DestructorTracker};
pub use type_filter::{TypeFilter, IGNORED_TYPES};
