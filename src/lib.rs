//! Workspace facade crate.
//!
//! Test suites depend on `lifecycle-workspace` to get the destructor tracker,
//! its configuration and event types, and (with the default `local-host`
//! feature) the in-process host runtime, without wiring each crate
//! individually.
//!
//! ```rust
//! use lifecycle_workspace::{track_destructors, LocalHost};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let host = LocalHost::new();
//! let tracker = track_destructors(Arc::new(host.clone())).unwrap();
//!
//! let source = host.allocate("RTCVideoSource", ());
//! let destroyed = tracker.destructor(&source);
//! drop(source);
//!
//! destroyed.await.unwrap();
//! tracker.stop();
//! # }
//! ```

pub use bridge_traits::{HostRuntime, LifecycleId};
pub use core_lifecycle::{
    track_destructors, Completion, CompletionState, Deferred, DestructorTracker, TrackerError,
    TypeFilter,
};
pub use core_runtime::config::TrackerConfig;
pub use core_runtime::events::TrackerEvent;

#[cfg(feature = "local-host")]
pub use bridge_local::LocalHost;
