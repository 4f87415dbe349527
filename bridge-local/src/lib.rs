//! # Local Bridge Implementation
//!
//! In-process host runtime implementing the bridge traits.
//!
//! ## Overview
//!
//! [`LocalHost`] plays the part of a garbage-collected runtime inside a Rust
//! test process:
//! - `LifecycleChannel`: creation is reported synchronously from
//!   [`LocalHost::allocate`], destruction from [`LocalHost::gc`]
//! - `GarbageCollector`: a collection pass reclaims every resource whose last
//!   strong handle has been dropped
//! - `HostRuntime`: the collector can be withheld with
//!   [`LocalHost::without_collector`]
//!
//! ## Usage
//!
//! ```rust
//! use bridge_local::LocalHost;
//!
//! let host = LocalHost::new();
//! let track = host.allocate("MediaStreamTrack", String::from("video"));
//! assert_eq!(host.live_count(), 1);
//!
//! drop(track);
//! assert_eq!(host.gc(), 1);
//! assert_eq!(host.live_count(), 0);
//! ```

mod host;

pub use host::LocalHost;
