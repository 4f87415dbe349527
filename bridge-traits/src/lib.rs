//! # Host Bridge Traits
//!
//! The contract between the destructor tracker and the host runtime that owns
//! asynchronous resources.
//!
//! ## Overview
//!
//! A host runtime allocates opaque resources (sockets, media sources, tracks,
//! connections), assigns each one a [`LifecycleId`], and eventually reclaims
//! them once nothing references them anymore. The tracker never owns those
//! resources; it only observes them through the capabilities defined here.
//!
//! ## Traits
//!
//! ### Lifecycle notifications
//! - [`LifecycleHooks`](lifecycle::LifecycleHooks) - Receives creation and destruction notifications
//! - [`LifecycleChannel`](lifecycle::LifecycleChannel) - Enables and disables a set of hooks
//!
//! ### Memory reclamation
//! - [`GarbageCollector`](host::GarbageCollector) - Best-effort "reclaim unreachable objects now"
//! - [`HostRuntime`](host::HostRuntime) - Bundles the capabilities a host exposes
//!
//! ## Host Implementations
//!
//! | Host            | Implementation Crate | Collector |
//! |-----------------|----------------------|-----------|
//! | In-process      | `bridge-local`       | ✅ Optional |
//!
//! ## Fail-Fast Strategy
//!
//! A host may refuse to expose its collector (for example when it was not
//! started with a collection hook). Consumers that need one should fail at
//! startup with [`BridgeError::NotAvailable`] or an equivalent capability
//! error instead of waiting for notifications that will never come.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a host can be shared between the
//! test body and the tracker's background tasks.

pub mod error;
pub mod host;
pub mod lifecycle;

pub use error::BridgeError;

pub use host::{GarbageCollector, HostRuntime};
pub use lifecycle::{
    InitEvent, LifecycleChannel, LifecycleHooks, LifecycleId, Resource, ResourceKey,
    SubscriptionId, WeakResource,
};
