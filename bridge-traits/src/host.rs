//! Host runtime capabilities.

use std::sync::Arc;

use crate::error::Result;
use crate::lifecycle::LifecycleChannel;

/// Memory reclamation trigger.
///
/// Destruction notifications are only produced as a side effect of the host
/// reclaiming memory, so consumers call this to make them arrive promptly.
pub trait GarbageCollector: Send + Sync {
    /// Attempt to reclaim unreachable resources now.
    ///
    /// Best effort: a single pass is not guaranteed to reclaim everything
    /// that is unreachable. Returns the number of resources reclaimed.
    fn collect(&self) -> Result<usize>;
}

/// Capabilities exposed by a host runtime.
pub trait HostRuntime: Send + Sync {
    /// The lifecycle notification channel.
    fn lifecycle(&self) -> Arc<dyn LifecycleChannel>;

    /// The collection facility, or `None` when the host does not expose one.
    fn collector(&self) -> Option<Arc<dyn GarbageCollector>>;
}
