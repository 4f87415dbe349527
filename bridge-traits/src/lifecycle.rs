//! Resource lifecycle notifications.
//!
//! A host reports two things about each asynchronous resource it manages:
//! that it was created (with its id, kind, and the id of the context that
//! caused it) and, later, that it was destroyed. Notifications for one id are
//! always delivered creation first.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::Result;

/// Type-erased, shared handle to a host resource.
pub type Resource = Arc<dyn Any + Send + Sync>;

/// Non-owning counterpart of [`Resource`].
pub type WeakResource = Weak<dyn Any + Send + Sync>;

/// Identifier assigned by the host when a resource is created.
///
/// Unique among live resources. A host may hand an id out again once the
/// previous holder's destruction has been reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LifecycleId(pub u64);

impl LifecycleId {
    /// Id of the top-level execution context. Never reported as a resource.
    pub const ROOT: LifecycleId = LifecycleId(1);

    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LifecycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity token for a resource allocation.
///
/// Derived from the address of the shared allocation, so every `Arc` clone of
/// the same resource maps to the same key, whatever its static type. The
/// address cannot be reused while anyone still holds a `Weak` to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKey(usize);

impl ResourceKey {
    pub fn of<T: ?Sized>(resource: &Arc<T>) -> Self {
        Self(Arc::as_ptr(resource).cast::<()>() as usize)
    }
}

/// Creation notification for a single resource.
#[derive(Clone, Copy)]
pub struct InitEvent<'a> {
    pub id: LifecycleId,
    pub type_name: &'a str,
    pub trigger_id: LifecycleId,
    pub resource: &'a Resource,
}

impl fmt::Debug for InitEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitEvent")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("trigger_id", &self.trigger_id)
            .finish_non_exhaustive()
    }
}

/// Callbacks invoked by the host as resources come and go.
///
/// Hooks run synchronously on whichever thread created or reclaimed the
/// resource, and must not call back into the host's lifecycle channel.
pub trait LifecycleHooks: Send + Sync {
    /// A resource was created.
    fn init(&self, event: InitEvent<'_>);

    /// The resource with this id was destroyed.
    fn destroy(&self, id: LifecycleId);
}

/// Handle returned when a set of hooks is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Subscribable lifecycle notification channel.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::lifecycle::{LifecycleChannel, LifecycleHooks};
///
/// fn attach(channel: &dyn LifecycleChannel, hooks: Arc<dyn LifecycleHooks>) -> Result<()> {
///     let subscription = channel.enable(hooks)?;
///     // ...
///     channel.disable(subscription);
///     Ok(())
/// }
/// ```
pub trait LifecycleChannel: Send + Sync {
    /// Start delivering notifications to `hooks`.
    fn enable(&self, hooks: Arc<dyn LifecycleHooks>) -> Result<SubscriptionId>;

    /// Stop delivering notifications for `subscription`.
    ///
    /// Returns `false` when the subscription was already disabled.
    fn disable(&self, subscription: SubscriptionId) -> bool;
}
