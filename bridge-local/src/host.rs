//! In-process host runtime.

use bridge_traits::{
    error::Result, GarbageCollector, HostRuntime, InitEvent, LifecycleChannel, LifecycleHooks,
    LifecycleId, Resource, SubscriptionId, WeakResource,
};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

type Subscribers = Vec<Arc<dyn LifecycleHooks>>;

/// Host runtime that tracks resources through weak references.
///
/// Cloning a `LocalHost` yields another handle to the same heap and the same
/// subscribers.
#[derive(Clone)]
pub struct LocalHost {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<HostState>,
    collector_exposed: bool,
}

struct HostState {
    next_id: u64,
    next_subscription: u64,
    heap: BTreeMap<LifecycleId, HeapEntry>,
    subscribers: Vec<(SubscriptionId, Arc<dyn LifecycleHooks>)>,
    collections: u64,
}

struct HeapEntry {
    type_name: String,
    resource: WeakResource,
}

impl HostState {
    fn new() -> Self {
        Self {
            next_id: LifecycleId::ROOT.get() + 1,
            next_subscription: 1,
            heap: BTreeMap::new(),
            subscribers: Vec::new(),
            collections: 0,
        }
    }

    fn subscribers(&self) -> Subscribers {
        self.subscribers
            .iter()
            .map(|(_, hooks)| Arc::clone(hooks))
            .collect()
    }
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalHost {
    /// Create a host that exposes its collector.
    pub fn new() -> Self {
        Self::with_collector(true)
    }

    /// Create a host whose [`HostRuntime::collector`] returns `None`.
    pub fn without_collector() -> Self {
        Self::with_collector(false)
    }

    fn with_collector(collector_exposed: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(HostState::new()),
                collector_exposed,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a resource created from the top-level context.
    pub fn allocate<T>(&self, type_name: &str, value: T) -> Arc<T>
    where
        T: Any + Send + Sync,
    {
        self.allocate_from(LifecycleId::ROOT, type_name, value)
    }

    /// Allocate a resource whose creation was caused by `trigger_id`.
    ///
    /// Enabled hooks observe the creation before this returns.
    pub fn allocate_from<T>(&self, trigger_id: LifecycleId, type_name: &str, value: T) -> Arc<T>
    where
        T: Any + Send + Sync,
    {
        let resource = Arc::new(value);
        let erased: Resource = resource.clone();

        let (id, subscribers) = {
            let mut state = self.lock();
            let id = LifecycleId::new(state.next_id);
            state.next_id += 1;
            state.heap.insert(
                id,
                HeapEntry {
                    type_name: type_name.to_string(),
                    resource: Arc::downgrade(&erased),
                },
            );
            (id, state.subscribers())
        };

        trace!(%id, type_name, %trigger_id, "Allocated resource");

        let event = InitEvent {
            id,
            type_name,
            trigger_id,
            resource: &erased,
        };
        for hooks in &subscribers {
            hooks.init(event);
        }

        resource
    }

    /// Run a collection pass.
    ///
    /// Every resource with no remaining strong handle is removed from the heap
    /// and its destruction reported, lowest id first. Returns how many were
    /// reclaimed.
    pub fn gc(&self) -> usize {
        let (reclaimed, subscribers) = {
            let mut state = self.lock();
            state.collections += 1;

            let dead: Vec<LifecycleId> = state
                .heap
                .iter()
                .filter(|(_, entry)| entry.resource.strong_count() == 0)
                .map(|(id, _)| *id)
                .collect();

            for id in &dead {
                if let Some(entry) = state.heap.remove(id) {
                    trace!(%id, type_name = %entry.type_name, "Reclaimed resource");
                }
            }

            (dead, state.subscribers())
        };

        for id in &reclaimed {
            for hooks in &subscribers {
                hooks.destroy(*id);
            }
        }

        if !reclaimed.is_empty() {
            debug!(reclaimed = reclaimed.len(), "Collection pass finished");
        }

        reclaimed.len()
    }

    /// Report the destruction of `id` regardless of whether it is still live.
    pub fn emit_destroy(&self, id: LifecycleId) {
        let subscribers = {
            let mut state = self.lock();
            state.heap.remove(&id);
            state.subscribers()
        };

        for hooks in &subscribers {
            hooks.destroy(id);
        }
    }

    /// Number of resources created and not yet reclaimed.
    pub fn live_count(&self) -> usize {
        self.lock().heap.len()
    }

    /// Type name a live resource was created with.
    pub fn type_of(&self, id: LifecycleId) -> Option<String> {
        self.lock()
            .heap
            .get(&id)
            .map(|entry| entry.type_name.clone())
    }

    /// Number of collection passes run so far.
    pub fn collections(&self) -> u64 {
        self.lock().collections
    }

    /// Number of enabled hook sets.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

impl LifecycleChannel for LocalHost {
    fn enable(&self, hooks: Arc<dyn LifecycleHooks>) -> Result<SubscriptionId> {
        let mut state = self.lock();
        let subscription = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;
        state.subscribers.push((subscription, hooks));
        debug!(subscription = subscription.0, "Lifecycle hooks enabled");
        Ok(subscription)
    }

    fn disable(&self, subscription: SubscriptionId) -> bool {
        let mut state = self.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|(id, _)| *id != subscription);
        let removed = state.subscribers.len() != before;
        if removed {
            debug!(subscription = subscription.0, "Lifecycle hooks disabled");
        }
        removed
    }
}

impl GarbageCollector for LocalHost {
    fn collect(&self) -> Result<usize> {
        Ok(self.gc())
    }
}

impl HostRuntime for LocalHost {
    fn lifecycle(&self) -> Arc<dyn LifecycleChannel> {
        Arc::new(self.clone())
    }

    fn collector(&self) -> Option<Arc<dyn GarbageCollector>> {
        if self.inner.collector_exposed {
            Some(Arc::new(self.clone()))
        } else {
            None
        }
    }
}

impl fmt::Debug for LocalHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("LocalHost")
            .field("live", &state.heap.len())
            .field("subscribers", &state.subscribers.len())
            .field("collections", &state.collections)
            .field("collector_exposed", &self.inner.collector_exposed)
            .finish()
    }
}
