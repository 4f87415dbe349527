//! Bookkeeping between live resources, their lifecycle ids and the pending
//! destructor signals.
//!
//! Two tables are kept:
//!
//! - resource identity to lifecycle id, holding only a [`WeakResource`] so
//!   tracking never extends a resource's lifetime;
//! - lifecycle id to the [`Deferred`] that resolves when the host reports the
//!   resource destroyed.
//!
//! An id leaves the second table as soon as it is resolved. Entries in the
//! first table go away once their resource is gone, whether or not a
//! destruction was ever reported for it.

use bridge_traits::{LifecycleId, Resource, ResourceKey, WeakResource};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

use crate::completion::{Completion, Deferred};
use crate::error::{Result, TrackerError};

/// Identity tables are fully reaped once they grow past this many entries.
const MIN_REAP_THRESHOLD: usize = 64;

struct WeakEntry {
    resource: WeakResource,
    id: LifecycleId,
}

impl WeakEntry {
    fn is_alive(&self) -> bool {
        self.resource.strong_count() > 0
    }
}

struct IdentityTable {
    entries: HashMap<ResourceKey, WeakEntry>,
    /// Latest key recorded for each id.
    keys: HashMap<LifecycleId, ResourceKey>,
    reap_threshold: usize,
}

impl Default for IdentityTable {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            keys: HashMap::new(),
            reap_threshold: MIN_REAP_THRESHOLD,
        }
    }
}

impl IdentityTable {
    fn insert(&mut self, key: ResourceKey, entry: WeakEntry) {
        if self.entries.len() >= self.reap_threshold {
            self.reap();
            self.reap_threshold = (self.entries.len() * 2).max(MIN_REAP_THRESHOLD);
        }
        self.keys.insert(entry.id, key);
        self.entries.insert(key, entry);
    }

    /// Drop the entry recorded for `id` if its resource is gone.
    fn forget_if_dead(&mut self, id: LifecycleId) -> bool {
        let Some(key) = self.keys.get(&id).copied() else {
            return false;
        };

        match self.entries.get(&key) {
            Some(entry) if entry.id == id && entry.is_alive() => false,
            Some(entry) if entry.id == id => {
                self.entries.remove(&key);
                self.keys.remove(&id);
                true
            }
            _ => {
                self.keys.remove(&id);
                false
            }
        }
    }

    fn reap(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_alive());

        let entries = &self.entries;
        self.keys
            .retain(|id, key| entries.get(key).is_some_and(|entry| entry.id == *id));

        before - self.entries.len()
    }
}

/// Resource and id tables shared by the lifecycle hooks and the query side.
#[derive(Default)]
pub struct ResourceRegistry {
    ids: Mutex<IdentityTable>,
    pending: Mutex<HashMap<LifecycleId, Deferred<TrackerError>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `resource` under `id` and create its pending destructor signal.
    ///
    /// A growing identity table is occasionally swept for reclaimed resources
    /// here, so the cost stays constant per call on average.
    ///
    /// # Errors
    ///
    /// [`TrackerError::DuplicateLifecycleId`] if `id` already has a pending
    /// signal. Nothing is recorded in that case.
    pub fn track(&self, resource: &Resource, id: LifecycleId) -> Result<()> {
        {
            let mut pending = lock(&self.pending);
            if pending.contains_key(&id) {
                return Err(TrackerError::DuplicateLifecycleId(id));
            }
            pending.insert(id, Deferred::new());
        }

        lock(&self.ids).insert(
            ResourceKey::of(resource),
            WeakEntry {
                resource: Arc::downgrade(resource),
                id,
            },
        );

        Ok(())
    }

    /// Resolve and retire the signal for `id`.
    ///
    /// Returns `false` when `id` has no pending signal, which is not an error.
    /// The identity entry of `id` is dropped too if its resource is gone; a
    /// resource that is still alive keeps it.
    pub fn resolve(&self, id: LifecycleId) -> bool {
        let deferred = lock(&self.pending).remove(&id);
        let Some(deferred) = deferred else {
            return false;
        };

        deferred.resolve();
        if lock(&self.ids).forget_if_dead(id) {
            trace!(%id, "Dropped identity entry of reclaimed resource");
        }
        true
    }

    /// The pending destructor signal of `resource`.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::ResourceNotTracked`] if no id is recorded for it
    /// - [`TrackerError::IdNotPending`] if its id was already resolved
    pub fn completion_for<T: ?Sized>(&self, resource: &Arc<T>) -> Result<Completion<TrackerError>> {
        let id = lock(&self.ids)
            .entries
            .get(&ResourceKey::of(resource))
            .filter(|entry| entry.is_alive())
            .map(|entry| entry.id)
            .ok_or(TrackerError::ResourceNotTracked)?;

        lock(&self.pending)
            .get(&id)
            .map(Deferred::completion)
            .ok_or(TrackerError::IdNotPending(id))
    }

    /// Drop identity entries whose resource no longer exists.
    pub fn reap(&self) -> usize {
        lock(&self.ids).reap()
    }

    /// Ids with an unresolved signal, ascending.
    pub fn pending_ids(&self) -> Vec<LifecycleId> {
        let mut ids: Vec<LifecycleId> = lock(&self.pending).keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Number of identity entries, including not yet reaped dead ones.
    pub fn tracked_count(&self) -> usize {
        lock(&self.ids).entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionState;

    fn resource() -> Resource {
        Arc::new(String::from("MediaStreamTrack"))
    }

    #[test]
    fn test_track_creates_pending_signal() {
        let registry = ResourceRegistry::new();
        let track = resource();

        registry.track(&track, LifecycleId::new(2)).unwrap();

        let completion = registry.completion_for(&track).unwrap();
        assert!(completion.is_pending());
        assert_eq!(registry.pending_ids(), vec![LifecycleId::new(2)]);
        assert_eq!(registry.tracked_count(), 1);
    }

    #[test]
    fn test_lookup_by_typed_handle() {
        let registry = ResourceRegistry::new();
        let typed = Arc::new(41u64);
        let erased: Resource = typed.clone();

        registry.track(&erased, LifecycleId::new(9)).unwrap();
        assert!(registry.completion_for(&typed).is_ok());
    }

    #[test]
    fn test_three_resources_one_destroyed() {
        let registry = ResourceRegistry::new();
        let resources: Vec<Resource> = (0..3).map(|_| resource()).collect();
        for (n, r) in resources.iter().enumerate() {
            registry.track(r, LifecycleId::new(n as u64 + 1)).unwrap();
        }

        let completions: Vec<_> = resources
            .iter()
            .map(|r| registry.completion_for(r).unwrap())
            .collect();

        assert!(registry.resolve(LifecycleId::new(2)));

        assert_eq!(completions[0].state(), CompletionState::Pending);
        assert_eq!(completions[1].state(), CompletionState::Resolved);
        assert_eq!(completions[2].state(), CompletionState::Pending);

        assert!(registry.completion_for(&resources[0]).unwrap().is_pending());
        assert!(registry.completion_for(&resources[2]).unwrap().is_pending());
        assert_eq!(
            registry.completion_for(&resources[1]).unwrap_err(),
            TrackerError::IdNotPending(LifecycleId::new(2))
        );
    }

    #[test]
    fn test_unknown_resource() {
        let registry = ResourceRegistry::new();
        let stranger = Arc::new(());
        assert_eq!(
            registry.completion_for(&stranger).unwrap_err(),
            TrackerError::ResourceNotTracked
        );
    }

    #[test]
    fn test_resolve_unknown_id_is_noop() {
        let registry = ResourceRegistry::new();
        let track = resource();
        registry.track(&track, LifecycleId::new(2)).unwrap();

        assert!(!registry.resolve(LifecycleId::new(77)));
        assert!(registry.resolve(LifecycleId::new(2)));
        assert!(!registry.resolve(LifecycleId::new(2)));
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_duplicate_pending_id_rejected() {
        let registry = ResourceRegistry::new();
        let first = resource();
        let second = resource();

        registry.track(&first, LifecycleId::new(5)).unwrap();
        assert_eq!(
            registry.track(&second, LifecycleId::new(5)),
            Err(TrackerError::DuplicateLifecycleId(LifecycleId::new(5)))
        );

        assert_eq!(registry.tracked_count(), 1);
        assert_eq!(
            registry.completion_for(&second).unwrap_err(),
            TrackerError::ResourceNotTracked
        );
    }

    #[test]
    fn test_id_reuse_after_resolution() {
        let registry = ResourceRegistry::new();
        let first = resource();
        let second = resource();

        registry.track(&first, LifecycleId::new(3)).unwrap();
        registry.resolve(LifecycleId::new(3));
        registry.track(&second, LifecycleId::new(3)).unwrap();

        assert!(registry.completion_for(&second).unwrap().is_pending());
    }

    #[test]
    fn test_tracking_does_not_keep_resource_alive() {
        let registry = ResourceRegistry::new();
        let track = resource();
        let weak = Arc::downgrade(&track);

        registry.track(&track, LifecycleId::new(2)).unwrap();
        drop(track);

        assert!(weak.upgrade().is_none());
        assert_eq!(registry.reap(), 1);
        assert_eq!(registry.tracked_count(), 0);
        // The signal stays until the destruction is reported.
        assert_eq!(registry.pending_count(), 1);
    }

    #[test]
    fn test_resolve_keeps_live_entry_until_reaped() {
        let registry = ResourceRegistry::new();
        let track = resource();

        registry.track(&track, LifecycleId::new(2)).unwrap();
        assert!(registry.resolve(LifecycleId::new(2)));
        assert_eq!(registry.tracked_count(), 1);

        drop(track);
        assert_eq!(registry.reap(), 1);
        assert_eq!(registry.tracked_count(), 0);
    }

    #[test]
    fn test_growing_table_is_swept_on_track() {
        let registry = ResourceRegistry::new();
        for n in 0..MIN_REAP_THRESHOLD as u64 {
            let gone = resource();
            registry.track(&gone, LifecycleId::new(n + 2)).unwrap();
        }
        assert_eq!(registry.tracked_count(), MIN_REAP_THRESHOLD);

        let kept = resource();
        registry.track(&kept, LifecycleId::new(1_000)).unwrap();

        assert_eq!(registry.tracked_count(), 1);
        assert!(registry.completion_for(&kept).unwrap().is_pending());
    }

    #[test]
    fn test_resolve_of_reused_id_leaves_other_entry() {
        let registry = ResourceRegistry::new();
        let first = resource();
        let second = resource();

        registry.track(&first, LifecycleId::new(3)).unwrap();
        registry.resolve(LifecycleId::new(3));
        registry.track(&second, LifecycleId::new(3)).unwrap();
        drop(first);

        assert!(registry.resolve(LifecycleId::new(3)));
        assert_eq!(registry.tracked_count(), 2);
        assert_eq!(registry.reap(), 1);
        assert_eq!(
            registry.completion_for(&second).unwrap_err(),
            TrackerError::IdNotPending(LifecycleId::new(3))
        );
    }

    #[test]
    fn test_resolve_reaps_dead_entries() {
        let registry = ResourceRegistry::new();
        let gone = resource();
        let kept = resource();

        registry.track(&gone, LifecycleId::new(2)).unwrap();
        registry.track(&kept, LifecycleId::new(3)).unwrap();
        drop(gone);

        assert!(registry.resolve(LifecycleId::new(2)));
        assert_eq!(registry.tracked_count(), 1);
        assert_eq!(registry.pending_ids(), vec![LifecycleId::new(3)]);
    }
}
