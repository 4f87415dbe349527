//! The destructor tracker.
//!
//! [`DestructorTracker`] subscribes to a host's lifecycle notifications,
//! records every non-ignored resource the host creates, and resolves the
//! matching destructor signal when the host reports the resource destroyed.
//! While running it owns a [`CollectionPump`] so those reports keep arriving.
//!
//! ## Lifecycle
//!
//! ```text
//!            start()              stop()
//!   Idle ─────────────> Running ─────────> Stopped
//!                          ▲                  │
//!                          └──────────────────┘
//!                                start()
//! ```
//!
//! Stopping leaves unresolved signals unresolved. Awaiting one of them after
//! `stop()` never completes; wrap such waits in a timeout.

use bridge_traits::{HostRuntime, InitEvent, LifecycleHooks, LifecycleId, SubscriptionId};
use core_runtime::config::TrackerConfig;
use core_runtime::events::{EventBus, EventSeverity, EventStream, TrackerEvent};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::completion::Completion;
use crate::error::{Result, TrackerError};
use crate::pump::CollectionPump;
use crate::registry::ResourceRegistry;
use crate::type_filter::TypeFilter;

/// Hook set registered with the host while the tracker runs.
///
/// A host may still be delivering a notification it picked up before the
/// hooks were disabled. Every notification runs under a read guard of
/// `active`, and [`TrackerHooks::deactivate`] takes the write side, so once it
/// returns no notification can reach the registry.
struct TrackerHooks {
    registry: Arc<ResourceRegistry>,
    filter: TypeFilter,
    events: Option<EventBus>,
    active: RwLock<bool>,
}

impl TrackerHooks {
    fn new(registry: Arc<ResourceRegistry>, filter: TypeFilter, events: Option<EventBus>) -> Self {
        Self {
            registry,
            filter,
            events,
            active: RwLock::new(true),
        }
    }

    /// Waits for in-flight notifications, then ignores all later ones.
    fn deactivate(&self) {
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = false;
    }

    fn gate(&self) -> RwLockReadGuard<'_, bool> {
        self.active.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TrackerEvent) {
        if let Some(bus) = &self.events {
            let _ = bus.emit(event);
        }
    }
}

impl LifecycleHooks for TrackerHooks {
    fn init(&self, event: InitEvent<'_>) {
        let active = self.gate();
        if !*active {
            trace!(id = %event.id, "Creation reported after stop");
            return;
        }

        if self.filter.is_ignored(event.type_name) {
            trace!(id = %event.id, type_name = event.type_name, "Ignoring resource");
            self.emit(TrackerEvent::ResourceIgnored {
                id: event.id,
                type_name: event.type_name.to_string(),
            });
            return;
        }

        if let Err(err) = self.registry.track(event.resource, event.id) {
            // The host reused an id whose destruction it never reported.
            error!(
                id = %event.id,
                type_name = event.type_name,
                error = %err,
                "Lifecycle protocol violation"
            );
            panic!("destructor tracker state is inconsistent: {err}");
        }

        debug!(
            id = %event.id,
            type_name = event.type_name,
            trigger_id = %event.trigger_id,
            "Tracking resource"
        );
        self.emit(TrackerEvent::ResourceTracked {
            id: event.id,
            type_name: event.type_name.to_string(),
            trigger_id: event.trigger_id,
        });
    }

    fn destroy(&self, id: LifecycleId) {
        let active = self.gate();
        if !*active {
            trace!(%id, "Destruction reported after stop");
            return;
        }

        if self.registry.resolve(id) {
            debug!(%id, "Resource destroyed");
            self.emit(TrackerEvent::ResourceDestroyed { id });
        } else {
            trace!(%id, "Destruction of untracked id");
        }
    }
}

enum TrackerState {
    Idle,
    Running {
        subscription: SubscriptionId,
        hooks: Arc<TrackerHooks>,
        pump: CollectionPump,
    },
    Stopped,
}

/// Tracks destruction of host resources for test code.
///
/// # Example
///
/// ```rust
/// use bridge_local::LocalHost;
/// use core_lifecycle::DestructorTracker;
/// use core_runtime::config::TrackerConfig;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let host = LocalHost::new();
/// let tracker = DestructorTracker::new(Arc::new(host.clone()), TrackerConfig::default()).unwrap();
/// tracker.start().unwrap();
///
/// let track = host.allocate("MediaStreamTrack", ());
/// tracker
///     .wait_for_destruction(track, Duration::from_secs(1))
///     .await
///     .unwrap();
///
/// tracker.stop();
/// # }
/// ```
pub struct DestructorTracker {
    host: Arc<dyn HostRuntime>,
    config: TrackerConfig,
    registry: Arc<ResourceRegistry>,
    events: Option<EventBus>,
    state: Mutex<TrackerState>,
}

impl DestructorTracker {
    /// Create an idle tracker for `host`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Runtime`] when `config` does not validate.
    pub fn new(host: Arc<dyn HostRuntime>, config: TrackerConfig) -> Result<Self> {
        config.validate()?;

        let events = config
            .enable_events
            .then(|| EventBus::new(config.event_buffer_size));

        Ok(Self {
            host,
            config,
            registry: Arc::new(ResourceRegistry::new()),
            events,
            state: Mutex::new(TrackerState::Idle),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to the host's lifecycle notifications and start the
    /// collection pump.
    ///
    /// # Errors
    ///
    /// - [`TrackerError::AlreadyRunning`] if the tracker is running
    /// - [`TrackerError::Runtime`] wrapping `CapabilityMissing` if the host
    ///   exposes no garbage collector
    /// - [`TrackerError::RuntimeUnavailable`] outside a tokio runtime
    /// - [`TrackerError::Host`] if the host refuses the subscription
    #[instrument(skip(self), fields(interval_ms = self.config.collection_interval.as_millis() as u64))]
    pub fn start(&self) -> Result<()> {
        let mut state = self.lock_state();
        if matches!(*state, TrackerState::Running { .. }) {
            return Err(TrackerError::AlreadyRunning);
        }

        let collector = self.host.collector().ok_or_else(|| {
            error!("Host runtime does not expose a garbage collector");
            core_runtime::Error::CapabilityMissing {
                capability: "GarbageCollector".to_string(),
                message: "start the host with its collector exposed so destruction \
                          notifications can be forced"
                    .to_string(),
            }
        })?;

        let pump = CollectionPump::spawn(
            collector,
            self.config.collection_interval,
            self.events.clone(),
        )?;

        let hooks = Arc::new(TrackerHooks::new(
            Arc::clone(&self.registry),
            TypeFilter::with_additional(self.config.additional_ignored_types.iter().cloned()),
            self.events.clone(),
        ));
        // A failed subscription drops the pump, which stops it.
        let subscription = self.host.lifecycle().enable(hooks.clone())?;

        *state = TrackerState::Running {
            subscription,
            hooks,
            pump,
        };
        drop(state);

        self.announce(TrackerEvent::TrackerStarted {
            collection_interval_ms: self.config.collection_interval.as_millis() as u64,
        });
        Ok(())
    }

    /// Unsubscribe from the host and halt the collection pump.
    ///
    /// Safe to call any number of times. Unresolved signals stay unresolved.
    pub fn stop(&self) {
        let previous = {
            let mut state = self.lock_state();
            if !matches!(*state, TrackerState::Running { .. }) {
                return;
            }
            std::mem::replace(&mut *state, TrackerState::Stopped)
        };
        let TrackerState::Running {
            subscription,
            hooks,
            pump,
        } = previous
        else {
            return;
        };

        hooks.deactivate();
        self.host.lifecycle().disable(subscription);
        pump.stop();

        let reaped = self.registry.reap();
        trace!(reaped, "Dropped identity entries of reclaimed resources");

        self.announce(TrackerEvent::TrackerStopped {
            pending: self.registry.pending_count(),
        });
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock_state(), TrackerState::Running { .. })
    }

    /// Signal that settles once `resource` is reported destroyed.
    ///
    /// Queries that cannot be answered come back as an already rejected
    /// completion carrying [`TrackerError::ResourceNotTracked`] or
    /// [`TrackerError::IdNotPending`].
    pub fn destructor<T: ?Sized>(&self, resource: &Arc<T>) -> Completion<TrackerError> {
        self.try_destructor(resource)
            .unwrap_or_else(Completion::rejected)
    }

    /// Like [`destructor`](Self::destructor), reporting query failures directly.
    pub fn try_destructor<T: ?Sized>(&self, resource: &Arc<T>) -> Result<Completion<TrackerError>> {
        self.registry.completion_for(resource).map_err(|err| {
            debug!(error = %err, "Destructor query failed");
            err
        })
    }

    /// Give up `resource` and wait at most `timeout` for its destruction.
    ///
    /// The handle is dropped before waiting. If it was the last strong one,
    /// the next collection pass reclaims the resource.
    pub async fn wait_for_destruction<T: ?Sized>(
        &self,
        resource: Arc<T>,
        timeout: Duration,
    ) -> Result<()> {
        let completion = self.try_destructor(&resource)?;
        drop(resource);

        match tokio::time::timeout(timeout, completion).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Resource was not destroyed in time");
                Err(TrackerError::Timeout(timeout))
            }
        }
    }

    /// Ids whose destruction has not been reported yet, ascending.
    pub fn pending_ids(&self) -> Vec<LifecycleId> {
        self.registry.pending_ids()
    }

    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    /// Subscribe to tracker events. `None` when events are disabled.
    pub fn subscribe_events(&self) -> Option<EventStream> {
        self.events
            .as_ref()
            .map(|bus| EventStream::new(bus.subscribe()))
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Log a lifecycle transition at its severity, then broadcast it.
    fn announce(&self, event: TrackerEvent) {
        match event.severity() {
            EventSeverity::Warning => warn!(?event, "{}", event.description()),
            EventSeverity::Info => info!(?event, "{}", event.description()),
            EventSeverity::Debug => debug!(?event, "{}", event.description()),
        }
        if let Some(bus) = &self.events {
            let _ = bus.emit(event);
        }
    }
}

impl Drop for DestructorTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for DestructorTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestructorTracker")
            .field("running", &self.is_running())
            .field("pending", &self.registry.pending_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Create a tracker with the default configuration and start it.
pub fn track_destructors(host: Arc<dyn HostRuntime>) -> Result<DestructorTracker> {
    let tracker = DestructorTracker::new(host, TrackerConfig::default())?;
    tracker.start()?;
    Ok(tracker)
}
