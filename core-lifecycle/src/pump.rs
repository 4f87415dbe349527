//! Periodic collection requests.
//!
//! Hosts only report destruction as a side effect of reclaiming memory. The
//! pump asks the host's collector for a pass on a fixed period so pending
//! destructor signals settle promptly instead of "eventually".

use bridge_traits::GarbageCollector;
use core_runtime::events::{EventBus, TrackerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Result, TrackerError};

/// Background task issuing collection requests until stopped.
///
/// Dropping the pump stops it.
#[derive(Debug)]
pub struct CollectionPump {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl CollectionPump {
    /// Start requesting a collection every `period` on the current tokio runtime.
    ///
    /// Passes that reclaim something are announced on `events` when given.
    ///
    /// # Errors
    ///
    /// [`TrackerError::RuntimeUnavailable`] when called outside a tokio runtime.
    pub fn spawn(
        collector: Arc<dyn GarbageCollector>,
        period: Duration,
        events: Option<EventBus>,
    ) -> Result<Self> {
        let runtime =
            Handle::try_current().map_err(|e| TrackerError::RuntimeUnavailable(e.to_string()))?;

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(run_pump(collector, period, cancel.clone(), events));

        Ok(Self { cancel, handle })
    }

    /// Halt the pump. Returns `false` if it was already stopped.
    pub fn stop(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.cancel.cancel();
        true
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for CollectionPump {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_pump(
    collector: Arc<dyn GarbageCollector>,
    period: Duration,
    cancel: CancellationToken,
    events: Option<EventBus>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(period_ms = period.as_millis() as u64, "Collection pump started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => match collector.collect() {
                Ok(0) => {}
                Ok(reclaimed) => {
                    trace!(reclaimed, "Collection pass reclaimed resources");
                    if let Some(bus) = &events {
                        // No subscribers is fine.
                        let _ = bus.emit(TrackerEvent::CollectionCompleted { reclaimed });
                    }
                }
                Err(error) => warn!(error = %error, "Collection request failed"),
            },
        }
    }

    debug!("Collection pump stopped");
}
