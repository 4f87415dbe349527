use bridge_traits::{BridgeError, LifecycleId};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Unknown resource: no lifecycle id was recorded for it")]
    ResourceNotTracked,

    #[error("Unknown lifecycle id {0}: no pending destructor (already observed or never registered)")]
    IdNotPending(LifecycleId),

    #[error("Lifecycle id {0} was reported as created while its previous destructor is still pending")]
    DuplicateLifecycleId(LifecycleId),

    #[error("Destructor tracking is already running")]
    AlreadyRunning,

    #[error("No async runtime available: {0}")]
    RuntimeUnavailable(String),

    #[error("Timed out after {0:?} waiting for destructor")]
    Timeout(Duration),

    #[error("Host error: {0}")]
    Host(#[from] BridgeError),

    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
