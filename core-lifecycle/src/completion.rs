//! One-shot completion signals.
//!
//! A [`Deferred`] is created unresolved and settled at most once, either
//! resolved or rejected. Any number of [`Completion`] views can be taken from
//! it and awaited; all of them observe the same outcome. A completion can also
//! be built already rejected, without a `Deferred` behind it, to report a
//! failed query through the same awaitable type.
//!
//! ```rust
//! use core_lifecycle::{CompletionState, Deferred};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let deferred: Deferred<String> = Deferred::new();
//! let completion = deferred.completion();
//! assert_eq!(completion.state(), CompletionState::Pending);
//!
//! assert!(deferred.resolve());
//! assert!(!deferred.resolve());
//! assert_eq!(completion.await, Ok(()));
//! # }
//! ```

use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::IntoFuture;
use tokio::sync::watch;

/// Observable state of a completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionState<E> {
    Pending,
    Resolved,
    Rejected(E),
}

impl<E> CompletionState<E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, CompletionState::Pending)
    }
}

/// Resolver side of a one-shot completion.
pub struct Deferred<E> {
    sender: watch::Sender<CompletionState<E>>,
}

impl<E> Deferred<E>
where
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (sender, _) = watch::channel(CompletionState::Pending);
        Self { sender }
    }

    /// A new awaitable view of this completion.
    pub fn completion(&self) -> Completion<E> {
        Completion {
            receiver: self.sender.subscribe(),
        }
    }

    /// Resolve. Returns `false` if already settled.
    pub fn resolve(&self) -> bool {
        self.settle(CompletionState::Resolved)
    }

    /// Reject with `reason`. Returns `false` if already settled.
    pub fn reject(&self, reason: E) -> bool {
        self.settle(CompletionState::Rejected(reason))
    }

    pub fn is_settled(&self) -> bool {
        !self.sender.borrow().is_pending()
    }

    fn settle(&self, outcome: CompletionState<E>) -> bool {
        self.sender.send_if_modified(|state| {
            if state.is_pending() {
                *state = outcome;
                true
            } else {
                false
            }
        })
    }
}

impl<E> Default for Deferred<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E: fmt::Debug> fmt::Debug for Deferred<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("state", &*self.sender.borrow())
            .finish()
    }
}

/// Awaitable view of a one-shot completion.
///
/// Awaiting yields `Ok(())` once resolved and `Err(reason)` once rejected.
/// If every [`Deferred`] behind it is dropped while still pending, the
/// completion never settles.
#[derive(Clone)]
pub struct Completion<E> {
    receiver: watch::Receiver<CompletionState<E>>,
}

impl<E> Completion<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// A completion that is already rejected with `reason`.
    pub fn rejected(reason: E) -> Self {
        let (_, receiver) = watch::channel(CompletionState::Rejected(reason));
        Self { receiver }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> CompletionState<E> {
        self.receiver.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.receiver.borrow().is_pending()
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.receiver.borrow(), CompletionState::Resolved)
    }

    /// Wait for the outcome.
    pub async fn wait(mut self) -> Result<(), E> {
        let settled = self
            .receiver
            .wait_for(|state| !state.is_pending())
            .await
            .map(|state| state.clone());

        match settled {
            Ok(CompletionState::Resolved) => Ok(()),
            Ok(CompletionState::Rejected(reason)) => Err(reason),
            // Resolver dropped without settling.
            Ok(CompletionState::Pending) | Err(_) => futures::future::pending().await,
        }
    }
}

impl<E> IntoFuture for Completion<E>
where
    E: Clone + Send + Sync + 'static,
{
    type Output = Result<(), E>;
    type IntoFuture = BoxFuture<'static, Result<(), E>>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait().boxed()
    }
}

impl<E: fmt::Debug> fmt::Debug for Completion<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("state", &*self.receiver.borrow())
            .finish()
    }
}
