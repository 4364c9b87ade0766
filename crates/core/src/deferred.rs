//! Manually completable handles.
//!
//! A [`Deferred`] pairs a [`Resolver`] (the resolve/reject actions) with an
//! [`Awaitable`] that settles exactly once, with whatever the first action
//! delivered.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{Error, Failure};
use crate::result::Outcome;

/// A resolve/reject pair plus the awaitable they complete.
#[derive(Debug)]
pub struct Deferred<T> {
    resolver: Resolver<T>,
    awaitable: Awaitable<T>,
}

impl<T> Deferred<T> {
    /// Create an unsettled deferred.
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            resolver: Resolver {
                sender: Arc::new(Mutex::new(Some(sender))),
            },
            awaitable: Awaitable {
                state: AwaitableState::Waiting(receiver),
            },
        }
    }

    /// Settle successfully. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.resolver.resolve(value)
    }

    /// Settle with a failure. Returns `false` if already settled.
    pub fn reject(&self, error: impl Into<Failure>) -> bool {
        self.resolver.reject(error)
    }

    /// Another handle to the resolve/reject actions.
    pub fn resolver(&self) -> Resolver<T> {
        self.resolver.clone()
    }

    /// Give up the actions and keep only the awaitable.
    pub fn into_awaitable(self) -> Awaitable<T> {
        self.awaitable
    }

    /// Split into the actions and the awaitable.
    pub fn into_parts(self) -> (Resolver<T>, Awaitable<T>) {
        (self.resolver, self.awaitable)
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The resolve/reject actions of a [`Deferred`].
///
/// Clones share the same completion: whichever clone acts first wins.
/// Dropping every clone without acting settles the awaitable with
/// [`Error::Abandoned`].
pub struct Resolver<T> {
    sender: Arc<Mutex<Option<oneshot::Sender<Outcome<T>>>>>,
}

impl<T> Resolver<T> {
    /// Settle successfully. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with a failure. Returns `false` if already settled.
    pub fn reject(&self, error: impl Into<Failure>) -> bool {
        self.settle(Err(error.into()))
    }

    /// Settle with an outcome. Returns `false` if already settled.
    pub fn settle(&self, outcome: Outcome<T>) -> bool {
        let Some(sender) = self.sender.lock().take() else {
            tracing::trace!("Ignoring redundant settle on deferred");
            return false;
        };
        if sender.send(outcome).is_err() {
            tracing::trace!("Deferred settled after its awaitable was dropped");
        }
        true
    }

    /// Returns `true` once either action has been taken.
    pub fn is_settled(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T> std::fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// A future that completes once with an [`Outcome`].
pub struct Awaitable<T> {
    state: AwaitableState<T>,
}

enum AwaitableState<T> {
    Ready(Option<Outcome<T>>),
    Waiting(oneshot::Receiver<Outcome<T>>),
}

impl<T> Awaitable<T> {
    /// An awaitable that is already complete.
    pub fn ready(outcome: Outcome<T>) -> Self {
        Self {
            state: AwaitableState::Ready(Some(outcome)),
        }
    }
}

// Unpin for every `T`: the outcome is moved out by value, never pinned.
impl<T> Unpin for Awaitable<T> {}

impl<T> Future for Awaitable<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            AwaitableState::Ready(outcome) => Poll::Ready(
                outcome
                    .take()
                    .unwrap_or_else(|| Err(Error::PolledAfterCompletion.into())),
            ),
            AwaitableState::Waiting(receiver) => receiver
                .poll_unpin(cx)
                .map(|received| received.unwrap_or_else(|_| Err(Error::Abandoned.into()))),
        }
    }
}

impl<T> std::fmt::Debug for Awaitable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            AwaitableState::Ready(Some(_)) => "ready",
            AwaitableState::Ready(None) => "consumed",
            AwaitableState::Waiting(_) => "waiting",
        };
        f.debug_struct("Awaitable").field("state", &state).finish()
    }
}
