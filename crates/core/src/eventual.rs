//! The dual-mode result.
//!
//! An [`Eventual`] is created either already settled (value mode) or wrapped
//! around an asynchronous source (promise mode). Either way it chains the
//! same: `then` derives a new result, `catch` observes failure, `sync` reads a
//! known outcome and `awaitable` waits for one.

use std::fmt;
use std::future::IntoFuture;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::debug;

use crate::chain::{AsyncSource, Chain, HandlerOutcome, apply};
use crate::deferred::Awaitable;
use crate::env::Env;
use crate::error::{Error, Failure};
use crate::result::{Outcome, OutcomeExt};
use crate::state::Shared;

/// How a result was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Settled at construction.
    Value,
    /// Wraps an asynchronous source.
    Promise,
}

/// Where a result is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Waiting for its source.
    Pending,
    /// Settled with a value.
    Fulfilled,
    /// Settled with a failure.
    Rejected,
}

impl State {
    /// Returns `true` if no longer pending.
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Fulfilled => f.write_str("fulfilled"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}

/// A value or failure that is known now or arrives later.
///
/// Clones are handles to the same result.
///
/// # Examples
///
/// ```
/// use eventual::{Failure, from_value};
///
/// let doubled = from_value(21).map(|x| x * 2);
/// assert_eq!(doubled.sync(), Ok(42));
///
/// let checked = doubled.then(|x| {
///     if x > 40 {
///         Err(Failure::msg("too large"))
///     } else {
///         Ok(x)
///     }
/// });
/// assert_eq!(checked.sync().unwrap_err().to_string(), "too large");
/// ```
pub struct Eventual<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Eventual<T>
where
    T: Clone + Send + 'static,
{
    /// A value-mode result holding `outcome`.
    pub(crate) fn settled(env: Env, outcome: Outcome<T>) -> Self {
        Self {
            shared: Arc::new(Shared::settled(env, outcome)),
        }
    }

    /// A promise-mode result driven by `source` on the env's executor.
    pub(crate) fn forward<S>(env: Env, source: S) -> Self
    where
        S: AsyncSource<Output = T>,
    {
        let shared = Arc::new(Shared::pending(env));
        let target = Arc::clone(&shared);
        let source = source.into_source();
        let task = async move {
            let outcome = match AssertUnwindSafe(source).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let error = Error::source_panicked(payload.as_ref());
                    debug!(error = %error, "Async source panicked");
                    Err(error.into())
                }
            };
            match outcome {
                Ok(value) => target.resolve(value),
                Err(failure) => target.reject(failure),
            };
        }
        .boxed();

        if let Err(error) = shared.env().spawn(task) {
            debug!(error = %error, "Could not start forwarding task");
            shared.reject(error.into());
        }

        Self { shared }
    }

    /// How this result was created.
    pub fn mode(&self) -> Mode {
        self.shared.mode()
    }

    /// Where this result is in its lifecycle.
    pub fn state(&self) -> State {
        self.shared.state()
    }

    /// Returns `true` once the outcome is known.
    pub fn is_settled(&self) -> bool {
        self.state().is_settled()
    }

    /// The env this result was created in.
    pub fn env(&self) -> &Env {
        self.shared.env()
    }

    pub(crate) fn snapshot(&self) -> Option<Outcome<T>> {
        self.shared.snapshot()
    }

    /// Read the outcome of a value-mode result.
    ///
    /// # Errors
    ///
    /// Returns the stored failure (the same object) if the result failed, or
    /// [`Error::UnsupportedSyncAccess`] for any promise-mode result, settled
    /// or not. The latter is a programming error: only results created
    /// settled can be read synchronously. Use [`awaitable`](Self::awaitable)
    /// for the rest.
    pub fn sync(&self) -> Outcome<T> {
        match (self.mode(), self.snapshot()) {
            (Mode::Value, Some(outcome)) => outcome,
            _ => Err(Error::UnsupportedSyncAccess.into()),
        }
    }

    /// A future of the outcome.
    ///
    /// Ready immediately if settled; otherwise it completes exactly once,
    /// when this result settles.
    pub fn awaitable(&self) -> Awaitable<T> {
        self.shared.subscribe()
    }

    /// Derive a new result from the value.
    ///
    /// `transform` runs only on success. A failure passes through unchanged
    /// and a panic inside `transform` becomes the new result's failure. See
    /// [`Chain`] for what `transform` may return.
    pub fn then<U, R, F>(&self, transform: F) -> Eventual<U>
    where
        U: Clone + Send + 'static,
        R: Chain<Output = U>,
        F: FnOnce(T) -> R + Send + 'static,
    {
        let env = self.env();
        match self.snapshot() {
            Some(Ok(value)) => apply(env, transform, value),
            Some(Err(failure)) => Eventual::settled(env.clone(), Err(failure)),
            None => {
                let upstream = self.awaitable();
                let downstream = env.clone();
                env.from_async_source(async move {
                    match upstream.await {
                        Ok(value) => apply(&downstream, transform, value).await,
                        Err(failure) => Err(failure),
                    }
                })
            }
        }
    }

    /// [`then`](Self::then) for transforms that cannot fail.
    pub fn map<U, F>(&self, transform: F) -> Eventual<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.then(move |value| Ok::<U, Failure>(transform(value)))
    }

    /// Observe failure.
    ///
    /// `handler` runs at most once, with the original failure: right away if
    /// this result already failed, later if it is pending and then fails,
    /// never if it succeeds. If `handler` returns `Err` or panics, the
    /// failure goes to the env's diagnostic sink.
    pub fn catch<H, F>(&self, handler: F)
    where
        H: HandlerOutcome,
        F: FnOnce(Failure) -> H + Send + 'static,
    {
        self.shared
            .on_failure(Box::new(move |failure| handler(failure).into_outcome()));
    }
}

impl<T> Clone for Eventual<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> IntoFuture for Eventual<T>
where
    T: Clone + Send + 'static,
{
    type Output = Outcome<T>;
    type IntoFuture = Awaitable<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.awaitable()
    }
}

impl<T> From<Outcome<T>> for Eventual<T>
where
    T: Clone + Send + 'static,
{
    fn from(outcome: Outcome<T>) -> Self {
        outcome.into_eventual()
    }
}

impl<T> fmt::Debug for Eventual<T>
where
    T: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Eventual")
            .field("mode", &self.mode())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::arithmetic_side_effects
)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::executor::block_on;

    use super::*;
    use crate::deferred::Deferred;

    async fn exploding_source() -> Outcome<i32> {
        panic!("source exploded")
    }

    #[test]
    fn test_sync_on_pending_is_unsupported() {
        let env = Env::default();
        let eventual = Eventual::<i32>::settled(env.clone(), Ok(0));
        assert_eq!(eventual.sync(), Ok(0));

        let pending = Eventual {
            shared: Arc::new(Shared::<i32>::pending(env)),
        };
        let failure = pending.sync().unwrap_err();
        assert_eq!(
            failure.downcast_ref::<Error>(),
            Some(&Error::UnsupportedSyncAccess)
        );
    }

    #[test]
    fn test_then_on_failure_skips_transform() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let boom = Failure::msg("boom");

        let derived = Env::default()
            .from_error::<i32>(boom.clone())
            .map(move |x| {
                counter.fetch_add(1, Ordering::SeqCst);
                x
            });

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(derived.sync().unwrap_err().ptr_eq(&boom));
    }

    #[test]
    fn test_forward_without_runtime_rejects() {
        let eventual = Env::default().from_async_source(async { Ok::<_, Failure>(1) });
        assert_eq!(eventual.mode(), Mode::Promise);
        assert_eq!(eventual.state(), State::Rejected);
        let failure = block_on(eventual.awaitable()).unwrap_err();
        assert!(matches!(
            failure.downcast_ref::<Error>(),
            Some(Error::SpawnRejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_then_on_pending_waits_for_upstream() {
        let env = Env::default();
        let (resolver, awaitable) = Deferred::new().into_parts();
        let upstream = env.from_async_source(awaitable);
        let derived = upstream.map(|x: i32| x * 10);

        assert_eq!(derived.mode(), Mode::Promise);
        assert_eq!(derived.state(), State::Pending);

        resolver.resolve(4);
        assert_eq!(derived.await, Ok(40));
        assert_eq!(upstream.await, Ok(4));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let env = Env::default();
        let (resolver, awaitable) = Deferred::new().into_parts();
        let original = env.from_async_source(awaitable);
        let clone = original.clone();

        resolver.resolve("shared");
        assert_eq!(original.await, Ok("shared"));
        assert_eq!(clone.state(), State::Fulfilled);
        assert_eq!(clone.await, Ok("shared"));
    }

    #[tokio::test]
    async fn test_sync_on_settled_promise_is_unsupported() {
        let env = Env::default();
        let (resolver, awaitable) = Deferred::new().into_parts();
        let eventual = env.from_async_source(awaitable);

        resolver.resolve(7);
        assert_eq!(eventual.awaitable().await, Ok(7));
        assert_eq!(eventual.state(), State::Fulfilled);

        let failure = eventual.sync().unwrap_err();
        assert_eq!(
            failure.downcast_ref::<Error>(),
            Some(&Error::UnsupportedSyncAccess)
        );
    }

    #[tokio::test]
    async fn test_panicking_source_rejects() {
        let eventual = Env::default().from_async_source(exploding_source());

        let failure = eventual.awaitable().await.unwrap_err();
        assert_eq!(
            failure.downcast_ref::<Error>(),
            Some(&Error::SourcePanicked {
                message: "source exploded".to_string()
            })
        );
        assert_eq!(eventual.state(), State::Rejected);
    }

    #[test]
    fn test_from_outcome() {
        let eventual: Eventual<u8> = Ok::<u8, Failure>(3).into();
        assert_eq!(eventual.mode(), Mode::Value);
        assert_eq!(eventual.sync(), Ok(3));
    }

    #[test]
    fn test_debug_and_display() {
        let eventual = Env::default().from_value(1);
        let text = format!("{eventual:?}");
        assert!(text.contains("Value"));
        assert!(text.contains("Fulfilled"));
        assert_eq!(State::Rejected.to_string(), "rejected");
        assert!(!State::Pending.is_settled());
    }
}
