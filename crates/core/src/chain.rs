//! Continuation capabilities.
//!
//! What may be wrapped as an asynchronous source, what a `then` transform may
//! return, and what a `catch` handler may return are all decided by trait
//! bounds at compile time.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::deferred::Awaitable;
use crate::env::Env;
use crate::error::{Error, Failure};
use crate::eventual::{Eventual, Mode};
use crate::result::Outcome;

/// Something that settles later with a value or a failure.
///
/// Implemented for every `Send` future yielding `Result<T, E>` where `E`
/// converts into a [`Failure`], which covers [`Awaitable`], and for
/// [`Eventual`] itself.
pub trait AsyncSource: Send + 'static {
    /// The success type.
    type Output;

    /// Erase into a boxed future of the outcome.
    fn into_source(self) -> BoxFuture<'static, Outcome<Self::Output>>;
}

impl<T, E, F> AsyncSource for F
where
    T: Send + 'static,
    E: Into<Failure>,
    F: Future<Output = std::result::Result<T, E>> + Send + 'static,
{
    type Output = T;

    fn into_source(self) -> BoxFuture<'static, Outcome<T>> {
        self.map(|result| result.map_err(Into::into)).boxed()
    }
}

impl<T> AsyncSource for Eventual<T>
where
    T: Clone + Send + 'static,
{
    type Output = T;

    fn into_source(self) -> BoxFuture<'static, Outcome<T>> {
        self.awaitable().boxed()
    }
}

/// What a `then` transform may return.
///
/// - `Result<U, E>`: the new result's terminal state.
/// - a settled value-mode [`Eventual<U>`]: unwrapped one level.
/// - anything asynchronous (a pending [`Eventual<U>`], an [`Awaitable<U>`]
///   or a boxed future): wrapped as a new asynchronous source.
pub trait Chain {
    /// The success type of the next result.
    type Output;

    /// Turn the transform's return value into the next result.
    fn into_next(self, env: &Env) -> Eventual<Self::Output>;
}

impl<U, E> Chain for std::result::Result<U, E>
where
    U: Clone + Send + 'static,
    E: Into<Failure>,
{
    type Output = U;

    fn into_next(self, env: &Env) -> Eventual<U> {
        Eventual::settled(env.clone(), self.map_err(Into::into))
    }
}

impl<U> Chain for Eventual<U>
where
    U: Clone + Send + 'static,
{
    type Output = U;

    fn into_next(self, env: &Env) -> Eventual<U> {
        match (self.mode(), self.snapshot()) {
            (Mode::Value, Some(outcome)) => Eventual::settled(env.clone(), outcome),
            _ => env.from_async_source(self),
        }
    }
}

impl<U> Chain for Awaitable<U>
where
    U: Clone + Send + 'static,
{
    type Output = U;

    fn into_next(self, env: &Env) -> Eventual<U> {
        env.from_async_source(self)
    }
}

impl<U, E> Chain for BoxFuture<'static, std::result::Result<U, E>>
where
    U: Clone + Send + 'static,
    E: Into<Failure> + 'static,
{
    type Output = U;

    fn into_next(self, env: &Env) -> Eventual<U> {
        env.from_async_source(self)
    }
}

/// What a `catch` handler may return.
pub trait HandlerOutcome {
    /// `Err` is reported to the diagnostic sink.
    fn into_outcome(self) -> Outcome<()>;
}

impl HandlerOutcome for () {
    fn into_outcome(self) -> Outcome<()> {
        Ok(())
    }
}

impl<E> HandlerOutcome for std::result::Result<(), E>
where
    E: Into<Failure>,
{
    fn into_outcome(self) -> Outcome<()> {
        self.map_err(Into::into)
    }
}

/// Run `transform` on a known value. A panic becomes the result's failure.
pub(crate) fn apply<T, U, R, F>(env: &Env, transform: F, value: T) -> Eventual<U>
where
    U: Clone + Send + 'static,
    R: Chain<Output = U>,
    F: FnOnce(T) -> R,
{
    match panic::catch_unwind(AssertUnwindSafe(move || transform(value))) {
        Ok(next) => next.into_next(env),
        Err(payload) => {
            let error = Error::transform_panicked(payload.as_ref());
            tracing::debug!(error = %error, "Transform panicked");
            Eventual::settled(env.clone(), Err(error.into()))
        }
    }
}
