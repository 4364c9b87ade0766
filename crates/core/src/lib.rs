//! Dual-mode results: chain on values that are known now or arrive later.
//!
//! An [`Eventual`] holds either an outcome that is already known (value mode)
//! or a reference to an asynchronous source that will produce one (promise
//! mode). Calling code chains on both the same way:
//!
//! - **Factories**: [`from_value`], [`from_error`], [`from_async_source`],
//!   [`deferred`] and [`run`]
//! - **Chaining**: [`Eventual::then`], [`Eventual::map`], [`Eventual::catch`]
//! - **Access**: [`Eventual::sync`] for known outcomes, [`Eventual::awaitable`]
//!   (or `.await`) for pending ones
//!
//! The free functions use [`Env::global`]. Build an [`Env`] to inject a custom
//! executor, diagnostic sink or [`Config`].
//!
//! # Example
//!
//! ```
//! use eventual::{Failure, deferred, from_async_source, from_value};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     // Known now
//!     assert_eq!(from_value(5).map(|x| x + 1).sync(), Ok(6));
//!
//!     // Known later
//!     let (resolver, awaitable) = deferred::<i32>().into_parts();
//!     let total = from_async_source(awaitable).then(|x| Ok::<_, Failure>(x * 3));
//!     resolver.resolve(7);
//!     assert_eq!(total.await, Ok(21));
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod chain;
pub mod config;
pub mod deferred;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod eventual;
pub mod result;
pub mod spawn;

mod state;

// Re-export main types
pub use chain::{AsyncSource, Chain, HandlerOutcome};
pub use config::{Config, DiagnosticsMode};
pub use deferred::{Awaitable, Deferred, Resolver};
pub use diagnostics::{
    CallbackFailure, CallbackOrigin, DiagnosticSink, MemorySink, SilentSink, TracingSink,
};
pub use env::{Env, EnvBuilder};
pub use error::{Error, Failure, Result};
pub use eventual::{Eventual, Mode, State};
pub use result::{Outcome, OutcomeExt};
pub use spawn::{Spawn, Task, TokioSpawner};

/// A settled, successful result holding `value`.
pub fn from_value<T>(value: T) -> Eventual<T>
where
    T: Clone + Send + 'static,
{
    Env::global().from_value(value)
}

/// A settled, failed result holding `error`.
pub fn from_error<T>(error: impl Into<Failure>) -> Eventual<T>
where
    T: Clone + Send + 'static,
{
    Env::global().from_error(error)
}

/// A pending result that settles when `source` does.
///
/// Needs a tokio runtime to drive `source`; without one the result is
/// rejected with [`Error::SpawnRejected`]. A panic inside `source` rejects
/// it with [`Error::SourcePanicked`].
pub fn from_async_source<S>(source: S) -> Eventual<S::Output>
where
    S: AsyncSource,
    S::Output: Clone + Send + 'static,
{
    Env::global().from_async_source(source)
}

/// An unsettled deferred.
pub fn deferred<T>() -> Deferred<T> {
    Deferred::new()
}

/// Start a chain from nothing: `from_value(()).then(initial)`.
pub fn run<U, R, F>(initial: F) -> Eventual<U>
where
    U: Clone + Send + 'static,
    R: Chain<Output = U>,
    F: FnOnce(()) -> R + Send + 'static,
{
    Env::global().run(initial)
}
