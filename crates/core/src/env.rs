//! Execution environment shared by a family of results.
//!
//! An [`Env`] bundles the executor seam, the diagnostic sink and the
//! [`Config`]. Every result remembers the env it was created in, and results
//! derived through `then` inherit it.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::chain::{AsyncSource, Chain};
use crate::config::Config;
use crate::deferred::Deferred;
use crate::diagnostics::{CallbackFailure, DiagnosticSink, sink_for};
use crate::error::{Failure, Result};
use crate::eventual::Eventual;
use crate::spawn::{Spawn, Task, TokioSpawner};

static GLOBAL: OnceLock<Env> = OnceLock::new();

/// Spawner, diagnostic sink and configuration for a family of results.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct Env {
    inner: Arc<EnvInner>,
}

struct EnvInner {
    spawner: Arc<dyn Spawn>,
    sink: Arc<dyn DiagnosticSink>,
    config: Config,
}

impl Env {
    /// Create an env that spawns on the current tokio runtime and reports to
    /// the sink selected by `config.diagnostics`.
    pub fn new(config: Config) -> Self {
        Self::builder().config(config).build()
    }

    /// Start building an env with custom parts.
    pub fn builder() -> EnvBuilder {
        EnvBuilder::default()
    }

    /// The process-wide env used by the free factory functions.
    ///
    /// Configured from the environment on first use.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| Self::new(Config::from_env()))
    }

    /// The configuration of this env.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn spawn(&self, task: Task) -> Result<()> {
        self.inner.spawner.spawn(task)
    }

    pub(crate) fn report(&self, failure: &CallbackFailure) {
        self.inner.sink.report(failure);
    }

    /// A settled, successful result holding `value`.
    pub fn from_value<T>(&self, value: T) -> Eventual<T>
    where
        T: Clone + Send + 'static,
    {
        Eventual::settled(self.clone(), Ok(value))
    }

    /// A settled, failed result holding `error`.
    pub fn from_error<T>(&self, error: impl Into<Failure>) -> Eventual<T>
    where
        T: Clone + Send + 'static,
    {
        Eventual::settled(self.clone(), Err(error.into()))
    }

    /// A pending result that settles when `source` does.
    ///
    /// If the executor refuses the forwarding task, the result is rejected
    /// with [`Error::SpawnRejected`](crate::Error::SpawnRejected). A panic
    /// inside `source` rejects it with
    /// [`Error::SourcePanicked`](crate::Error::SourcePanicked).
    pub fn from_async_source<S>(&self, source: S) -> Eventual<S::Output>
    where
        S: AsyncSource,
        S::Output: Clone + Send + 'static,
    {
        Eventual::forward(self.clone(), source)
    }

    /// An unsettled deferred.
    ///
    /// Same as the free [`deferred`](crate::deferred) and kept alongside the
    /// other factories. A deferred carries no env; the result that wraps its
    /// awaitable through [`from_async_source`](Self::from_async_source)
    /// decides which env drives it.
    #[allow(clippy::unused_self)]
    pub fn deferred<T>(&self) -> Deferred<T> {
        Deferred::new()
    }

    /// Start a chain from nothing: `from_value(()).then(initial)`.
    pub fn run<U, R, F>(&self, initial: F) -> Eventual<U>
    where
        U: Clone + Send + 'static,
        R: Chain<Output = U>,
        F: FnOnce(()) -> R + Send + 'static,
    {
        self.from_value(()).then(initial)
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Env`].
#[derive(Default)]
pub struct EnvBuilder {
    spawner: Option<Arc<dyn Spawn>>,
    sink: Option<Arc<dyn DiagnosticSink>>,
    config: Config,
}

impl EnvBuilder {
    /// Use a custom executor.
    #[must_use]
    pub fn spawner(mut self, spawner: impl Spawn + 'static) -> Self {
        self.spawner = Some(Arc::new(spawner));
        self
    }

    /// Use a custom diagnostic sink instead of the configured default.
    #[must_use]
    pub fn sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Build the env.
    pub fn build(self) -> Env {
        let sink = self
            .sink
            .unwrap_or_else(|| sink_for(self.config.diagnostics));
        let spawner = self
            .spawner
            .unwrap_or_else(|| Arc::new(TokioSpawner) as Arc<dyn Spawn>);
        Env {
            inner: Arc::new(EnvInner {
                spawner,
                sink,
                config: self.config,
            }),
        }
    }
}
