//! Error types for eventual results.
//!
//! Crate-level failures are explicit and typed. User failures travel as a
//! shared [`Failure`] handle so every subscriber observes the same error object.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Result type alias for crate-level operations (configuration, spawning).
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for eventual operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Access errors
    #[error("synchronous access is not supported while the result is pending")]
    UnsupportedSyncAccess,

    #[error("awaitable polled after it already completed")]
    PolledAfterCompletion,

    // Completion errors
    #[error("deferred was dropped before it settled")]
    Abandoned,

    #[error("executor rejected the forwarding task: {reason}")]
    SpawnRejected { reason: String },

    #[error("async source panicked: {message}")]
    SourcePanicked { message: String },

    // Callback errors
    #[error("transform panicked: {message}")]
    TransformPanicked { message: String },

    #[error("failure callback panicked: {message}")]
    CallbackPanicked { message: String },

    // Configuration errors
    #[error("failed to read config '{path}': {reason}")]
    ConfigReadFailed { path: PathBuf, reason: String },

    #[error("config parse error: {reason}")]
    ConfigParseFailed { reason: String },

    // Generic errors
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Create a spawn rejected error.
    pub fn spawn_rejected(reason: impl Into<String>) -> Self {
        Self::SpawnRejected {
            reason: reason.into(),
        }
    }

    /// Create a source panicked error from a caught panic payload.
    pub fn source_panicked(payload: &(dyn Any + Send)) -> Self {
        Self::SourcePanicked {
            message: panic_message(payload),
        }
    }

    /// Create a transform panicked error from a caught panic payload.
    pub fn transform_panicked(payload: &(dyn Any + Send)) -> Self {
        Self::TransformPanicked {
            message: panic_message(payload),
        }
    }

    /// Create a callback panicked error from a caught panic payload.
    pub fn callback_panicked(payload: &(dyn Any + Send)) -> Self {
        Self::CallbackPanicked {
            message: panic_message(payload),
        }
    }

    /// Create a config read error.
    pub fn config_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ConfigReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a config parse error.
    pub fn config_parse_failed(reason: impl Into<String>) -> Self {
        Self::ConfigParseFailed {
            reason: reason.into(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// A shared, cloneable failure.
///
/// Clones point at the same error object, so a failure propagated through any
/// number of chained results is still the original one. Equality is identity:
/// two failures are equal only if they share the same allocation.
#[derive(Clone)]
pub struct Failure(Arc<dyn StdError + Send + Sync + 'static>);

impl Failure {
    /// Wrap an error.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// Create a failure carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Error::Message(message.into()))
    }

    /// Returns `true` if both handles refer to the same error object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }

    /// Attempt to view the underlying error as a concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Returns `true` if the underlying error is of type `E`.
    pub fn is<E>(&self) -> bool
    where
        E: StdError + 'static,
    {
        self.0.is::<E>()
    }

    /// Borrow the underlying error.
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.0
    }
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl AsRef<dyn StdError + Send + Sync + 'static> for Failure {
    fn as_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.as_error()
    }
}

impl PartialEq for Failure {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Failure {}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Failure").field(&self.0).finish()
    }
}
