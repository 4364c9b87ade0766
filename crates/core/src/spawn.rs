//! Seam to the host executor.
//!
//! Results never schedule work themselves. A promise-mode result hands one
//! forwarding task to a [`Spawn`] implementation, which drives the wrapped
//! source to completion.

use futures::future::BoxFuture;
use tokio::runtime::Handle;

use crate::error::{Error, Result};

/// A detached unit of work.
pub type Task = BoxFuture<'static, ()>;

/// Trait for executors that can run detached tasks.
pub trait Spawn: Send + Sync {
    /// Start `task` in the background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpawnRejected`] if the executor cannot accept work.
    fn spawn(&self, task: Task) -> Result<()>;
}

/// Spawns onto whichever tokio runtime is current at call time.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSpawner;

impl Spawn for TokioSpawner {
    fn spawn(&self, task: Task) -> Result<()> {
        let handle = Handle::try_current().map_err(|e| Error::spawn_rejected(e.to_string()))?;
        handle.spawn(task);
        Ok(())
    }
}

impl Spawn for Handle {
    fn spawn(&self, task: Task) -> Result<()> {
        Self::spawn(self, task);
        Ok(())
    }
}
