//! Outcome type definition and extension traits.
//!
//! An [`Outcome`] is the terminal state of an [`Eventual`]: a value or the
//! [`Failure`] that prevented it.

use crate::env::Env;
use crate::error::Failure;
use crate::eventual::Eventual;

/// The settled state of an eventual result.
///
/// # Examples
///
/// ```
/// use eventual::{Failure, Outcome, OutcomeExt};
///
/// let parsed: Outcome<u16> = "8080".parse::<u16>().map_err(Failure::from);
/// let port = parsed.into_eventual().map(|port| port + 1);
/// assert_eq!(port.sync(), Ok(8081));
/// ```
pub type Outcome<T> = std::result::Result<T, Failure>;

/// Extension trait for outcomes.
pub trait OutcomeExt<T> {
    /// Lift into a settled, value-mode [`Eventual`] on the global env.
    fn into_eventual(self) -> Eventual<T>;

    /// Lift into a settled, value-mode [`Eventual`] on the given env.
    fn into_eventual_in(self, env: &Env) -> Eventual<T>;
}

impl<T> OutcomeExt<T> for Outcome<T>
where
    T: Clone + Send + 'static,
{
    fn into_eventual(self) -> Eventual<T> {
        self.into_eventual_in(Env::global())
    }

    fn into_eventual_in(self, env: &Env) -> Eventual<T> {
        Eventual::settled(env.clone(), self)
    }
}
