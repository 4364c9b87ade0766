//! The shared cell behind every [`Eventual`](crate::Eventual).
//!
//! A cell is either `Pending`, holding its subscribers, or `Settled`, holding
//! only the outcome. Settling swaps one variant for the other, so the
//! subscriber lists are dropped by construction and nothing can register on a
//! settled cell.

use std::mem;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::deferred::{Awaitable, Deferred, Resolver};
use crate::diagnostics::{CallbackFailure, CallbackOrigin};
use crate::env::Env;
use crate::error::{Error, Failure};
use crate::eventual::{Mode, State};
use crate::result::Outcome;

/// A queued failure callback.
pub(crate) type FailureHook = Box<dyn FnOnce(Failure) -> Outcome<()> + Send>;

enum Slot<T> {
    Pending {
        waiters: Vec<Resolver<T>>,
        on_failure: Vec<FailureHook>,
    },
    Settled(Outcome<T>),
}

pub(crate) struct Shared<T> {
    mode: Mode,
    env: Env,
    slot: Mutex<Slot<T>>,
}

impl<T> Shared<T>
where
    T: Clone + Send + 'static,
{
    /// A value-mode cell, settled at construction.
    pub(crate) fn settled(env: Env, outcome: Outcome<T>) -> Self {
        Self {
            mode: Mode::Value,
            env,
            slot: Mutex::new(Slot::Settled(outcome)),
        }
    }

    /// A promise-mode cell waiting for its source.
    pub(crate) fn pending(env: Env) -> Self {
        Self {
            mode: Mode::Promise,
            env,
            slot: Mutex::new(Slot::Pending {
                waiters: Vec::new(),
                on_failure: Vec::new(),
            }),
        }
    }

    pub(crate) const fn mode(&self) -> Mode {
        self.mode
    }

    pub(crate) const fn env(&self) -> &Env {
        &self.env
    }

    pub(crate) fn state(&self) -> State {
        match &*self.slot.lock() {
            Slot::Pending { .. } => State::Pending,
            Slot::Settled(Ok(_)) => State::Fulfilled,
            Slot::Settled(Err(_)) => State::Rejected,
        }
    }

    /// A copy of the outcome, if settled.
    pub(crate) fn snapshot(&self) -> Option<Outcome<T>> {
        match &*self.slot.lock() {
            Slot::Pending { .. } => None,
            Slot::Settled(outcome) => Some(outcome.clone()),
        }
    }

    /// An awaitable that completes with this cell's outcome.
    pub(crate) fn subscribe(&self) -> Awaitable<T> {
        let mut slot = self.slot.lock();
        match &mut *slot {
            Slot::Pending { waiters, .. } => {
                let (resolver, awaitable) = Deferred::new().into_parts();
                waiters.push(resolver);
                trace!(waiters = waiters.len(), "Registered waiter on pending result");
                awaitable
            }
            Slot::Settled(outcome) => Awaitable::ready(outcome.clone()),
        }
    }

    /// Run `hook` on failure: queued while pending, immediately if already
    /// failed, never if succeeded.
    pub(crate) fn on_failure(&self, hook: FailureHook) {
        let failure = {
            let mut slot = self.slot.lock();
            match &mut *slot {
                Slot::Pending { on_failure, .. } => {
                    on_failure.push(hook);
                    trace!(hooks = on_failure.len(), "Queued failure hook on pending result");
                    return;
                }
                Slot::Settled(Ok(_)) => return,
                Slot::Settled(Err(failure)) => failure.clone(),
            }
        };
        run_hook(&self.env, CallbackOrigin::Catch, hook, &failure);
    }

    pub(crate) fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    pub(crate) fn reject(&self, failure: Failure) -> bool {
        self.settle(Err(failure))
    }

    /// Settle once and notify every subscriber in registration order.
    ///
    /// Returns `false` and changes nothing if already settled. Subscribers
    /// run after the lock is released, so they may touch this cell again.
    fn settle(&self, outcome: Outcome<T>) -> bool {
        let previous = {
            let mut slot = self.slot.lock();
            if matches!(&*slot, Slot::Settled(_)) {
                drop(slot);
                if self.env.config().warn_on_redundant_settle {
                    warn!(mode = ?self.mode, "Ignoring redundant settle on result");
                }
                return false;
            }
            mem::replace(&mut *slot, Slot::Settled(outcome.clone()))
        };

        let Slot::Pending {
            waiters,
            on_failure,
        } = previous
        else {
            return false;
        };

        debug!(
            mode = ?self.mode,
            fulfilled = outcome.is_ok(),
            waiters = waiters.len(),
            hooks = on_failure.len(),
            "Result settled"
        );

        for waiter in waiters {
            waiter.settle(outcome.clone());
        }

        if let Err(failure) = &outcome {
            for hook in on_failure {
                run_hook(&self.env, CallbackOrigin::QueuedHook, hook, failure);
            }
        }

        true
    }
}

/// Invoke a failure callback, routing its own failure to the env's sink.
fn run_hook(env: &Env, origin: CallbackOrigin, hook: FailureHook, failure: &Failure) {
    let upstream = failure.clone();
    let cause = match panic::catch_unwind(AssertUnwindSafe(move || hook(upstream))) {
        Ok(Ok(())) => return,
        Ok(Err(cause)) => cause,
        Err(payload) => Error::callback_panicked(payload.as_ref()).into(),
    };
    env.report(&CallbackFailure {
        origin,
        upstream: failure.clone(),
        cause,
    });
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use std::sync::Arc;

    use futures::executor::block_on;
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::config::Config;
    use crate::diagnostics::MemorySink;

    fn env_with_sink() -> (Env, Arc<MemorySink>) {
        let sink = MemorySink::new_arc();
        let env = Env::builder()
            .config(Config::default().warn_on_redundant_settle(true))
            .sink(Arc::clone(&sink))
            .build();
        (env, sink)
    }

    /// Buffer that collects formatted `tracing` output.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Settle a cell twice with the warning flag set to `warn`, returning
    /// the log output at warn level and above.
    fn redundant_settle_output(warn: bool) -> String {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let env = Env::builder()
                .config(Config::default().warn_on_redundant_settle(warn))
                .build();
            let shared = Shared::pending(env);
            assert!(shared.resolve(1));
            assert!(!shared.reject(Failure::msg("late")));
            assert_eq!(shared.snapshot(), Some(Ok(1)));
        });

        logs.contents()
    }

    fn recording_hook(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> FailureHook {
        let log = Arc::clone(log);
        Box::new(move |failure| {
            log.lock().push(format!("{tag}:{failure}"));
            Ok(())
        })
    }

    #[test]
    fn test_value_mode_starts_settled() {
        let (env, _) = env_with_sink();
        let shared = Shared::settled(env, Ok(1));
        assert_eq!(shared.mode(), Mode::Value);
        assert_eq!(shared.state(), State::Fulfilled);
        assert_eq!(shared.snapshot(), Some(Ok(1)));
    }

    #[test]
    fn test_settle_is_idempotent() {
        let (env, _) = env_with_sink();
        let shared = Shared::pending(env);
        let before = shared.subscribe();

        assert!(shared.resolve(1));
        assert!(!shared.resolve(2));
        assert!(!shared.reject(Failure::msg("late")));

        let after = shared.subscribe();
        assert_eq!(block_on(before), Ok(1));
        assert_eq!(block_on(after), Ok(1));
        assert_eq!(shared.state(), State::Fulfilled);
    }

    #[test]
    fn test_redundant_settle_warns_when_enabled() {
        let output = redundant_settle_output(true);
        assert!(
            output.contains("Ignoring redundant settle on result"),
            "expected a warning, got: {output}"
        );
        assert!(output.contains("WARN"));
    }

    #[test]
    fn test_redundant_settle_is_quiet_when_disabled() {
        let output = redundant_settle_output(false);
        assert!(
            !output.contains("Ignoring redundant settle"),
            "expected no warning, got: {output}"
        );
    }

    #[test]
    fn test_waiters_are_settled_once_on_reject() {
        let (env, _) = env_with_sink();
        let shared = Shared::<i32>::pending(env);
        let first = shared.subscribe();
        let second = shared.subscribe();
        let boom = Failure::msg("boom");

        assert!(shared.reject(boom.clone()));

        assert_eq!(block_on(first), Err(boom.clone()));
        assert_eq!(block_on(second), Err(boom));
    }

    #[test]
    fn test_hooks_run_in_registration_order_on_failure() {
        let (env, sink) = env_with_sink();
        let shared = Shared::<i32>::pending(env);
        let log = Arc::new(Mutex::new(Vec::new()));

        shared.on_failure(recording_hook(&log, "a"));
        shared.on_failure(recording_hook(&log, "b"));
        shared.on_failure(recording_hook(&log, "c"));
        assert!(log.lock().is_empty());

        shared.reject(Failure::msg("x"));

        assert_eq!(*log.lock(), vec!["a:x", "b:x", "c:x"]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_hooks_never_run_on_success() {
        let (env, _) = env_with_sink();
        let shared = Shared::pending(env);
        let log = Arc::new(Mutex::new(Vec::new()));

        shared.on_failure(recording_hook(&log, "queued"));
        shared.resolve(3);
        shared.on_failure(recording_hook(&log, "late"));

        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_failing_hook_does_not_stop_the_others() {
        let (env, sink) = env_with_sink();
        let shared = Shared::<i32>::pending(env);
        let log = Arc::new(Mutex::new(Vec::new()));

        shared.on_failure(Box::new(|_| -> Outcome<()> { panic!("first hook exploded") }));
        shared.on_failure(Box::new(|_| Err(Failure::msg("second hook refused"))));
        shared.on_failure(recording_hook(&log, "third"));

        shared.reject(Failure::msg("upstream"));

        assert_eq!(*log.lock(), vec!["third:upstream"]);
        let reports = sink.reports();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.origin == CallbackOrigin::QueuedHook));
        assert_eq!(
            reports[0].cause.downcast_ref::<Error>(),
            Some(&Error::CallbackPanicked {
                message: "first hook exploded".to_string()
            })
        );
        assert_eq!(reports[1].cause.to_string(), "second hook refused");
    }

    #[test]
    fn test_hook_on_failed_cell_runs_immediately() {
        let (env, sink) = env_with_sink();
        let boom = Failure::msg("boom");
        let shared = Shared::<i32>::settled(env, Err(boom.clone()));

        shared.on_failure(Box::new(|_| -> Outcome<()> { panic!("handler exploded") }));

        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].origin, CallbackOrigin::Catch);
        assert!(reports[0].upstream.ptr_eq(&boom));
    }

    #[test]
    fn test_hook_may_reenter_the_cell() {
        let (env, _) = env_with_sink();
        let shared = Arc::new(Shared::<i32>::pending(env));
        let observed = Arc::new(Mutex::new(None));

        let reentrant = Arc::clone(&shared);
        let slot = Arc::clone(&observed);
        shared.on_failure(Box::new(move |_| {
            *slot.lock() = Some(reentrant.state());
            Ok(())
        }));
        shared.reject(Failure::msg("boom"));

        assert_eq!(*observed.lock(), Some(State::Rejected));
    }
}
