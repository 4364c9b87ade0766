//! End-to-end chaining tests.
//!
//! Tests verify that:
//! - Value-mode and promise-mode results chain the same way
//! - Failures short-circuit `then` and reach `catch` exactly once
//! - Subscribers registered before and after settling see the same outcome
//! - Callback failures are reported, never propagated

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use eventual::{
    CallbackOrigin, Config, Env, Error, Eventual, Failure, MemorySink, Mode, State, deferred,
    from_async_source, from_error, from_value, run,
};
use futures::FutureExt;
use parking_lot::Mutex;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn env_with_memory_sink() -> (Env, Arc<MemorySink>) {
    let sink = MemorySink::new_arc();
    let env = Env::builder()
        .config(Config::default().warn_on_redundant_settle(true))
        .sink(Arc::clone(&sink))
        .build();
    (env, sink)
}

// ==========================================================================
// SYNCHRONOUS SCENARIOS
// ==========================================================================

#[test]
fn plain_transform_on_value() {
    // GIVEN: a known value
    // WHEN: a plain transform is chained
    let result = from_value(5).map(|x| x + 1);

    // THEN: the new value is known synchronously
    assert_eq!(result.mode(), Mode::Value);
    assert_eq!(result.sync(), Ok(6));
}

#[test]
fn failure_short_circuits_then() {
    let boom = Failure::msg("boom");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let result = from_error::<i32>(boom.clone()).then(move |x| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, Failure>(x)
    });

    assert_eq!(calls.load(Ordering::SeqCst), 0, "transform must not run");
    let failure = result.sync().unwrap_err();
    assert!(failure.ptr_eq(&boom), "failure must be the original object");
}

#[test]
fn returned_failed_result_is_unwrapped_one_level() {
    let nope = Failure::msg("nope");
    let inner = nope.clone();

    let result = from_value(1).then(move |_| from_error::<i32>(inner));

    assert_eq!(result.mode(), Mode::Value);
    assert!(result.sync().unwrap_err().ptr_eq(&nope));
}

#[test]
fn returned_successful_result_is_unwrapped_one_level() {
    let result = from_value("outer").then(|s| from_value(s.len()));
    assert_eq!(result.sync(), Ok(5));
}

#[test]
fn transform_error_becomes_failure() {
    let result = from_value(2).then(|_| Err::<i32, _>(std::io::Error::other("disk gone")));

    let failure = result.sync().unwrap_err();
    assert!(failure.is::<std::io::Error>());
    assert_eq!(failure.to_string(), "disk gone");
}

#[test]
fn transform_panic_never_escapes_then() {
    let result: Eventual<i32> = from_value(3).map(|_| -> i32 { panic!("transform exploded") });

    let failure = result.sync().unwrap_err();
    assert_eq!(
        failure.downcast_ref::<Error>(),
        Some(&Error::TransformPanicked {
            message: "transform exploded".to_string()
        })
    );
}

#[test]
fn run_starts_a_chain_from_unit() {
    let result = run(|()| Ok::<_, Failure>(vec![1, 2, 3])).map(|v| v.iter().sum::<i32>());
    assert_eq!(result.sync(), Ok(6));
}

#[test]
fn run_catches_initial_panic() {
    let result = run(|()| -> Result<u8, Failure> { panic!("never started") });
    assert_eq!(result.state(), State::Rejected);
}

// ==========================================================================
// CATCH
// ==========================================================================

#[test]
fn catch_on_failed_result_runs_once_with_original_failure() {
    let (env, sink) = env_with_memory_sink();
    let boom = Failure::msg("boom");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);

    env.from_error::<i32>(boom.clone())
        .catch(move |failure| log.lock().push(failure));

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].ptr_eq(&boom));
    assert!(sink.is_empty());
}

#[test]
fn catch_on_successful_result_never_runs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    from_value(1).catch(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn panicking_catch_handler_is_reported_not_propagated() {
    // GIVEN: a failed result on an env with an in-memory sink
    let (env, sink) = env_with_memory_sink();
    let boom = Failure::msg("boom");

    // WHEN: the handler panics
    env.from_error::<i32>(boom.clone())
        .catch(|_| -> Result<(), Failure> { panic!("handler exploded") });

    // THEN: the caller is unaffected and the sink has one report
    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].origin, CallbackOrigin::Catch);
    assert!(reports[0].upstream.ptr_eq(&boom));
    assert_eq!(
        reports[0].cause.downcast_ref::<Error>(),
        Some(&Error::CallbackPanicked {
            message: "handler exploded".to_string()
        })
    );
}

#[test]
fn erroring_catch_handler_is_reported() {
    let (env, sink) = env_with_memory_sink();

    env.from_error::<i32>(Failure::msg("boom"))
        .catch(|_| Err::<(), _>(Failure::msg("could not log")));

    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].cause.to_string(), "could not log");
}

// ==========================================================================
// ASYNCHRONOUS SCENARIOS
// ==========================================================================

#[tokio::test]
async fn deferred_drives_async_source() {
    init_tracing();

    // GIVEN: a result wrapping a deferred's awaitable
    let (resolver, awaitable) = deferred::<i32>().into_parts();
    let result = from_async_source(awaitable);
    assert_eq!(result.mode(), Mode::Promise);
    assert_eq!(result.state(), State::Pending);

    // WHEN: the deferred is resolved
    resolver.resolve(7);

    // THEN: the result settles with the same value
    assert_eq!(result.awaitable().await, Ok(7));
    assert_eq!(result.state(), State::Fulfilled);
}

#[tokio::test]
async fn sync_on_settled_promise_result_is_unsupported() {
    // GIVEN: a promise-mode result that has already settled
    let (resolver, awaitable) = deferred::<i32>().into_parts();
    let result = from_async_source(awaitable);
    resolver.resolve(7);
    assert_eq!(result.awaitable().await, Ok(7));

    // WHEN: it is read synchronously
    let failure = result.sync().unwrap_err();

    // THEN: promise mode stays async-only
    assert_eq!(result.mode(), Mode::Promise);
    assert_eq!(
        failure.downcast_ref::<Error>(),
        Some(&Error::UnsupportedSyncAccess)
    );
}

#[tokio::test]
async fn sync_on_pending_result_is_unsupported() {
    let (resolver, awaitable) = deferred::<i32>().into_parts();
    let result = from_async_source(awaitable);

    let failure = result.sync().unwrap_err();
    assert_eq!(
        failure.downcast_ref::<Error>(),
        Some(&Error::UnsupportedSyncAccess)
    );

    resolver.resolve(1);
    assert_eq!(result.await, Ok(1));
}

#[tokio::test]
async fn pipeline_over_pending_result() {
    let (resolver, awaitable) = deferred::<u32>().into_parts();

    let result = from_async_source(awaitable)
        .map(|x| x + 1)
        .then(|x| from_value(x * 2))
        .then(|x| async move { Ok::<_, Failure>(x.to_string()) }.boxed());

    resolver.resolve(4);
    assert_eq!(result.await, Ok("10".to_string()));
}

#[tokio::test]
async fn transform_returning_async_source_goes_async() {
    let (resolver, awaitable) = deferred::<&str>().into_parts();

    let result = from_value(()).then(move |()| awaitable);
    assert_eq!(result.mode(), Mode::Promise);
    assert_eq!(result.state(), State::Pending);

    resolver.resolve("arrived");
    assert_eq!(result.await, Ok("arrived"));
}

#[tokio::test]
async fn transform_returning_pending_result_is_not_unwrapped_synchronously() {
    let (resolver, awaitable) = deferred::<i32>().into_parts();
    let pending = from_async_source(awaitable);

    let result = from_value(0).then(move |_| pending);
    assert_eq!(result.mode(), Mode::Promise);

    resolver.resolve(12);
    assert_eq!(result.await, Ok(12));
}

#[tokio::test]
async fn upstream_failure_propagates_through_pending_chain() {
    let (resolver, awaitable) = deferred::<i32>().into_parts();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let boom = Failure::msg("boom");

    let result = from_async_source(awaitable).map(move |x| {
        counter.fetch_add(1, Ordering::SeqCst);
        x
    });

    resolver.reject(boom.clone());

    let failure = result.await.unwrap_err();
    assert!(failure.ptr_eq(&boom));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn subscribers_before_and_after_settling_observe_once() {
    let (env, _) = env_with_memory_sink();
    let (resolver, awaitable) = env.deferred::<i32>().into_parts();
    let result = env.from_async_source(awaitable);

    // Registered while pending
    let early = result.awaitable();
    let early_derived = result.map(|x| x * 2);

    resolver.resolve(21);
    assert_eq!(early.await, Ok(21));

    // Registered after settling
    let late = result.awaitable();
    let late_derived = result.map(|x| x * 2);
    assert_eq!(late_derived.mode(), Mode::Value);

    assert_eq!(late.await, Ok(21));
    assert_eq!(early_derived.await, Ok(42));
    assert_eq!(late_derived.sync(), Ok(42));
}

#[tokio::test]
async fn resolution_is_idempotent() {
    let (resolver, awaitable) = deferred::<&str>().into_parts();
    let result = from_async_source(awaitable);
    let waiter = result.awaitable();

    assert!(resolver.resolve("a"));
    assert!(!resolver.resolve("b"));
    assert!(!resolver.reject(Failure::msg("e")));

    assert_eq!(waiter.await, Ok("a"));
    assert_eq!(result.state(), State::Fulfilled);
    assert_eq!(result.await, Ok("a"));
}

#[tokio::test]
async fn queued_catch_handlers_run_in_order_on_failure() {
    // GIVEN: three handlers queued on a pending result, the middle one panicking
    let (env, sink) = env_with_memory_sink();
    let (resolver, awaitable) = env.deferred::<i32>().into_parts();
    let result = env.from_async_source(awaitable);
    let order = Arc::new(Mutex::new(Vec::new()));

    let first = Arc::clone(&order);
    result.catch(move |_| first.lock().push(1));
    result.catch(|_| -> Result<(), Failure> { panic!("second handler exploded") });
    let third = Arc::clone(&order);
    result.catch(move |_| third.lock().push(3));

    // A final handler signals that fan-out has finished
    let (done, finished) = deferred::<()>().into_parts();
    result.catch(move |_| {
        done.resolve(());
    });

    // WHEN: the source fails
    resolver.reject(Failure::msg("boom"));
    finished.await.unwrap();

    // THEN: every handler ran once, in order, and the panic was reported
    assert_eq!(*order.lock(), vec![1, 3]);
    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].origin, CallbackOrigin::QueuedHook);
}

#[tokio::test]
async fn queued_catch_handlers_skip_on_success() {
    let (resolver, awaitable) = deferred::<i32>().into_parts();
    let result = from_async_source(awaitable);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    result.catch(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    resolver.resolve(5);
    assert_eq!(result.await, Ok(5));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

async fn exploding_source(message: &'static str) -> Result<i32, Failure> {
    panic!("{message}")
}

#[tokio::test]
async fn panicking_source_rejects_result() {
    // GIVEN: a source that panics, with a queued handler
    let (env, _) = env_with_memory_sink();
    let result = env.from_async_source(exploding_source("source exploded"));
    let (seen, observed) = deferred::<Failure>().into_parts();
    result.catch(move |failure| {
        seen.resolve(failure);
    });

    // WHEN: the source is driven
    let failure = tokio::time::timeout(Duration::from_secs(5), result.awaitable())
        .await
        .expect("result must settle")
        .unwrap_err();

    // THEN: the panic becomes the failure every subscriber sees
    let expected = Error::SourcePanicked {
        message: "source exploded".to_string(),
    };
    assert_eq!(failure.downcast_ref::<Error>(), Some(&expected));
    assert_eq!(result.state(), State::Rejected);
    assert!(observed.await.unwrap().ptr_eq(&failure));
}

#[tokio::test]
async fn transform_returning_panicking_future_rejects_result() {
    let result = from_value(()).then(|()| exploding_source("future exploded").boxed());
    assert_eq!(result.mode(), Mode::Promise);

    let failure = tokio::time::timeout(Duration::from_secs(5), result.awaitable())
        .await
        .expect("result must settle")
        .unwrap_err();

    assert_eq!(
        failure.downcast_ref::<Error>(),
        Some(&Error::SourcePanicked {
            message: "future exploded".to_string()
        })
    );
}

#[tokio::test]
async fn panicking_transform_on_pending_result_rejects() {
    let (resolver, awaitable) = deferred::<i32>().into_parts();
    let result = from_async_source(awaitable).map(|_| -> i32 { panic!("late transform exploded") });

    resolver.resolve(1);

    let failure = result.await.unwrap_err();
    assert_eq!(
        failure.downcast_ref::<Error>(),
        Some(&Error::TransformPanicked {
            message: "late transform exploded".to_string()
        })
    );
}

#[tokio::test]
async fn abandoned_deferred_rejects_result() {
    let (resolver, awaitable) = deferred::<i32>().into_parts();
    let result = from_async_source(awaitable);

    drop(resolver);

    let failure = result.await.unwrap_err();
    assert_eq!(failure.downcast_ref::<Error>(), Some(&Error::Abandoned));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resolves_from_another_thread() {
    let (resolver, awaitable) = deferred::<String>().into_parts();
    let result = from_async_source(awaitable).map(|s| s.to_uppercase());

    let producer = std::thread::spawn(move || resolver.resolve("threaded".to_string()));
    assert!(producer.join().unwrap());

    assert_eq!(result.await, Ok("THREADED".to_string()));
}
