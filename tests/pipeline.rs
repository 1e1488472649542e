//! Dispatch behaviour of the middleware pipeline

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mixin_kit::middleware::{
    Catalog, Declared, DispatchError, Handler, JsonArgs, Layer, Next, Pipeline, RegistrationError,
    Role,
};
use serde_json::json;

/// Shared log of handler names, in invocation order
type Log = Arc<Mutex<Vec<String>>>;
type Args = (Log,);

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Handler that records its name and continues
fn step(name: &'static str) -> Handler<Args> {
    Handler::new(move |(log,): &Args, next| {
        log.lock().unwrap().push(name.to_string());
        next.call();
        Ok(())
    })
    .named(name)
}

/// Handler that records its name and reports a failure
fn failing(name: &'static str, message: &'static str) -> Handler<Args> {
    Handler::new(move |(log,): &Args, next| {
        log.lock().unwrap().push(name.to_string());
        next.fail(message);
        Ok(())
    })
    .named(name)
}

/// Error handler that records the failure message
fn recorder(name: &'static str) -> Handler<Args> {
    Handler::error(move |failure, (log,): &Args, _next| {
        log.lock().unwrap().push(format!("{name}: {failure}"));
        Ok(())
    })
    .named(name)
}

#[test]
fn test_handlers_run_once_in_registration_order() {
    for n in 1..=8 {
        let pipeline = Pipeline::new();
        let names: Vec<&'static str> = ["h1", "h2", "h3", "h4", "h5", "h6", "h7", "h8"][..n].to_vec();
        for name in &names {
            pipeline.use_handler(step(name));
        }

        let log = new_log();
        pipeline.handle((Arc::clone(&log),)).unwrap();
        assert_eq!(entries(&log), names);
    }
}

#[test]
fn test_counter_scenario() {
    type Ctx = (Arc<AtomicUsize>,);
    let increment = || {
        Handler::new(|(count,): &Ctx, next| {
            count.fetch_add(1, Ordering::SeqCst);
            next.call();
            Ok(())
        })
    };

    let pipeline: Pipeline<Ctx> = Pipeline::new();
    pipeline
        .use_layers(vec![
            Layer::Stack(vec![Layer::Handler(increment()), Layer::Handler(increment())]),
            Layer::Handler(increment()),
        ])
        .unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    pipeline.handle((Arc::clone(&count),)).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

#[test]
fn test_empty_registration_fails() {
    let pipeline: Pipeline<Args> = Pipeline::new();

    let err = pipeline.use_layers(Vec::<Handler<Args>>::new()).unwrap_err();
    assert!(matches!(err, RegistrationError::Empty));
    assert_eq!(err.to_string(), "use requires at least one middleware handler");
}

#[test]
fn test_non_callable_registration_fails() {
    let catalog = Catalog::<JsonArgs>::with_defaults();
    let pipeline = Pipeline::new();

    let err = pipeline.use_values(&catalog, &[json!(42)]).unwrap_err();
    assert!(matches!(err, RegistrationError::NotCallable { found: "number" }));

    // a bad entry anywhere rejects the whole call
    let err = pipeline
        .use_values(&catalog, &[json!("count"), json!(["trace", 42])])
        .unwrap_err();
    assert!(matches!(err, RegistrationError::NotCallable { .. }));
    assert!(pipeline.is_empty());
}

#[test]
fn test_unrouted_failure_is_returned_to_caller() {
    let pipeline = Pipeline::new();
    let h1_next: Arc<Mutex<Option<Next>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&h1_next);

    pipeline
        .use_handler(
            Handler::new(move |(log,): &Args, next| {
                log.lock().unwrap().push("h1".to_string());
                *slot.lock().unwrap() = Some(next.clone());
                next.call();
                Ok(())
            })
            .named("h1"),
        )
        .use_handler(failing("h2", "h2 failed"))
        .use_handler(step("h3"));

    let log = new_log();
    let err = pipeline.handle((Arc::clone(&log),)).unwrap_err();
    assert!(matches!(err, DispatchError::Unrouted(_)));
    assert_eq!(err.to_string(), "h2 failed");
    assert_eq!(entries(&log), vec!["h1", "h2"]);

    // h1's continuation has no further effect
    let next = h1_next.lock().unwrap().take().unwrap();
    assert!(next.is_fired());
    next.call();
    assert_eq!(entries(&log), vec!["h1", "h2"]);
}

#[test]
fn test_single_failing_handler_scenario() {
    let pipeline = Pipeline::new();
    pipeline.use_fn(|_: &Args, next| {
        next.fail("x");
        Ok(())
    });

    let err = pipeline.handle((new_log(),)).unwrap_err();
    assert_eq!(err.to_string(), "x");
}

#[test]
fn test_returned_error_is_routed_like_reported_failure() {
    let pipeline = Pipeline::new();
    pipeline
        .use_handler(step("h1"))
        .use_fn(|_: &Args, _next| Err("testing".into()))
        .use_handler(step("h3"));

    let log = new_log();
    let err = pipeline.handle((Arc::clone(&log),)).unwrap_err();
    assert_eq!(err.to_string(), "testing");
    assert_eq!(entries(&log), vec!["h1"]);
}

#[test]
fn test_error_handler_receives_failure_and_context() {
    let pipeline = Pipeline::new();
    pipeline
        .use_handler(step("h1"))
        .use_handler(recorder("errH"))
        .use_handler(failing("h2", "status 407"))
        .use_handler(step("h3"));

    let log = new_log();
    pipeline.handle((Arc::clone(&log),)).unwrap();

    assert_eq!(entries(&log), vec!["h1", "h2", "errH: status 407"]);
    assert_eq!(pipeline.metrics().snapshot().failures_recovered, 1);
}

#[test]
fn test_error_handler_keeps_typed_failure() {
    #[derive(Debug, thiserror::Error)]
    #[error("status {status}")]
    struct HttpFailure {
        status: u16,
    }

    let seen = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&seen);

    let pipeline: Pipeline<Args> = Pipeline::new();
    pipeline
        .use_error_fn(move |failure, _, _| {
            let http = failure.downcast_ref::<HttpFailure>().ok_or("unexpected failure type")?;
            observed.store(http.status as usize, Ordering::SeqCst);
            Ok(())
        })
        .use_fn(|_, next| {
            next.fail(HttpFailure { status: 407 });
            Ok(())
        });

    pipeline.handle((new_log(),)).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 407);
}

#[test]
fn test_failing_error_handler_propagates() {
    let pipeline: Pipeline<Args> = Pipeline::new();
    pipeline
        .use_error_fn(|failure, _, _| Err(format!("could not handle {failure}").into()))
        .use_handler(failing("h1", "boom"));

    let err = pipeline.handle((new_log(),)).unwrap_err();
    assert!(matches!(err, DispatchError::ErrorHandlerFailed(_)));
    assert_eq!(err.failure().to_string(), "could not handle boom");
    assert_eq!(pipeline.metrics().snapshot().failures_recovered, 0);
}

#[test]
fn test_registry_order_is_unchanged_by_dispatch() {
    let pipeline = Pipeline::new();
    pipeline
        .use_handler(step("h1"))
        .use_handler(recorder("errH"))
        .use_handler(failing("h2", "boom"));

    let before = pipeline.handlers();
    pipeline.handle((new_log(),)).unwrap();
    pipeline.handle((new_log(),)).unwrap();
    let after = pipeline.handlers();

    assert_eq!(before, after);
    assert_eq!(after[1].name, "errH");
    assert_eq!(after[1].declared, Declared::Tagged(Role::Error));
}

#[test]
fn test_continuation_fired_twice_has_one_effect() {
    let pipeline = Pipeline::new();
    pipeline
        .use_fn(|_: &Args, next| {
            next.call();
            next.call();
            next.clone().fail("late failure");
            Ok(())
        })
        .use_handler(step("h2"));

    let log = new_log();
    pipeline.handle((Arc::clone(&log),)).unwrap();

    assert_eq!(entries(&log), vec!["h2"]);
    assert_eq!(pipeline.metrics().snapshot().duplicate_continuations, 2);
}

#[test]
fn test_registration_during_dispatch_applies_to_next_dispatch() {
    let pipeline: Arc<Pipeline<Args>> = Arc::new(Pipeline::new());
    let registered = Arc::new(AtomicUsize::new(0));

    let inner = Arc::downgrade(&pipeline);
    let counter = Arc::clone(&registered);
    pipeline.use_fn(move |(log,): &Args, next| {
        log.lock().unwrap().push("h1".to_string());
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Some(pipeline) = inner.upgrade() {
                pipeline.use_handler(step("late"));
            }
        }
        next.call();
        Ok(())
    });

    let first = new_log();
    pipeline.handle((Arc::clone(&first),)).unwrap();
    assert_eq!(entries(&first), vec!["h1"]);

    let second = new_log();
    pipeline.handle((Arc::clone(&second),)).unwrap();
    assert_eq!(entries(&second), vec!["h1", "late"]);
}

#[test]
fn test_deferred_continuation_resumes_chain() {
    let parked: Arc<Mutex<Option<Next>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&parked);

    let pipeline = Pipeline::new();
    pipeline
        .use_handler(step("h1"))
        .use_fn(move |(log,): &Args, next| {
            log.lock().unwrap().push("wait".to_string());
            *slot.lock().unwrap() = Some(next);
            Ok(())
        })
        .use_handler(step("h3"));

    let log = new_log();
    pipeline.handle((Arc::clone(&log),)).unwrap();
    assert_eq!(entries(&log), vec!["h1", "wait"]);

    parked.lock().unwrap().take().unwrap().call();
    assert_eq!(entries(&log), vec!["h1", "wait", "h3"]);
}

#[test]
fn test_deferred_failure_goes_to_error_handler() {
    let parked: Arc<Mutex<Option<Next>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&parked);

    let pipeline = Pipeline::new();
    pipeline
        .use_handler(recorder("errH"))
        .use_fn(move |_: &Args, next| {
            *slot.lock().unwrap() = Some(next);
            Ok(())
        })
        .use_handler(step("h2"));

    let log = new_log();
    pipeline.handle((Arc::clone(&log),)).unwrap();

    parked.lock().unwrap().take().unwrap().fail("timed out");
    assert_eq!(entries(&log), vec!["errH: timed out"]);
}

#[test]
fn test_deferred_unrouted_failure_is_counted() {
    let parked: Arc<Mutex<Option<Next>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&parked);

    let pipeline: Pipeline<Args> = Pipeline::new();
    pipeline.use_fn(move |_, next| {
        *slot.lock().unwrap() = Some(next);
        Ok(())
    });

    pipeline.handle((new_log(),)).unwrap();
    parked.lock().unwrap().take().unwrap().fail("nobody listening");

    assert_eq!(pipeline.metrics().snapshot().failures_unrouted, 1);
}

#[tokio::test]
async fn test_continuation_fired_from_spawned_task() {
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    let done_tx = Arc::new(Mutex::new(Some(done_tx)));

    let pipeline = Pipeline::new();
    pipeline
        .use_fn(|(log,): &Args, next| {
            log.lock().unwrap().push("async".to_string());
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                next.call();
            });
            Ok(())
        })
        .use_fn(move |(log,): &Args, next| {
            log.lock().unwrap().push("after".to_string());
            if let Some(tx) = done_tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
            next.call();
            Ok(())
        });

    let log = new_log();
    pipeline.handle((Arc::clone(&log),)).unwrap();

    done_rx.await.unwrap();
    assert_eq!(entries(&log), vec!["async", "after"]);
}

#[test]
fn test_arity_shim_classifies_per_dispatch() {
    type Pair = (Log, Log);

    let pipeline: Pipeline<Pair> = Pipeline::new();
    // (err, a, b, next): error handler for two arguments
    pipeline
        .use_handler(Handler::<Pair>::with_arity(4, |inv| {
            let (log, _) = inv.args;
            let failure = inv.failure.map(|f| f.to_string()).unwrap_or_default();
            log.lock().unwrap().push(format!("error handler: {failure}"));
            Ok(())
        }))
        .use_handler(Handler::<Pair>::with_arity(3, |inv| {
            let (log, _) = inv.args;
            log.lock().unwrap().push("normal".to_string());
            inv.next.fail("bad input");
            Ok(())
        }));

    let log = new_log();
    pipeline.handle((Arc::clone(&log), new_log())).unwrap();
    assert_eq!(entries(&log), vec!["normal", "error handler: bad input"]);
}

#[test]
fn test_only_first_error_handler_is_used() {
    let pipeline = Pipeline::new();
    pipeline
        .use_handler(recorder("first"))
        .use_handler(recorder("second"))
        .use_handler(failing("h1", "boom"));

    let log = new_log();
    pipeline.handle((Arc::clone(&log),)).unwrap();
    assert_eq!(entries(&log), vec!["h1", "first: boom"]);
}

#[test]
fn test_failures_do_not_leak_between_dispatches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let pipeline: Pipeline<Args> = Pipeline::new();
    pipeline.use_fn(move |_, next| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            next.fail("first only");
        } else {
            next.call();
        }
        Ok(())
    });

    assert!(pipeline.handle((new_log(),)).is_err());
    assert!(pipeline.handle((new_log(),)).is_ok());
    assert_eq!(pipeline.metrics().snapshot().dispatches, 2);
}

#[test]
fn test_err_returned_after_next_reaches_caller() {
    let pipeline = Pipeline::new();
    pipeline
        .use_fn(|(log,): &Args, next| {
            log.lock().unwrap().push("h1".to_string());
            next.call();
            Err("x".into())
        })
        .use_handler(step("h2"));

    let log = new_log();
    let err = pipeline.handle((Arc::clone(&log),)).unwrap_err();
    assert!(matches!(err, DispatchError::Unrouted(_)));
    assert_eq!(err.to_string(), "x");
    assert_eq!(entries(&log), vec!["h1", "h2"]);
}

#[test]
fn test_err_returned_after_next_goes_to_error_handler() {
    let pipeline = Pipeline::new();
    pipeline
        .use_handler(recorder("errH"))
        .use_fn(|_: &Args, next| {
            next.call();
            Err("late".into())
        })
        .use_handler(step("h2"));

    let log = new_log();
    pipeline.handle((Arc::clone(&log),)).unwrap();
    assert_eq!(entries(&log), vec!["h2", "errH: late"]);
}

#[test]
fn test_second_arity_error_handler_runs_as_normal_handler() {
    let pipeline: Pipeline<Args> = Pipeline::new();
    pipeline
        .use_handler(
            Handler::<Args>::with_arity(3, |inv| {
                let (log,) = inv.args;
                log.lock().unwrap().push("e1".to_string());
                Ok(())
            })
            .named("e1"),
        )
        .use_handler(
            Handler::<Args>::with_arity(3, |inv| {
                let (log,) = inv.args;
                let role = if inv.failure.is_some() { "error" } else { "normal" };
                log.lock().unwrap().push(format!("e2 as {role}"));
                inv.next.call();
                Ok(())
            })
            .named("e2"),
        );

    let log = new_log();
    pipeline.handle((Arc::clone(&log),)).unwrap();
    assert_eq!(entries(&log), vec!["e2 as normal"]);
}
