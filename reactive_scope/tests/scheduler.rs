use any_spawner::Executor;
use reactive_scope::prelude::*;
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};
use tokio::task;

pub async fn tick() {
    tokio::time::sleep(std::time::Duration::from_micros(1)).await;
}

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

fn bump(counter: &Rc<Cell<usize>>) {
    counter.set(counter.get() + 1);
}

struct Harness {
    root: Scope,
    tasks: TaskQueue,
    failures: Rc<RefCell<Vec<ErrorSource>>>,
}

fn harness() -> Harness {
    let tasks = TaskQueue::new();
    let failures = Rc::new(RefCell::new(Vec::new()));
    let config = ScopeConfig::builder()
        .spawner(tasks.clone())
        .exception_handler({
            let failures = Rc::clone(&failures);
            move |_: &CallbackError, source: &ErrorSource| {
                failures.borrow_mut().push(source.clone())
            }
        })
        .build();
    Harness {
        root: Scope::new_root_with(config),
        tasks,
        failures,
    }
}

fn failure() -> CallbackError {
    "task failed".into()
}

#[test]
fn eval_async_runs_later_in_the_same_digest() {
    let Harness { root, .. } = harness();
    root.set("value", vec![1, 2, 3]);
    let evaluated = Rc::new(Cell::new(false));
    let evaluated_immediately = Rc::new(Cell::new(true));

    let _watch = root.watch(
        |scope: &Scope| scope.get("value"),
        {
            let evaluated = Rc::clone(&evaluated);
            let evaluated_immediately = Rc::clone(&evaluated_immediately);
            move |_: &Value, _: &Value, scope: &Scope| {
                let task_evaluated = Rc::clone(&evaluated);
                scope.eval_async(move |_: &Scope| task_evaluated.set(true));
                evaluated_immediately.set(evaluated.get());
            }
        },
        false,
    );

    root.digest().unwrap();
    assert!(evaluated.get());
    assert!(!evaluated_immediately.get());
}

#[test]
fn eval_async_task_receives_enqueuing_scope() {
    let Harness { root, .. } = harness();
    let child = root.new_scope();
    let seen = Rc::new(RefCell::new(None));

    child.eval_async({
        let seen = Rc::clone(&seen);
        move |scope: &Scope| *seen.borrow_mut() = Some(scope.clone())
    });
    root.digest().unwrap();

    assert_eq!(*seen.borrow(), Some(child));
}

#[test]
fn eval_async_schedules_a_digest_when_none_is_running() {
    let Harness { root, tasks, .. } = harness();
    let calls = counter();
    let _watch = root.watch(
        |scope: &Scope| scope.get("value"),
        {
            let calls = Rc::clone(&calls);
            move |_: &Value, _: &Value, _: &Scope| bump(&calls)
        },
        false,
    );

    root.eval_async(|scope: &Scope| scope.set("value", "set later"));
    assert_eq!(calls.get(), 0);

    tasks.run_pending();
    assert_eq!(root.get("value"), Value::from("set later"));
    assert_eq!(calls.get(), 1);
}

#[test]
fn deferred_digest_is_skipped_when_queue_was_already_drained() {
    let Harness { root, tasks, .. } = harness();
    let evaluations = counter();
    let _watch = root.watch_only({
        let evaluations = Rc::clone(&evaluations);
        move |_: &Scope| {
            bump(&evaluations);
            Value::Undefined
        }
    });

    root.eval_async(|_: &Scope| {});
    root.digest().unwrap();
    let after_digest = evaluations.get();

    tasks.run_pending();
    assert_eq!(evaluations.get(), after_digest);
}

#[test]
fn eval_async_from_watch_eventually_halts() {
    let Harness { root, .. } = harness();
    let _watch = root.watch_only(|scope: &Scope| {
        scope.eval_async(|_: &Scope| {});
        Value::from("value")
    });

    assert_eq!(
        root.digest(),
        Err(ScopeError::IterationsExceeded {
            ttl: DEFAULT_DIGEST_TTL
        })
    );
}

fn requeue(scope: &Scope) {
    scope.eval_async(requeue);
}

#[test]
fn self_requeueing_task_trips_the_ceiling() {
    let Harness { root, .. } = harness();
    root.eval_async(requeue);
    assert_eq!(
        root.digest(),
        Err(ScopeError::IterationsExceeded {
            ttl: DEFAULT_DIGEST_TTL
        })
    );
}

#[test]
fn eval_async_failures_are_isolated() {
    let Harness { root, failures, .. } = harness();
    let calls = counter();

    root.eval_async(|_: &Scope| Err::<(), _>(failure()));
    root.eval_async({
        let calls = Rc::clone(&calls);
        move |_: &Scope| bump(&calls)
    });
    root.digest().unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(*failures.borrow(), vec![ErrorSource::EvalAsync]);
}

#[test]
fn tasks_of_destroyed_scopes_are_dropped() {
    let Harness { root, .. } = harness();
    let child = root.new_scope();
    let calls = counter();

    child.eval_async({
        let calls = Rc::clone(&calls);
        move |_: &Scope| bump(&calls)
    });
    child.destroy();
    root.digest().unwrap();

    assert_eq!(calls.get(), 0);
}

#[test]
fn apply_async_does_not_run_synchronously() {
    let Harness { root, tasks, .. } = harness();
    root.apply_async(|scope: &Scope| scope.set("value", 1));
    assert!(root.get("value").is_undefined());

    tasks.run_pending();
    assert_eq!(root.get("value"), Value::from(1));
}

#[test]
fn apply_async_calls_share_one_digest() {
    let Harness { root, tasks, .. } = harness();
    let evaluations = counter();
    let _watch = root.watch_only({
        let evaluations = Rc::clone(&evaluations);
        move |scope: &Scope| {
            bump(&evaluations);
            scope.get("value")
        }
    });

    root.apply_async(|scope: &Scope| scope.set("value", "abc"));
    root.apply_async(|scope: &Scope| scope.set("value", "def"));
    tasks.run_pending();

    assert_eq!(evaluations.get(), 2);
    assert_eq!(root.get("value"), Value::from("def"));
}

#[test]
fn digest_runs_pending_apply_async_and_cancels_flush() {
    let Harness { root, tasks, .. } = harness();
    let evaluations = counter();
    let _watch = root.watch_only({
        let evaluations = Rc::clone(&evaluations);
        move |scope: &Scope| {
            bump(&evaluations);
            scope.get("value")
        }
    });

    root.apply_async(|scope: &Scope| scope.set("value", "abc"));
    root.apply_async(|scope: &Scope| scope.set("other", "def"));
    root.digest().unwrap();

    assert_eq!(evaluations.get(), 2);
    assert_eq!(root.get("value"), Value::from("abc"));
    assert_eq!(root.get("other"), Value::from("def"));

    tasks.run_pending();
    assert_eq!(evaluations.get(), 2);
}

#[test]
fn apply_async_failures_are_isolated() {
    let Harness { root, tasks, failures } = harness();

    root.apply_async(|_: &Scope| Err::<(), _>(failure()));
    root.apply_async(|scope: &Scope| scope.set("value", true));
    tasks.run_pending();

    assert_eq!(root.get("value"), Value::Bool(true));
    assert_eq!(*failures.borrow(), vec![ErrorSource::ApplyAsync]);
}

#[test]
fn deferred_digest_failure_is_reported() {
    let Harness {
        root,
        tasks,
        failures,
    } = harness();
    let _unstable = root.watch_only({
        let evaluations = counter();
        move |_: &Scope| {
            bump(&evaluations);
            Value::from(evaluations.get())
        }
    });

    root.eval_async(|_: &Scope| {});
    tasks.run_pending();

    assert_eq!(*failures.borrow(), vec![ErrorSource::DeferredDigest]);
    assert_eq!(root.phase(), None);
}

#[tokio::test]
async fn eval_async_runs_on_global_executor() {
    _ = Executor::init_tokio();

    task::LocalSet::new()
        .run_until(async {
            let root = Scope::new_root();
            let calls = counter();
            let _watch = root.watch(
                |scope: &Scope| scope.get("ready"),
                {
                    let calls = Rc::clone(&calls);
                    move |_: &Value, _: &Value, _: &Scope| bump(&calls)
                },
                false,
            );

            root.eval_async(|scope: &Scope| scope.set("ready", true));
            assert_eq!(calls.get(), 0);

            tick().await;
            assert_eq!(root.get("ready"), Value::Bool(true));
            assert_eq!(calls.get(), 1);
        })
        .await;
}

#[tokio::test]
async fn apply_async_flushes_on_global_executor() {
    _ = Executor::init_tokio();

    task::LocalSet::new()
        .run_until(async {
            let root = Scope::new_root();
            root.apply_async(|scope: &Scope| scope.set("first", 1));
            root.apply_async(|scope: &Scope| scope.set("second", 2));
            assert!(root.get("first").is_undefined());

            tick().await;
            assert_eq!(root.get("first"), Value::from(1));
            assert_eq!(root.get("second"), Value::from(2));
        })
        .await;
}

#[test]
fn task_queue_runs_spawned_futures() {
    let tasks = TaskQueue::new();
    let ran = Rc::new(Cell::new(false));
    tasks.spawn_local(Box::pin({
        let ran = Rc::clone(&ran);
        async move { ran.set(true) }
    }));
    assert!(!ran.get());
    tasks.run_pending();
    assert!(ran.get());
}
