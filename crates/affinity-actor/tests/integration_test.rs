use affinity_actor::mock::{MockError, MockResource, Probe};
use affinity_actor::{
    ActorOptions, AffinityActor, AffinityError, ShutdownMode, Violation, WorkerState,
};
use std::convert::Infallible;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

fn actor(name: &str) -> (AffinityActor<MockResource>, Arc<Probe>) {
    let probe = Probe::new(name);
    let actor = AffinityActor::new(format!("{name}.db"), probe.clone());
    (actor, probe)
}

fn values(actor: &AffinityActor<MockResource>) -> Vec<i64> {
    actor
        .invoke(|db: &mut MockResource| Ok::<_, Infallible>(db.values()))
        .unwrap()
}

// --- Lifecycle ---

#[test]
fn test_worker_starts_lazily_and_stops_once() {
    let (actor, probe) = actor("lazy");
    assert_eq!(actor.state(), WorkerState::NotStarted);
    assert_eq!(probe.opened(), 0);

    actor
        .invoke(|db: &mut MockResource| db.push(1))
        .unwrap();
    assert_eq!(actor.state(), WorkerState::Running);
    assert_eq!(probe.opened(), 1);

    actor.dispose();
    assert_eq!(actor.state(), WorkerState::Stopped);
    assert_eq!(probe.closed(), 1);

    // Disposal is idempotent.
    actor.dispose();
    actor.shutdown(ShutdownMode::Abandon);
    assert_eq!(probe.closed(), 1);
}

#[test]
fn test_every_item_runs_on_the_same_dedicated_thread() {
    let (actor, probe) = actor("affinity");
    let caller = thread::current().id();
    let owners: Vec<_> = (0..5)
        .map(|_| {
            actor
                .invoke(|db: &mut MockResource| {
                    Ok::<_, Infallible>((db.owner(), thread::current().id()))
                })
                .unwrap()
        })
        .collect();

    for (owner, running_on) in &owners {
        assert_eq!(owner, running_on);
        assert_eq!(*owner, owners[0].0);
        assert_ne!(*owner, caller);
    }
    assert_eq!(probe.threads(), vec![owners[0].0]);
}

#[test]
fn test_worker_thread_is_named_after_identity_or_options() {
    let (actor, _probe) = actor("named");
    let name = actor
        .invoke(|_: &mut MockResource| Ok::<_, Infallible>(thread::current().name().map(String::from)))
        .unwrap();
    assert_eq!(name.as_deref(), Some("affinity-named.db"));

    let probe = Probe::new("custom");
    let actor = AffinityActor::<MockResource>::with_options(
        "custom.db".to_string(),
        probe,
        ActorOptions::default().thread_name("db-writer"),
    );
    let name = actor
        .invoke(|_: &mut MockResource| Ok::<_, Infallible>(thread::current().name().map(String::from)))
        .unwrap();
    assert_eq!(name.as_deref(), Some("db-writer"));
}

#[test]
fn test_drain_shutdown_runs_everything_already_queued() {
    let (actor, probe) = actor("drain");
    for i in 0..100 {
        actor
            .begin_invoke(move |db: &mut MockResource| db.push(i))
            .unwrap();
    }
    actor.dispose();
    assert_eq!(probe.committed(), (0..100).collect::<Vec<i64>>());
    assert_eq!(probe.closed(), 1);
}

#[tokio::test]
async fn test_submissions_after_dispose_are_rejected() {
    let (actor, _probe) = actor("disposed");
    actor.dispose();

    let is_disposed =
        |e: AffinityError| matches!(e, AffinityError::ProtocolViolation(Violation::ActorDisposed));
    assert!(is_disposed(values_err(&actor)));
    assert!(is_disposed(
        actor
            .begin_invoke(|db: &mut MockResource| db.push(1))
            .unwrap_err()
    ));
    assert!(is_disposed(
        actor
            .invoke_async(|_| async { Ok::<_, Infallible>(()) })
            .await
            .unwrap_err()
    ));
}

fn values_err(actor: &AffinityActor<MockResource>) -> AffinityError {
    actor
        .invoke(|db: &mut MockResource| Ok::<_, Infallible>(db.values()))
        .unwrap_err()
}

#[tokio::test]
async fn test_abandon_cancels_all_undelivered_waiters() {
    let (actor, probe) = actor("abandon");
    let actor = Arc::new(actor);
    let (started_tx, started_rx) = mpsc::channel();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();

    // Park the worker so everything after this stays undelivered.
    actor
        .begin_invoke(move |_: &mut MockResource| {
            started_tx.send(()).unwrap();
            gate_rx.recv().unwrap();
            Ok::<_, Infallible>(())
        })
        .unwrap();
    started_rx.recv().unwrap();

    let waiters: Vec<_> = (0..50)
        .map(|i| actor.invoke_async(move |db| async move { db.with(|db| db.push(i)) }))
        .collect();
    assert_eq!(actor.pending(), 50);

    let disposer = {
        let actor = actor.clone();
        thread::spawn(move || actor.shutdown(ShutdownMode::Abandon))
    };

    for waiter in waiters {
        let err = waiter.await.unwrap_err();
        assert!(err.is_cancelled(), "expected Cancelled, got {err:?}");
    }

    gate_tx.send(()).unwrap();
    disposer.join().unwrap();
    assert_eq!(actor.state(), WorkerState::Stopped);
    assert!(probe.committed().is_empty());
    assert_eq!(probe.closed(), 1);
}

#[test]
fn test_abandon_releases_callers_blocked_in_invoke() {
    let (actor, probe) = actor("abandon-blocking");
    let actor = Arc::new(actor);
    let (started_tx, started_rx) = mpsc::channel();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();

    actor
        .begin_invoke(move |_: &mut MockResource| {
            started_tx.send(()).unwrap();
            gate_rx.recv().unwrap();
            Ok::<_, Infallible>(())
        })
        .unwrap();
    started_rx.recv().unwrap();

    let callers: Vec<_> = (0..8)
        .map(|i| {
            let actor = actor.clone();
            thread::spawn(move || actor.invoke(move |db: &mut MockResource| db.push(i)))
        })
        .collect();
    while actor.pending() < 8 {
        thread::sleep(Duration::from_millis(1));
    }

    let disposer = {
        let actor = actor.clone();
        thread::spawn(move || actor.shutdown(ShutdownMode::Abandon))
    };

    // Released while the worker is still parked, not when it finishes.
    for caller in callers {
        let err = caller.join().unwrap().unwrap_err();
        assert!(err.is_cancelled(), "expected Cancelled, got {err:?}");
    }

    gate_tx.send(()).unwrap();
    disposer.join().unwrap();
    assert_eq!(actor.state(), WorkerState::Stopped);
    assert!(probe.committed().is_empty());
}

// --- Invocation styles ---

#[test]
fn test_action_error_reaches_caller_and_worker_survives() {
    let (actor, _probe) = actor("errors");
    let err = actor
        .invoke(|db: &mut MockResource| db.reject("quota exceeded"))
        .unwrap_err();
    assert_eq!(
        err.action_error::<MockError>(),
        Some(&MockError::Rejected("quota exceeded".to_string()))
    );

    actor.invoke(|db: &mut MockResource| db.push(5)).unwrap();
    assert_eq!(values(&actor), vec![5]);
}

#[test]
fn test_panicking_action_is_reported_not_fatal() {
    let (actor, _probe) = actor("panics");
    let err = actor
        .invoke(|_: &mut MockResource| -> Result<(), Infallible> { panic!("corrupt page") })
        .unwrap_err();
    match err {
        AffinityError::Panicked(message) => assert_eq!(message, "corrupt page"),
        other => panic!("expected Panicked, got {other:?}"),
    }
    actor.invoke(|db: &mut MockResource| db.push(1)).unwrap();
    assert_eq!(values(&actor), vec![1]);
}

#[test]
fn test_begin_invoke_failure_is_not_raised_on_caller() {
    let (actor, _probe) = actor("detached");
    actor
        .begin_invoke(|db: &mut MockResource| db.reject("ignored"))
        .unwrap();
    actor
        .begin_invoke(|db: &mut MockResource| db.push(9))
        .unwrap();
    assert_eq!(values(&actor), vec![9]);
}

#[test]
fn test_submissions_from_many_threads_keep_one_total_order() {
    let (actor, _probe) = actor("fifo");
    let actor = Arc::new(actor);
    let producers: Vec<_> = (0..8i64)
        .map(|p| {
            let actor = actor.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    actor
                        .begin_invoke(move |db: &mut MockResource| db.push(p * 1000 + i))
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let seen = values(&actor);
    assert_eq!(seen.len(), 800);
    for p in 0..8 {
        let own: Vec<i64> = seen.iter().copied().filter(|v| v / 1000 == p).collect();
        assert_eq!(own, (0..100).map(|i| p * 1000 + i).collect::<Vec<i64>>());
    }
}

#[test]
fn test_timeout_abandons_the_wait_not_the_work() {
    let (actor, _probe) = actor("timeout");
    let err = actor
        .invoke_timeout(
            |db: &mut MockResource| {
                thread::sleep(Duration::from_millis(200));
                db.push(7)
            },
            Duration::from_millis(20),
        )
        .unwrap_err();
    assert!(matches!(err, AffinityError::TimedOut(t) if t == Duration::from_millis(20)));

    // The next item only runs after the timed-out one finished.
    assert_eq!(values(&actor), vec![7]);
}

#[test]
fn test_options_timeout_applies_to_invoke() {
    let probe = Probe::new("options-timeout");
    let actor = AffinityActor::<MockResource>::with_options(
        "options-timeout.db".to_string(),
        probe,
        ActorOptions::default().invoke_timeout(Duration::from_millis(10)),
    );
    let err = actor
        .invoke(|_: &mut MockResource| {
            thread::sleep(Duration::from_millis(100));
            Ok::<_, Infallible>(())
        })
        .unwrap_err();
    assert!(matches!(err, AffinityError::TimedOut(_)));
}

#[test]
fn test_blocking_invoke_from_worker_thread_is_rejected() {
    let (actor, _probe) = actor("reentrant");
    let actor = Arc::new(actor);
    let inner = actor.clone();
    let nested = actor
        .invoke(move |_: &mut MockResource| {
            Ok::<_, Infallible>(inner.invoke(|db: &mut MockResource| db.push(1)))
        })
        .unwrap();
    assert!(matches!(
        nested,
        Err(AffinityError::ProtocolViolation(Violation::ReentrantInvoke))
    ));

    // Fire-and-forget from the worker is fine; it queues behind the current item.
    let inner = actor.clone();
    actor
        .invoke(move |_: &mut MockResource| inner.begin_invoke(|db: &mut MockResource| db.push(2)))
        .unwrap();
    assert_eq!(values(&actor), vec![2]);
}

#[tokio::test]
async fn test_invoke_async_returns_result_and_errors() {
    let (actor, _probe) = actor("async");
    let sum = actor
        .invoke_async(|db| async move {
            db.with(|db| db.push(20))?;
            tokio::time::sleep(Duration::from_millis(5)).await;
            db.with(|db| db.push(22))?;
            Ok::<_, MockError>(db.with(|db| db.values().iter().sum::<i64>()))
        })
        .await
        .unwrap();
    assert_eq!(sum, 42);

    let err = actor
        .invoke_async(|db| async move { db.with(|db| db.reject("async failure")) })
        .await
        .unwrap_err();
    assert_eq!(
        err.action_error::<MockError>(),
        Some(&MockError::Rejected("async failure".to_string()))
    );

    let err = actor
        .invoke_async(|_db| async move {
            tokio::task::yield_now().await;
            if true {
                panic!("async panic");
            }
            Ok::<_, Infallible>(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AffinityError::Panicked(m) if m == "async panic"));
}

#[tokio::test]
async fn test_suspended_async_action_lets_later_items_complete_first() {
    let (actor, _probe) = actor("reorder");
    let (resume_tx, resume_rx) = tokio::sync::oneshot::channel::<()>();

    let first = actor.invoke_async(move |db| async move {
        db.with(|db| db.push(1))?;
        let _ = resume_rx.await;
        db.with(|db| db.push(3))
    });

    // Dequeued after `first`, but completes while `first` is parked.
    actor.invoke(|db: &mut MockResource| db.push(2)).unwrap();
    assert_eq!(values(&actor), vec![1, 2]);

    resume_tx.send(()).unwrap();
    first.await.unwrap();
    assert_eq!(values(&actor), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_drain_waits_for_suspended_async_work() {
    let (actor, probe) = actor("drain-async");
    let pending = actor.invoke_async(|db| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        db.with(|db| db.push(11))
    });
    actor.dispose();
    pending.await.unwrap();
    assert_eq!(probe.committed(), vec![11]);
    assert_eq!(probe.closed(), 1);
}

// --- Transactions ---

#[test]
fn test_committed_work_becomes_visible_only_after_commit() {
    let probe = Probe::new("commit");
    let writer = AffinityActor::<MockResource>::new("commit.db".to_string(), probe.clone());
    let reader = AffinityActor::<MockResource>::new("commit.db".to_string(), probe.clone());

    writer.begin_transaction().unwrap();
    for i in 1..=3 {
        writer
            .begin_invoke(move |db: &mut MockResource| db.push(i))
            .unwrap();
    }
    // The writer sees its own uncommitted work; nobody else does.
    assert_eq!(values(&writer), vec![1, 2, 3]);
    assert!(values(&reader).is_empty());

    writer.commit_transaction().unwrap();
    assert_eq!(values(&writer), vec![1, 2, 3]);
    assert_eq!(values(&reader), vec![1, 2, 3]);
    assert_eq!(probe.commits(), 1);
}

#[test]
fn test_rolled_back_work_is_never_visible() {
    let (actor, probe) = actor("rollback");
    actor.begin_transaction().unwrap();
    actor
        .begin_invoke(|db: &mut MockResource| db.push(1))
        .unwrap();
    actor.rollback_transaction().unwrap();

    assert!(values(&actor).is_empty());
    assert!(probe.committed().is_empty());
    assert_eq!(probe.rollbacks(), 1);
}

#[test]
fn test_transaction_protocol_violations_leave_state_unchanged() {
    let (actor, probe) = actor("protocol");

    let err = actor.commit_transaction().unwrap_err();
    assert!(matches!(
        err,
        AffinityError::ProtocolViolation(Violation::NoOpenTransaction)
    ));
    assert!(matches!(
        actor.rollback_transaction(),
        Err(AffinityError::ProtocolViolation(Violation::NoOpenTransaction))
    ));
    // Nothing was queued: the worker was never even started.
    assert_eq!(actor.state(), WorkerState::NotStarted);
    assert!(!actor.in_transaction());

    actor.begin_transaction().unwrap();
    assert!(matches!(
        actor.begin_transaction(),
        Err(AffinityError::ProtocolViolation(Violation::TransactionAlreadyOpen))
    ));
    assert!(actor.in_transaction());
    actor.commit_transaction().unwrap();
    assert!(!actor.in_transaction());
    assert!(values(&actor).is_empty());
    assert_eq!(probe.commits(), 1);
}

#[test]
fn test_open_transaction_is_rolled_back_at_disposal() {
    let (actor, probe) = actor("dangling");
    actor.begin_transaction().unwrap();
    actor
        .begin_invoke(|db: &mut MockResource| db.push(1))
        .unwrap();
    actor.dispose();
    assert_eq!(probe.rollbacks(), 1);
    assert!(probe.committed().is_empty());
    assert_eq!(probe.closed(), 1);
}

#[test]
fn test_work_in_a_transaction_that_failed_to_begin_never_runs() {
    let (actor, probe) = actor("failed-begin-refresh");
    values(&actor);

    probe.fail_refresh(true);
    actor.begin_transaction().unwrap();
    assert!(matches!(
        values_err(&actor),
        AffinityError::TransactionAborted(_)
    ));
    probe.fail_refresh(false);
    actor
        .begin_invoke(|db: &mut MockResource| db.push(42))
        .unwrap();
    actor.rollback_transaction().unwrap();

    assert!(values(&actor).is_empty());
    assert!(probe.committed().is_empty());
    assert_eq!(probe.rollbacks(), 0);
}

#[test]
fn test_commit_after_failed_begin_writes_nothing() {
    let (actor, probe) = actor("failed-begin");
    probe.fail_begin(true);
    actor.begin_transaction().unwrap();

    let err = actor
        .invoke(|db: &mut MockResource| db.push(7))
        .unwrap_err();
    match err {
        AffinityError::TransactionAborted(cause) => {
            assert!(cause.to_string().contains("injected begin failure"))
        }
        other => panic!("expected TransactionAborted, got {other:?}"),
    }
    actor.commit_transaction().unwrap();
    assert!(!actor.in_transaction());

    // The actor is usable again once the transaction is closed.
    probe.fail_begin(false);
    actor.invoke(|db: &mut MockResource| db.push(8)).unwrap();
    assert_eq!(probe.committed(), vec![8]);
    assert_eq!(probe.commits(), 0);
}

// --- Refresh & resource failures ---

#[test]
fn test_refresh_before_each_item_sees_external_commits() {
    let probe = Probe::new("refresh");
    let writer = AffinityActor::<MockResource>::new("refresh.db".to_string(), probe.clone());
    let reader = AffinityActor::<MockResource>::new("refresh.db".to_string(), probe.clone());

    // Open the reader first so its initial snapshot is empty.
    assert!(values(&reader).is_empty());

    for i in 0..1000 {
        writer
            .begin_invoke(move |db: &mut MockResource| db.push(i))
            .unwrap();
    }
    writer
        .invoke(|_: &mut MockResource| Ok::<_, Infallible>(()))
        .unwrap();

    assert_eq!(values(&reader).len(), 1000);
}

#[test]
fn test_no_refresh_inside_an_open_transaction() {
    let (actor, probe) = actor("tx-refresh");
    values(&actor);
    let before = probe.refreshed();

    actor.begin_transaction().unwrap();
    actor.begin_invoke(|db: &mut MockResource| db.push(1)).unwrap();
    values(&actor);
    actor.commit_transaction().unwrap();

    // Only the Begin step refreshed; items inside the transaction did not.
    assert_eq!(probe.refreshed(), before + 1);
}

#[test]
fn test_open_failure_poisons_actor_without_retry() {
    let (actor, probe) = actor("poisoned");
    probe.fail_open(true);
    assert!(matches!(values_err(&actor), AffinityError::ResourceOpen(_)));

    probe.fail_open(false);
    assert!(matches!(values_err(&actor), AffinityError::ResourceOpen(_)));
    assert_eq!(probe.opened(), 0);
}

#[test]
fn test_refresh_failure_fails_only_that_item() {
    let (actor, probe) = actor("refresh-failure");
    values(&actor);

    probe.fail_refresh(true);
    assert!(matches!(values_err(&actor), AffinityError::Resource(_)));
    probe.fail_refresh(false);
    assert!(values(&actor).is_empty());
}
