use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use carepool_core::{PoolConfig, PoolError};

use crate::pool::WorkerPool;
use crate::target::{ExecutionTarget, UnitContext};
use crate::types::PoolState;

/// Test target driven by the payload:
/// `{ "label": str, "sleep_ms": u64, "errors": u64, "fail": str, "panic": bool }`.
/// Records labels in the order units start executing them.
#[derive(Default)]
struct ScriptedTarget {
    log: Arc<Mutex<Vec<String>>>,
}

impl ExecutionTarget for ScriptedTarget {
    fn execute(&self, ctx: &UnitContext, _task_type: &str, data: Value) -> Result<Value, String> {
        let label = data["label"].as_str().unwrap_or("unlabelled").to_string();
        self.log.lock().unwrap().push(label.clone());

        for _ in 0..data["errors"].as_u64().unwrap_or(0) {
            ctx.report_error("scripted error");
        }
        if let Some(ms) = data["sleep_ms"].as_u64() {
            std::thread::sleep(Duration::from_millis(ms));
        }
        if data["panic"].as_bool().unwrap_or(false) {
            panic!("scripted panic");
        }
        if let Some(msg) = data["fail"].as_str() {
            return Err(msg.to_string());
        }
        Ok(json!({ "label": label, "unit": ctx.unit_id().to_string() }))
    }
}

fn config(pool_size: usize, timeout_ms: u64) -> PoolConfig {
    PoolConfig::default()
        .with_pool_size(pool_size)
        .with_task_timeout(Duration::from_millis(timeout_ms))
}

fn pool_with_log(pool_size: usize, timeout_ms: u64) -> (WorkerPool, Arc<Mutex<Vec<String>>>) {
    let target = ScriptedTarget::default();
    let log = Arc::clone(&target.log);
    let pool = WorkerPool::new(config(pool_size, timeout_ms), target);
    pool.initialize().unwrap();
    (pool, log)
}

fn job(label: &str, sleep_ms: u64) -> Value {
    json!({ "label": label, "sleep_ms": sleep_ms })
}

#[tokio::test]
async fn submit_before_initialize_is_rejected() {
    let pool = WorkerPool::new(config(2, 1000), ScriptedTarget::default());
    assert_eq!(pool.state(), PoolState::Uninitialized);
    assert!(matches!(
        pool.submit_default("echo", job("early", 0)),
        Err(PoolError::PoolNotReady)
    ));
}

#[tokio::test]
async fn initialize_is_eager_and_idempotent() {
    let (pool, _log) = pool_with_log(3, 1000);
    let ids = pool.unit_ids();
    assert_eq!(ids.len(), 3);

    let stats = pool.stats();
    assert_eq!(stats.pool_size, 3);
    assert_eq!(stats.idle_workers, 3);
    assert_eq!(stats.active_workers, 0);
    assert_eq!(stats.state, PoolState::Running);

    pool.initialize().unwrap();
    assert_eq!(pool.unit_ids(), ids, "second initialize must not replace units");
    pool.shutdown().await;
}

#[tokio::test]
async fn success_and_failure_responses_reach_the_caller() {
    let (pool, _log) = pool_with_log(2, 2000);

    let ok = pool.submit_default("echo", job("ok", 0)).unwrap().await.unwrap();
    assert_eq!(ok["label"], "ok");

    let failed = pool
        .submit_default("echo", json!({ "label": "bad", "fail": "invalid vitals" }))
        .unwrap()
        .await;
    match failed {
        Err(PoolError::TaskFailed(msg)) => assert_eq!(msg, "invalid vitals"),
        other => panic!("expected TaskFailed, got {other:?}"),
    }

    let stats = pool.stats();
    assert_eq!(stats.total_tasks_processed, 2);
    assert_eq!(stats.idle_workers, 2);

    let metrics = pool.metrics();
    assert_eq!(metrics.tasks_succeeded["echo"], 1);
    assert_eq!(metrics.tasks_failed["echo"], 1);
    pool.shutdown().await;
}

#[tokio::test]
async fn third_task_waits_for_first_free_unit() {
    let (pool, log) = pool_with_log(2, 5000);

    let t1 = pool.submit_default("echo", job("t1", 100)).unwrap();
    let t2 = pool.submit_default("echo", job("t2", 400)).unwrap();
    let t3 = pool.submit_default("echo", job("t3", 0)).unwrap();

    let stats = pool.stats();
    assert_eq!(stats.active_workers, 2);
    assert_eq!(stats.idle_workers, 0);
    assert_eq!(stats.queued_tasks, 1);

    let r1 = t1.await.unwrap();
    let r3 = t3.await.unwrap();
    assert_eq!(r3["unit"], r1["unit"], "t3 runs on the unit t1 freed");
    assert_eq!(log.lock().unwrap()[2], "t3");

    t2.await.unwrap();
    assert_eq!(pool.stats().queued_tasks, 0);
    pool.shutdown().await;
}

#[tokio::test]
async fn queued_tasks_run_by_priority_then_arrival() {
    let (pool, log) = pool_with_log(1, 5000);

    let blocker = pool.submit("echo", job("blocker", 150), 0).unwrap();
    let a = pool.submit("echo", job("A", 0), 1).unwrap();
    let b = pool.submit("echo", job("B", 0), 5).unwrap();
    let c = pool.submit("echo", job("C", 0), 1).unwrap();
    assert_eq!(pool.stats().queued_tasks, 3);

    for handle in [blocker, a, b, c] {
        handle.await.unwrap();
    }
    assert_eq!(*log.lock().unwrap(), vec!["blocker", "B", "A", "C"]);
    pool.shutdown().await;
}

#[tokio::test]
async fn unresponsive_unit_times_out_and_frees_the_unit() {
    let (pool, _log) = pool_with_log(1, 50);

    let started = Instant::now();
    let result = pool.submit_default("echo", job("slow", 300)).unwrap().await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(PoolError::TaskTimeout(d)) if d == Duration::from_millis(50)));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(250), "timed out late: {elapsed:?}");

    let stats = pool.stats();
    assert_eq!(stats.idle_workers, 1);
    assert_eq!(stats.active_workers, 0);
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.restarts, 0, "a timeout does not restart the unit");
    pool.shutdown().await;
}

#[tokio::test]
async fn late_response_is_not_delivered_to_the_next_task() {
    let (pool, _log) = pool_with_log(1, 200);

    let stale = pool.submit_default("echo", job("stale", 300)).unwrap().await;
    assert!(matches!(stale, Err(PoolError::TaskTimeout(_))));

    // Lands on the same unit while it is still finishing "stale"
    let fresh = pool.submit_default("echo", job("fresh", 0)).unwrap().await.unwrap();
    assert_eq!(fresh["label"], "fresh");

    let stats = pool.stats();
    assert_eq!(stats.total_tasks_processed, 1, "stale response must be dropped");
    assert_eq!(stats.timeouts, 1);
    assert_eq!(pool.metrics().tasks_timed_out["echo"], 1);
    pool.shutdown().await;
}

#[tokio::test]
async fn error_threshold_restarts_unit_and_keeps_pool_size() {
    let (pool, _log) = pool_with_log(1, 300);
    let original = pool.unit_ids();

    let noisy = |label: &str| json!({ "label": label, "errors": 1 });

    for i in 0..5 {
        pool.submit_default("echo", noisy(&format!("n{i}"))).unwrap().await.unwrap();
    }
    let stats = pool.stats();
    assert_eq!(stats.total_errors, 5);
    assert_eq!(stats.restarts, 0, "threshold is exclusive");

    // Sixth error crosses the threshold while this task is in flight
    let abandoned = pool.submit_default("echo", noisy("n5")).unwrap().await;
    assert!(matches!(abandoned, Err(PoolError::TaskTimeout(_))));

    let stats = pool.stats();
    assert_eq!(stats.restarts, 1);
    assert_eq!(stats.pool_size, 1);
    assert_eq!(stats.idle_workers + stats.active_workers, 1);
    assert_eq!(stats.total_errors, 0, "replacement starts with a clean count");

    let replaced = pool.unit_ids();
    assert_eq!(replaced.len(), 1);
    assert_ne!(replaced, original);

    let after = pool.submit_default("echo", job("after", 0)).unwrap().await.unwrap();
    assert_eq!(after["unit"], replaced[0].to_string());
    pool.shutdown().await;
}

#[tokio::test]
async fn panicking_unit_is_replaced_immediately() {
    let (pool, _log) = pool_with_log(1, 400);
    let original = pool.unit_ids();

    let crashed = pool
        .submit_default("echo", json!({ "label": "boom", "panic": true }))
        .unwrap();

    // Give the exit event time to arrive, then use the replacement
    tokio::time::sleep(Duration::from_millis(50)).await;
    let started = Instant::now();
    let next = pool.submit_default("echo", job("next", 0)).unwrap().await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(300));
    assert_ne!(next["unit"], original[0].to_string());

    // The crashed task is not failed early; it settles on its own timeout
    assert!(matches!(crashed.await, Err(PoolError::TaskTimeout(_))));
    assert_eq!(pool.stats().restarts, 1);
    assert_eq!(pool.unit_ids().len(), 1);
    pool.shutdown().await;
}

#[tokio::test]
async fn shutdown_fails_queued_tasks_only() {
    let (pool, _log) = pool_with_log(1, 1000);

    let in_flight = pool.submit_default("echo", job("running", 200)).unwrap();
    let q1 = pool.submit_default("echo", job("q1", 0)).unwrap();
    let q2 = pool.submit("echo", job("q2", 0), 9).unwrap();
    assert_eq!(pool.stats().queued_tasks, 2);

    pool.shutdown().await;

    assert!(matches!(q1.await, Err(PoolError::PoolShuttingDown)));
    assert!(matches!(q2.await, Err(PoolError::PoolShuttingDown)));

    let stats = pool.stats();
    assert_eq!(stats.queued_tasks, 0);
    assert_eq!(stats.active_workers + stats.idle_workers, 0);
    assert_eq!(stats.state, PoolState::Stopped);

    // Dispatched work is left to its timeout; its late response has no unit to land on
    assert!(matches!(in_flight.await, Err(PoolError::TaskTimeout(_))));
}

#[tokio::test]
async fn shutdown_twice_is_a_noop() {
    let (pool, _log) = pool_with_log(2, 1000);
    pool.shutdown().await;
    pool.shutdown().await;

    assert_eq!(pool.state(), PoolState::Stopped);
    assert!(matches!(
        pool.submit_default("echo", job("late", 0)),
        Err(PoolError::PoolShuttingDown)
    ));
}

#[tokio::test]
async fn stopped_pool_can_be_reinitialized() {
    let (pool, _log) = pool_with_log(1, 1000);
    let first = pool.submit_default("echo", job("first", 0)).unwrap();
    let first_id = first.id();
    first.await.unwrap();
    pool.shutdown().await;

    pool.initialize().unwrap();
    assert_eq!(pool.state(), PoolState::Running);
    assert_eq!(pool.unit_ids().len(), 1);

    let second = pool.submit_default("echo", job("second", 0)).unwrap();
    assert!(second.id() > first_id, "task ids are never reused");
    assert_eq!(second.await.unwrap()["label"], "second");
    pool.shutdown().await;
}

#[tokio::test]
async fn units_never_hold_more_than_one_task() {
    let (pool, log) = pool_with_log(2, 5000);

    let handles: Vec<_> = (0..6)
        .map(|i| pool.submit_default("echo", job(&format!("w{i}"), 30)).unwrap())
        .collect();

    let mut max_active = 0;
    while log.lock().unwrap().len() < 6 {
        let stats = pool.stats();
        assert_eq!(stats.active_workers + stats.idle_workers, 2);
        max_active = max_active.max(stats.active_workers);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(max_active <= 2);

    for handle in handles {
        handle.await.unwrap();
    }
    let stats = pool.stats();
    assert_eq!(stats.total_tasks_processed, 6);
    assert_eq!(stats.queued_tasks, 0);
    pool.shutdown().await;
}

#[tokio::test]
async fn timeout_hands_the_unit_to_the_next_queued_task() {
    let (pool, log) = pool_with_log(1, 100);

    let slow = pool.submit_default("echo", job("slow", 400)).unwrap();
    let next = pool.submit_default("echo", job("next", 0)).unwrap();
    assert_eq!(pool.stats().queued_tasks, 1);

    assert!(matches!(slow.await, Err(PoolError::TaskTimeout(_))));
    let stats = pool.stats();
    assert_eq!(stats.queued_tasks, 0, "queued task must be dispatched on timeout");
    assert_eq!(stats.active_workers, 1);

    // The unit is still finishing the stale payload, so the follow-up times out too
    assert!(matches!(next.await, Err(PoolError::TaskTimeout(_))));
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(*log.lock().unwrap(), vec!["slow", "next"]);
    pool.shutdown().await;
}

#[tokio::test]
async fn replacement_unit_takes_the_queued_task() {
    let (pool, _log) = pool_with_log(1, 500);
    let original = pool.unit_ids();

    let crashed = pool
        .submit_default("echo", json!({ "label": "boom", "panic": true }))
        .unwrap();
    let queued = pool.submit_default("echo", job("queued", 0)).unwrap();
    assert_eq!(pool.stats().queued_tasks, 1);

    // Must not wait for the crashed task's timeout
    let result = tokio::time::timeout(Duration::from_millis(400), queued)
        .await
        .expect("queued task was not dispatched to the replacement unit")
        .unwrap();
    assert_eq!(result["label"], "queued");
    assert_ne!(result["unit"], original[0].to_string());
    assert_eq!(pool.stats().restarts, 1);

    assert!(matches!(crashed.await, Err(PoolError::TaskTimeout(_))));
    pool.shutdown().await;
}

#[test]
fn initialize_outside_a_runtime_is_an_error() {
    let pool = WorkerPool::new(config(1, 1000), ScriptedTarget::default());
    assert!(matches!(pool.initialize(), Err(PoolError::Runtime(_))));
    assert_eq!(pool.state(), PoolState::Uninitialized);
    assert!(pool.unit_ids().is_empty());
}

#[test]
fn submit_from_a_plain_thread_runs_on_the_pool_runtime() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    let pool = Arc::new(WorkerPool::new(config(1, 2000), ScriptedTarget::default()));
    {
        let _guard = runtime.enter();
        pool.initialize().unwrap();
    }

    let submitter = Arc::clone(&pool);
    let (first, outside) = std::thread::spawn(move || {
        let first = submitter.submit_default("echo", job("first", 50)).unwrap();
        let outside = submitter.submit_default("echo", job("outside", 0)).unwrap();
        (first, outside)
    })
    .join()
    .expect("submit panicked outside the runtime");
    assert_eq!(runtime.block_on(first).unwrap()["label"], "first");
    assert_eq!(runtime.block_on(outside).unwrap()["label"], "outside");

    runtime.block_on(pool.shutdown());
    assert_eq!(pool.state(), PoolState::Stopped);
}
