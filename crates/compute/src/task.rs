use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use carepool_core::PoolError;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

/// Pool-unique task identifier. Ids increase monotonically and are never reused.
pub type TaskId = u64;

/// What a submitted task settles to.
pub type TaskOutcome = Result<Value, PoolError>;

/// Single-resolution completion handle held by the pool.
///
/// Consuming `settle` makes a second resolution impossible.
#[derive(Debug)]
pub(crate) struct Completion {
    task_id: TaskId,
    tx: oneshot::Sender<TaskOutcome>,
}

impl Completion {
    /// Deliver the outcome. Returns false if the caller stopped waiting.
    pub(crate) fn settle(self, outcome: TaskOutcome) -> bool {
        let delivered = self.tx.send(outcome).is_ok();
        if !delivered {
            debug!(task_id = self.task_id, "caller dropped its task handle before settlement");
        }
        delivered
    }
}

/// A submitted work item.
#[derive(Debug)]
pub(crate) struct Task {
    pub(crate) id: TaskId,
    pub(crate) task_type: String,
    pub(crate) payload: Value,
    pub(crate) priority: i32,
    pub(crate) submitted_at: Instant,
    pub(crate) completion: Completion,
}

impl Task {
    /// Create a task together with the handle its submitter awaits.
    pub(crate) fn new(
        id: TaskId,
        task_type: String,
        payload: Value,
        priority: i32,
    ) -> (Self, TaskHandle) {
        let (tx, rx) = oneshot::channel();
        let task = Self {
            id,
            task_type,
            payload,
            priority,
            submitted_at: Instant::now(),
            completion: Completion { task_id: id, tx },
        };
        (task, TaskHandle { id, rx })
    }

    /// Settle a task that never reached an execution unit.
    pub(crate) fn settle(self, outcome: TaskOutcome) -> bool {
        self.completion.settle(outcome)
    }
}

/// Future returned by [`WorkerPool::submit`](crate::WorkerPool::submit).
///
/// Resolves with the unit's result, a unit-reported failure, a timeout, or
/// `PoolShuttingDown` if the task was still queued at shutdown.
#[must_use = "a task handle does nothing unless awaited"]
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl Future for TaskHandle {
    type Output = TaskOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The pool itself was dropped with this task still pending.
            Poll::Ready(Err(_)) => Poll::Ready(Err(PoolError::PoolShuttingDown)),
            Poll::Pending => Poll::Pending,
        }
    }
}
