use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use carepool_core::{PoolConfig, PoolError};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics::PoolMetrics;
use crate::queue::TaskQueue;
use crate::target::ExecutionTarget;
use crate::task::{Completion, TaskHandle, TaskId};
use crate::types::{PoolState, PoolStats};
use crate::unit::{ExecutionUnit, UnitEvent};

/// A dispatched task awaiting its response or timeout.
///
/// Keyed by task id in [`PoolInner::pending`]. The entry outlives its unit when
/// the unit is restarted mid-flight, so the timer can still settle it.
pub(crate) struct PendingTask {
    pub(crate) unit_id: Uuid,
    pub(crate) task_type: String,
    pub(crate) completion: Completion,
    pub(crate) timer: AbortHandle,
    pub(crate) dispatched_at: Instant,
}

/// Control-plane state. Every mutation happens under the pool mutex.
pub(crate) struct PoolInner {
    pub(crate) config: PoolConfig,
    pub(crate) pool_size: usize,
    pub(crate) target: Arc<dyn ExecutionTarget>,
    pub(crate) state: PoolState,
    pub(crate) units: Vec<ExecutionUnit>,
    pub(crate) queue: TaskQueue,
    pub(crate) pending: HashMap<TaskId, PendingTask>,
    pub(crate) next_task_id: TaskId,
    pub(crate) restarts: u64,
    pub(crate) timeouts: u64,
    pub(crate) metrics: PoolMetrics,
    /// Runtime captured by `initialize`; every background task is spawned on it.
    pub(crate) runtime: Option<Handle>,
    /// Handle given to background tasks (unit readers, timers, terminations).
    pub(crate) this: Weak<Mutex<PoolInner>>,
}

/// Lock the control plane. The state is plain bookkeeping, so a poisoned lock is
/// still usable.
pub(crate) fn lock(inner: &Mutex<PoolInner>) -> MutexGuard<'_, PoolInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fixed-size pool of execution units with a priority queue, per-task timeouts
/// and a restart policy.
///
/// `initialize` must run inside a Tokio runtime. The pool keeps a handle to it,
/// so `submit` may be called from any thread afterwards. Dropping the pool closes
/// every unit's request channel.
pub struct WorkerPool {
    pub(super) inner: Arc<Mutex<PoolInner>>,
}

impl WorkerPool {
    /// Create an uninitialized pool bound to `target`.
    pub fn new(config: PoolConfig, target: impl ExecutionTarget) -> Self {
        Self::with_target(config, Arc::new(target))
    }

    /// Create an uninitialized pool sharing an existing target.
    pub fn with_target(config: PoolConfig, target: Arc<dyn ExecutionTarget>) -> Self {
        let pool_size = config.resolved_pool_size();
        let inner = Arc::new_cyclic(|this| {
            Mutex::new(PoolInner {
                config,
                pool_size,
                target,
                state: PoolState::Uninitialized,
                units: Vec::with_capacity(pool_size),
                queue: TaskQueue::default(),
                pending: HashMap::new(),
                next_task_id: 1,
                restarts: 0,
                timeouts: 0,
                metrics: PoolMetrics::default(),
                runtime: None,
                this: this.clone(),
            })
        });
        Self { inner }
    }

    /// Start every execution unit and begin accepting tasks.
    ///
    /// Calling this on a running (or shutting-down) pool logs a warning and does
    /// nothing. A stopped pool can be initialized again. Fails with
    /// `PoolError::Runtime` outside a Tokio runtime.
    pub fn initialize(&self) -> Result<(), PoolError> {
        let mut inner = lock(&self.inner);
        match inner.state {
            PoolState::Running | PoolState::ShuttingDown => {
                warn!(state = ?inner.state, "worker pool already initialized, ignoring");
                return Ok(());
            }
            PoolState::Uninitialized | PoolState::Stopped => {}
        }

        let runtime = Handle::try_current().map_err(|e| PoolError::Runtime(e.to_string()))?;
        inner.runtime = Some(runtime);

        let size = inner.pool_size;
        let mut units = Vec::with_capacity(size);
        for _ in 0..size {
            units.push(inner.spawn_unit()?);
        }
        inner.units = units;
        inner.state = PoolState::Running;

        info!(
            pool_size = size,
            task_timeout_ms = inner.config.task_timeout_ms,
            error_threshold = inner.config.error_threshold,
            "worker pool initialized"
        );
        Ok(())
    }

    /// Submit a task. Higher `priority` is scheduled sooner.
    ///
    /// Fails immediately with `PoolNotReady` before `initialize` and with
    /// `PoolShuttingDown` during or after `shutdown`. Otherwise the returned
    /// handle resolves once the task settles.
    pub fn submit(
        &self,
        task_type: impl Into<String>,
        payload: Value,
        priority: i32,
    ) -> Result<TaskHandle, PoolError> {
        lock(&self.inner).submit(task_type.into(), payload, priority)
    }

    /// Submit at the default priority (0).
    pub fn submit_default(
        &self,
        task_type: impl Into<String>,
        payload: Value,
    ) -> Result<TaskHandle, PoolError> {
        self.submit(task_type, payload, 0)
    }

    /// Snapshot of unit and queue counters. No side effects.
    pub fn stats(&self) -> PoolStats {
        lock(&self.inner).stats()
    }

    /// Snapshot of per-task-type metrics.
    pub fn metrics(&self) -> PoolMetrics {
        lock(&self.inner).metrics.clone()
    }

    pub fn state(&self) -> PoolState {
        lock(&self.inner).state
    }

    /// Ids of the live units, in slot order.
    pub fn unit_ids(&self) -> Vec<Uuid> {
        lock(&self.inner).units.iter().map(|u| u.id).collect()
    }
}

impl PoolInner {
    pub(crate) fn stats(&self) -> PoolStats {
        let active = self.units.iter().filter(|u| u.is_busy()).count();
        PoolStats {
            pool_size: self.pool_size,
            active_workers: active,
            idle_workers: self.units.len() - active,
            queued_tasks: self.queue.len(),
            total_tasks_processed: self.units.iter().map(|u| u.completed_count).sum(),
            total_errors: self.units.iter().map(|u| u.error_count as u64).sum(),
            restarts: self.restarts,
            timeouts: self.timeouts,
            state: self.state,
        }
    }

    pub(crate) fn unit_index(&self, unit_id: Uuid) -> Option<usize> {
        self.units.iter().position(|u| u.id == unit_id)
    }

    /// Start one unit and the reader task that feeds its events back here.
    pub(crate) fn spawn_unit(&self) -> Result<ExecutionUnit, PoolError> {
        let (unit, events) = ExecutionUnit::spawn(Arc::clone(&self.target))?;
        self.spawn(read_events(self.this.clone(), unit.id, events))?;
        Ok(unit)
    }

    /// Run `task` on the pool's runtime.
    pub(crate) fn spawn<F>(&self, task: F) -> Result<AbortHandle, PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = self.runtime.as_ref().ok_or(PoolError::PoolNotReady)?;
        Ok(runtime.spawn(task).abort_handle())
    }
}

/// Demultiplex one unit's event stream into control-plane callbacks.
///
/// Ends when the unit thread exits (stream closed) or the pool is dropped.
async fn read_events(
    pool: Weak<Mutex<PoolInner>>,
    unit_id: Uuid,
    mut events: mpsc::UnboundedReceiver<UnitEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = pool.upgrade() else {
            break;
        };
        lock(&inner).handle_event(unit_id, event);
    }
}
