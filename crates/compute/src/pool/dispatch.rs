use std::time::Instant;

use carepool_core::PoolError;
use serde_json::Value;
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::{Request, Response};
use crate::task::{Task, TaskHandle, TaskId};
use crate::types::PoolState;

use super::core::{lock, PendingTask, PoolInner};

impl PoolInner {
    /// Allocate a task and either hand it to an idle unit or queue it.
    pub(crate) fn submit(
        &mut self,
        task_type: String,
        payload: Value,
        priority: i32,
    ) -> Result<TaskHandle, PoolError> {
        match self.state {
            PoolState::Running => {}
            PoolState::Uninitialized => return Err(PoolError::PoolNotReady),
            PoolState::ShuttingDown | PoolState::Stopped => {
                return Err(PoolError::PoolShuttingDown)
            }
        }

        let id = self.next_task_id;
        self.next_task_id += 1;
        let (task, handle) = Task::new(id, task_type, payload, priority);

        match self.units.iter().position(|u| !u.is_busy()) {
            Some(idx) => self.dispatch(idx, task),
            None => {
                debug!(
                    task_id = id,
                    task_type = %task.task_type,
                    priority,
                    queued = self.queue.len() + 1,
                    "all units busy, queueing task"
                );
                self.queue.push(task);
            }
        }
        Ok(handle)
    }

    /// Send `task` to the idle unit at `idx` and arm its timeout.
    pub(crate) fn dispatch(&mut self, idx: usize, task: Task) {
        let Task {
            id,
            task_type,
            payload,
            submitted_at,
            completion,
            ..
        } = task;

        let request = Request {
            id,
            task_type,
            data: payload,
        };
        let frame = match request.to_bytes() {
            Ok(f) => f,
            Err(e) => {
                warn!(task_id = id, error = %e, "failed to encode task request");
                completion.settle(Err(PoolError::Protocol(e.to_string())));
                return;
            }
        };
        let task_type = request.task_type;

        let timer = match self.arm_timeout(id) {
            Ok(t) => t,
            Err(e) => {
                warn!(task_id = id, error = %e, "failed to arm task timeout");
                completion.settle(Err(e));
                return;
            }
        };

        let unit_id = self.units[idx].id;
        self.units[idx].current = Some(id);
        self.metrics.record_dispatch(&task_type, submitted_at.elapsed());

        self.pending.insert(
            id,
            PendingTask {
                unit_id,
                task_type: task_type.clone(),
                completion,
                timer,
                dispatched_at: Instant::now(),
            },
        );

        match self.units[idx].send(frame) {
            Ok(()) => debug!(
                task_id = id,
                task_type = %task_type,
                unit = %unit_id,
                "task dispatched"
            ),
            // The unit's exit event will restart it; the task settles on its timeout.
            Err(e) => warn!(task_id = id, unit = %unit_id, error = %e, "dispatch to dead unit"),
        }
    }

    fn arm_timeout(&self, task_id: TaskId) -> Result<AbortHandle, PoolError> {
        let pool = self.this.clone();
        let timeout = self.config.task_timeout();
        self.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = pool.upgrade() {
                lock(&inner).handle_timeout(task_id);
            }
        })
    }

    /// Keep the unit at `idx` busy while work is queued.
    pub(crate) fn drain(&mut self, idx: usize) {
        if self.state != PoolState::Running {
            return;
        }
        while !self.units[idx].is_busy() {
            let Some(task) = self.queue.pop() else {
                break;
            };
            self.dispatch(idx, task);
        }
    }

    /// Settle the task a response belongs to, if it is still live.
    pub(crate) fn handle_response(&mut self, unit_id: Uuid, frame: &[u8]) {
        let response = match Response::from_bytes(frame) {
            Ok(r) => r,
            Err(e) => {
                self.handle_error(unit_id, format!("undecodable response frame: {e}"));
                return;
            }
        };

        let Some(idx) = self.unit_index(unit_id) else {
            debug!(task_id = response.id, unit = %unit_id, "dropping response from retired unit");
            return;
        };
        if self.units[idx].current != Some(response.id) {
            debug!(
                task_id = response.id,
                unit = %unit_id,
                "dropping stale response (task already settled)"
            );
            return;
        }

        let unit = &mut self.units[idx];
        unit.current = None;
        unit.completed_count += 1;

        if let Some(pending) = self.pending.remove(&response.id) {
            pending.timer.abort();
            self.metrics.record_round_trip(
                &pending.task_type,
                pending.dispatched_at.elapsed(),
                response.success,
            );
            debug!(
                task_id = response.id,
                task_type = %pending.task_type,
                success = response.success,
                "task completed"
            );
            pending.completion.settle(response.into_outcome());
        }

        self.drain(idx);
    }

    /// Fail a task whose unit did not answer in time.
    ///
    /// The unit keeps running the stale payload; it is only marked idle so the
    /// queue can continue. No-op if the task already settled.
    pub(crate) fn handle_timeout(&mut self, task_id: TaskId) {
        let Some(pending) = self.pending.remove(&task_id) else {
            return;
        };
        let timeout = self.config.task_timeout();
        self.timeouts += 1;
        self.metrics.record_timeout(&pending.task_type);
        warn!(
            task_id,
            task_type = %pending.task_type,
            unit = %pending.unit_id,
            timeout_ms = timeout.as_millis() as u64,
            "task timed out"
        );
        pending.completion.settle(Err(PoolError::TaskTimeout(timeout)));

        if let Some(idx) = self.unit_index(pending.unit_id) {
            if self.units[idx].current == Some(task_id) {
                self.units[idx].current = None;
                self.drain(idx);
            }
        }
    }
}
