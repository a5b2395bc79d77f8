use futures::future::join_all;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use carepool_core::PoolError;

use crate::types::PoolState;
use crate::unit::{ExitStatus, UnitEvent};

use super::core::{lock, PoolInner, WorkerPool};

impl PoolInner {
    pub(crate) fn handle_event(&mut self, unit_id: Uuid, event: UnitEvent) {
        match event {
            UnitEvent::Response(frame) => self.handle_response(unit_id, &frame),
            UnitEvent::Error(message) => self.handle_error(unit_id, message),
            UnitEvent::Exit(status) => self.handle_exit(unit_id, status),
        }
    }

    /// Count an out-of-band unit error; restart the unit past the threshold.
    pub(crate) fn handle_error(&mut self, unit_id: Uuid, message: String) {
        let Some(idx) = self.unit_index(unit_id) else {
            debug!(unit = %unit_id, error = %message, "error from retired unit ignored");
            return;
        };

        let unit = &mut self.units[idx];
        unit.error_count += 1;
        let error_count = unit.error_count;
        warn!(unit = %unit_id, error_count, error = %message, "execution unit error");

        if error_count > self.config.error_threshold && self.state == PoolState::Running {
            self.restart(idx, "error threshold exceeded");
        }
    }

    /// React to a unit thread ending. Only abnormal exits of live units while
    /// running lead to a restart.
    pub(crate) fn handle_exit(&mut self, unit_id: Uuid, status: ExitStatus) {
        if self.state != PoolState::Running {
            debug!(unit = %unit_id, ?status, state = ?self.state, "unit exit during shutdown");
            return;
        }
        let Some(idx) = self.unit_index(unit_id) else {
            debug!(unit = %unit_id, ?status, "retired unit exited");
            return;
        };

        if status.is_abnormal() {
            error!(unit = %unit_id, ?status, "execution unit exited abnormally");
            self.restart(idx, "abnormal exit");
        } else {
            warn!(unit = %unit_id, "execution unit exited cleanly while pool is running");
        }
    }

    /// Replace the unit at `idx` with a fresh one in the same slot.
    ///
    /// The old unit's termination runs in the background and is never awaited.
    /// Its in-flight task, if any, stays pending and settles on its timeout.
    pub(crate) fn restart(&mut self, idx: usize, reason: &str) {
        let replacement = match self.spawn_unit() {
            Ok(unit) => unit,
            Err(e) => {
                error!(
                    unit = %self.units[idx].id,
                    error = %e,
                    "failed to start replacement unit, keeping the old one"
                );
                return;
            }
        };
        let old = std::mem::replace(&mut self.units[idx], replacement);
        self.restarts += 1;

        if let Some(task_id) = old.current {
            warn!(task_id, unit = %old.id, "in-flight task abandoned by restart");
        }
        info!(
            old_unit = %old.id,
            new_unit = %self.units[idx].id,
            reason,
            "execution unit restarted"
        );

        let old_id = old.id;
        let timeout = self.config.terminate_timeout();
        let terminated = self.spawn(async move {
            match old.terminate(timeout).await {
                Ok(status) => debug!(unit = %old_id, ?status, "retired unit terminated"),
                Err(e) => warn!(unit = %old_id, error = %e, "failed to terminate retired unit"),
            }
        });
        // The unscheduled future drops `old`, which still closes its request channel
        if let Err(e) = terminated {
            warn!(unit = %old_id, error = %e, "could not schedule retired unit termination");
        }

        self.drain(idx);
    }
}

impl WorkerPool {
    /// Stop accepting work, fail every queued task with `PoolShuttingDown`, and
    /// terminate all units in parallel.
    ///
    /// Dispatched tasks are left to their timeouts. Calling this on a pool that is
    /// not running is a no-op. Afterwards the pool is `Stopped` and may be
    /// initialized again.
    pub async fn shutdown(&self) {
        let (units, timeout) = {
            let mut inner = lock(&self.inner);
            if inner.state != PoolState::Running {
                info!(state = ?inner.state, "worker pool not running, shutdown skipped");
                return;
            }
            inner.state = PoolState::ShuttingDown;

            let drained = inner.queue.drain_ordered();
            info!(
                queued = drained.len(),
                units = inner.units.len(),
                in_flight = inner.pending.len(),
                "shutting down worker pool"
            );
            for task in drained {
                task.settle(Err(PoolError::PoolShuttingDown));
            }

            (std::mem::take(&mut inner.units), inner.config.terminate_timeout())
        };

        let results = join_all(units.into_iter().map(|unit| {
            let id = unit.id;
            async move { (id, unit.terminate(timeout).await) }
        }))
        .await;

        for (id, result) in results {
            match result {
                Ok(status) => debug!(unit = %id, ?status, "unit terminated"),
                Err(e) => warn!(unit = %id, error = %e, "failed to terminate unit"),
            }
        }

        lock(&self.inner).state = PoolState::Stopped;
        info!("worker pool stopped");
    }
}
