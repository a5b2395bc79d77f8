//! Execution units: one dedicated OS thread per unit.
//!
//! The thread blocks on its request channel, runs the [`ExecutionTarget`] for each
//! decoded frame, and emits encoded responses on its event channel. Out-of-band
//! errors and the final exit travel on the same channel, so the pool sees them in
//! the order the unit produced them.

use std::sync::Arc;
use std::time::Duration;

use carepool_core::PoolError;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};
use uuid::Uuid;

use crate::protocol::{Request, Response};
use crate::target::{ExecutionTarget, UnitContext};
use crate::task::TaskId;

/// Everything a unit reports back to the control plane.
#[derive(Debug)]
pub(crate) enum UnitEvent {
    /// Encoded [`Response`] frame.
    Response(Vec<u8>),
    /// Malfunction unrelated to a specific response.
    Error(String),
    /// The unit thread ended.
    Exit(ExitStatus),
}

/// How a unit thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitStatus {
    /// Request channel closed; the loop returned normally.
    Clean,
    /// The thread unwound from a panic.
    Panicked,
}

impl ExitStatus {
    pub fn is_abnormal(&self) -> bool {
        matches!(self, ExitStatus::Panicked)
    }
}

/// Control-plane view of one execution unit.
#[derive(Debug)]
pub(crate) struct ExecutionUnit {
    pub(crate) id: Uuid,
    /// Task currently dispatched to this unit. `Some` iff the unit is busy.
    pub(crate) current: Option<TaskId>,
    pub(crate) completed_count: u64,
    pub(crate) error_count: u32,
    requests: mpsc::UnboundedSender<Vec<u8>>,
    exited: oneshot::Receiver<ExitStatus>,
}

impl ExecutionUnit {
    /// Start a unit thread. The returned receiver carries the unit's events and
    /// closes once the thread has exited.
    pub(crate) fn spawn(
        target: Arc<dyn ExecutionTarget>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<UnitEvent>), PoolError> {
        let id = Uuid::new_v4();
        let (request_tx, request_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<UnitEvent>();
        let (exit_tx, exit_rx) = oneshot::channel();

        let ctx = UnitContext::new(id, event_tx.clone());
        let guard = ExitGuard {
            events: event_tx,
            exited: Some(exit_tx),
        };

        std::thread::Builder::new()
            .name(format!("carepool-unit-{}", &id.simple().to_string()[..8]))
            .spawn(move || {
                let _guard = guard;
                run_unit(&ctx, target.as_ref(), request_rx);
            })
            .map_err(|e| PoolError::UnitError(format!("failed to spawn unit thread: {e}")))?;

        debug!(unit = %id, "execution unit started");

        Ok((
            Self {
                id,
                current: None,
                completed_count: 0,
                error_count: 0,
                requests: request_tx,
                exited: exit_rx,
            },
            event_rx,
        ))
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    /// Hand an encoded request frame to the unit thread.
    pub(crate) fn send(&self, frame: Vec<u8>) -> Result<(), PoolError> {
        self.requests
            .send(frame)
            .map_err(|_| {
                PoolError::UnitExit(format!("unit {} is no longer accepting requests", self.id))
            })
    }

    /// Close the request channel and wait for the thread to exit.
    ///
    /// A unit stuck inside a long computation cannot be interrupted; after
    /// `timeout` it is left to finish on its own and an error is returned.
    pub(crate) async fn terminate(self, timeout: Duration) -> Result<ExitStatus, PoolError> {
        let Self {
            id,
            requests,
            exited,
            ..
        } = self;
        drop(requests);

        match tokio::time::timeout(timeout, exited).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(_)) => Err(PoolError::UnitExit(format!(
                "unit {id} dropped its exit signal"
            ))),
            Err(_) => Err(PoolError::UnitExit(format!(
                "unit {id} did not exit within {timeout:?}"
            ))),
        }
    }
}

/// Unit thread body.
fn run_unit(
    ctx: &UnitContext,
    target: &dyn ExecutionTarget,
    mut requests: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(frame) = requests.blocking_recv() {
        let request = match Request::from_bytes(&frame) {
            Ok(r) => r,
            Err(e) => {
                ctx.report_error(format!("undecodable request frame: {e}"));
                continue;
            }
        };

        let id = request.id;
        let outcome = target.execute(ctx, &request.task_type, request.data);
        let bytes = match Response::from_outcome(id, outcome).to_bytes() {
            Ok(b) => b,
            Err(e) => match Response::failure(id, format!("unencodable result: {e}")).to_bytes() {
                Ok(b) => b,
                Err(e) => {
                    ctx.report_error(format!("failed to encode response for task {id}: {e}"));
                    continue;
                }
            },
        };

        if !ctx.send(UnitEvent::Response(bytes)) {
            // Control plane is gone.
            break;
        }
    }
}

/// Reports the thread's exit on drop, including when unwinding from a panic.
struct ExitGuard {
    events: mpsc::UnboundedSender<UnitEvent>,
    exited: Option<oneshot::Sender<ExitStatus>>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let status = if std::thread::panicking() {
            error!("execution unit thread panicked");
            ExitStatus::Panicked
        } else {
            ExitStatus::Clean
        };
        let _ = self.events.send(UnitEvent::Exit(status));
        if let Some(tx) = self.exited.take() {
            let _ = tx.send(status);
        }
    }
}
