use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::unit::UnitEvent;

/// The code an execution unit runs.
///
/// One target instance is shared by every unit in a pool, so implementations
/// must be `Send + Sync`. The target dispatches on `task_type` itself; the pool
/// never interprets the tag or the payload.
pub trait ExecutionTarget: Send + Sync + 'static {
    /// Run one task to completion on the calling unit thread.
    ///
    /// `Err` becomes a failure response for this task only. Panicking takes the
    /// whole unit down and triggers a restart.
    fn execute(&self, ctx: &UnitContext, task_type: &str, data: Value) -> Result<Value, String>;
}

impl<F> ExecutionTarget for F
where
    F: Fn(&UnitContext, &str, Value) -> Result<Value, String> + Send + Sync + 'static,
{
    fn execute(&self, ctx: &UnitContext, task_type: &str, data: Value) -> Result<Value, String> {
        self(ctx, task_type, data)
    }
}

/// Per-unit handle passed to [`ExecutionTarget::execute`].
#[derive(Debug, Clone)]
pub struct UnitContext {
    unit_id: Uuid,
    events: mpsc::UnboundedSender<UnitEvent>,
}

impl UnitContext {
    pub(crate) fn new(unit_id: Uuid, events: mpsc::UnboundedSender<UnitEvent>) -> Self {
        Self { unit_id, events }
    }

    pub fn unit_id(&self) -> Uuid {
        self.unit_id
    }

    /// Report a malfunction that is not tied to the current task's response.
    ///
    /// Counts toward the unit's error threshold.
    pub fn report_error(&self, message: impl Into<String>) {
        let _ = self.events.send(UnitEvent::Error(message.into()));
    }

    pub(crate) fn send(&self, event: UnitEvent) -> bool {
        self.events.send(event).is_ok()
    }
}
