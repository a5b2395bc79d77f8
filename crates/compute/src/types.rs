use serde::{Deserialize, Serialize};

/// Pool lifecycle state.
///
/// `Stopped` is re-initializable; it is not a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolState {
    Uninitialized,
    Running,
    ShuttingDown,
    Stopped,
}

/// Point-in-time snapshot returned by [`WorkerPool::stats`](crate::WorkerPool::stats).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Configured number of execution units.
    pub pool_size: usize,
    /// Units with a task dispatched.
    pub active_workers: usize,
    pub idle_workers: usize,
    pub queued_tasks: usize,
    /// Sum of completed round trips over the live units.
    pub total_tasks_processed: u64,
    /// Sum of out-of-band errors over the live units. Restarted units drop out.
    pub total_errors: u64,
    /// Units replaced since the pool was created.
    pub restarts: u64,
    /// Tasks settled by their timeout since the pool was created.
    pub timeouts: u64,
    pub state: PoolState,
}
