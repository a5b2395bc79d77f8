//! Fixed-size worker pool for typed computational tasks.
//!
//! Tasks are dispatched to execution units (dedicated OS threads) over an
//! encoded request/response protocol with per-task correlation ids. The pool
//! load-balances across units, queues by priority, enforces per-task timeouts,
//! restarts crashed or error-prone units, and drains its queue on shutdown.

pub mod metrics;
pub mod pool;
pub mod protocol;
pub mod queue;
pub mod target;
pub mod task;
pub mod types;
pub mod unit;

pub use carepool_core::{PoolConfig, PoolError};
pub use metrics::PoolMetrics;
pub use pool::WorkerPool;
pub use target::{ExecutionTarget, UnitContext};
pub use task::{TaskHandle, TaskId, TaskOutcome};
pub use types::{PoolState, PoolStats};
pub use unit::ExitStatus;
