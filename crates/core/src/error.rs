use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the worker pool and its configuration layer.
///
/// Task-level variants (`TaskTimeout`, `TaskFailed`, `Protocol`) reach the
/// submitting caller through the task's completion handle. Unit-level variants
/// (`UnitError`, `UnitExit`) are handled inside the pool and only show up in logs
/// and termination results.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("worker pool is not initialized")]
    PoolNotReady,

    #[error("worker pool is shutting down")]
    PoolShuttingDown,

    #[error("task timed out after {0:?}")]
    TaskTimeout(Duration),

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("execution unit error: {0}")]
    UnitError(String),

    #[error("execution unit exited: {0}")]
    UnitExit(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("no Tokio runtime available: {0}")]
    Runtime(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
}

impl PoolError {
    /// Whether resubmitting the same task may succeed.
    ///
    /// Only timeouts qualify; `PoolNotReady`/`PoolShuttingDown` are terminal for
    /// the call that received them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::TaskTimeout(_))
    }
}
