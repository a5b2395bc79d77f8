//! Worker pool scheduler -- owns the execution units and the task queue.
//!
//! Split into focused submodules:
//! - `core`: WorkerPool handle, control-plane state, initialization and stats
//! - `dispatch`: submission, dispatch, draining, responses and timeouts
//! - `lifecycle`: unit events, error accounting, restarts and shutdown

mod core;
mod dispatch;
mod lifecycle;
#[cfg(test)]
mod tests;

pub use self::core::WorkerPool;
