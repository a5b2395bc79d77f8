use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-task-type pool metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolMetrics {
    /// Round trips that came back with a success response, by task type.
    pub tasks_succeeded: HashMap<String, u64>,
    /// Round trips that came back with a failure response, by task type.
    pub tasks_failed: HashMap<String, u64>,
    /// Tasks settled by their timeout, by task type.
    pub tasks_timed_out: HashMap<String, u64>,
    /// Average dispatch-to-response duration by task type.
    pub avg_round_trip: HashMap<String, Duration>,
    /// Average submit-to-dispatch wait by task type.
    pub avg_queue_wait: HashMap<String, Duration>,
    /// Last response time by task type.
    pub last_completed: HashMap<String, DateTime<Utc>>,
    /// Dispatch count per task type, used for the queue-wait mean.
    #[serde(skip)]
    dispatched: HashMap<String, u64>,
}

/// Incremental mean: new_avg = prev_avg + (sample - prev_avg) / count
fn rolling_mean(prev: Duration, sample: Duration, count: u64) -> Duration {
    if count <= 1 {
        return sample;
    }
    let prev_nanos = prev.as_nanos() as f64;
    let cur_nanos = sample.as_nanos() as f64;
    let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
    Duration::from_nanos(avg_nanos as u64)
}

impl PoolMetrics {
    /// Record a task leaving the queue (or bypassing it) for a unit.
    pub fn record_dispatch(&mut self, task_type: &str, queue_wait: Duration) {
        let count = {
            let c = self.dispatched.entry(task_type.to_string()).or_default();
            *c += 1;
            *c
        };
        let prev = self.avg_queue_wait.get(task_type).copied().unwrap_or_default();
        self.avg_queue_wait
            .insert(task_type.to_string(), rolling_mean(prev, queue_wait, count));
    }

    /// Record a response received for a live task.
    pub fn record_round_trip(&mut self, task_type: &str, duration: Duration, success: bool) {
        let bucket = if success {
            &mut self.tasks_succeeded
        } else {
            &mut self.tasks_failed
        };
        *bucket.entry(task_type.to_string()).or_default() += 1;
        self.last_completed.insert(task_type.to_string(), Utc::now());

        let count = self.round_trips(task_type);
        let prev = self.avg_round_trip.get(task_type).copied().unwrap_or_default();
        self.avg_round_trip
            .insert(task_type.to_string(), rolling_mean(prev, duration, count));
    }

    pub fn record_timeout(&mut self, task_type: &str) {
        *self.tasks_timed_out.entry(task_type.to_string()).or_default() += 1;
    }

    /// Responses received for a task type, successful or not.
    pub fn round_trips(&self, task_type: &str) -> u64 {
        self.tasks_succeeded.get(task_type).copied().unwrap_or(0)
            + self.tasks_failed.get(task_type).copied().unwrap_or(0)
    }
}
