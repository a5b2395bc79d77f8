use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PoolError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

// ── Pool config ───────────────────────────────────────────────

/// Worker pool configuration, typically parsed from TOML.
///
/// Every field has a default, so an empty document is a valid config.
/// Environment variables override file values:
/// - `CAREPOOL_POOL_SIZE` -> `pool_size`
/// - `CAREPOOL_TASK_TIMEOUT_MS` -> `task_timeout_ms`
/// - `CAREPOOL_ERROR_THRESHOLD` -> `error_threshold`
/// - `CAREPOOL_TERMINATE_TIMEOUT_MS` -> `terminate_timeout_ms`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of execution units. 0 = max(2, available cores - 1).
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Per-task timeout, measured from dispatch.
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
    /// A unit is restarted once its error count goes above this value.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
    /// How long shutdown waits for each unit to exit.
    #[serde(default = "default_terminate_timeout_ms")]
    pub terminate_timeout_ms: u64,
}

fn default_pool_size() -> usize { 0 }
fn default_task_timeout_ms() -> u64 { 30_000 }
fn default_error_threshold() -> u32 { 5 }
fn default_terminate_timeout_ms() -> u64 { 5_000 }

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            task_timeout_ms: default_task_timeout_ms(),
            error_threshold: default_error_threshold(),
            terminate_timeout_ms: default_terminate_timeout_ms(),
        }
    }
}

impl PoolConfig {
    /// Parse config from a TOML string, then apply env overrides and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, PoolError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PoolError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Build config from defaults plus environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, PoolError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override pool size, builder style.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Override the per-task timeout, builder style.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Override the error threshold, builder style.
    pub fn with_error_threshold(mut self, threshold: u32) -> Self {
        self.error_threshold = threshold;
        self
    }

    /// Resolve the unit count (0 means derive from available parallelism).
    pub fn resolved_pool_size(&self) -> usize {
        if self.pool_size == 0 {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            cores.saturating_sub(1).max(2)
        } else {
            self.pool_size
        }
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }

    /// Reject configs the pool cannot run with.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.task_timeout_ms == 0 {
            return Err(PoolError::Config("task_timeout_ms must be greater than 0".into()));
        }
        if self.terminate_timeout_ms == 0 {
            return Err(PoolError::Config(
                "terminate_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            pool_size = self.resolved_pool_size(),
            task_timeout_ms = self.task_timeout_ms,
            error_threshold = self.error_threshold,
            terminate_timeout_ms = self.terminate_timeout_ms,
            "pool config loaded"
        );
    }

    // ── Environment variable overrides ──────────────────────────────

    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(env_opt);
    }

    /// Apply overrides from an arbitrary lookup. Unparseable values are ignored.
    pub(crate) fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("CAREPOOL_POOL_SIZE").and_then(|v| v.parse().ok()) {
            self.pool_size = v;
        }
        if let Some(v) = lookup("CAREPOOL_TASK_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.task_timeout_ms = v;
        }
        if let Some(v) = lookup("CAREPOOL_ERROR_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.error_threshold = v;
        }
        if let Some(v) = lookup("CAREPOOL_TERMINATE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.terminate_timeout_ms = v;
        }
    }
}
