use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use carepool_compute::{PoolConfig, PoolError, PoolMetrics, PoolStats, WorkerPool};

use crate::target::CalculationTarget;
use crate::types::{
    task_types, BmiInput, BmiResult, StatisticsInput, Summary, VitalSeries, VitalTrend,
};

#[derive(Debug, Error)]
pub enum CalcError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("failed to encode calculation input: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode calculation result: {0}")]
    Decode(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CalcError>;

/// Typed front-end over a [`WorkerPool`] running [`CalculationTarget`].
pub struct CalculationsService {
    pool: WorkerPool,
}

impl CalculationsService {
    /// Build the pool and start its units. Must be called inside a Tokio runtime.
    pub fn start(config: PoolConfig) -> Result<Self> {
        let pool = WorkerPool::new(config, CalculationTarget);
        pool.initialize()?;
        info!(units = pool.unit_ids().len(), "calculations service started");
        Ok(Self { pool })
    }

    pub async fn bmi(&self, input: BmiInput) -> Result<BmiResult> {
        self.run(task_types::BMI, &input, 0).await
    }

    /// Trend analysis runs ahead of routine work.
    pub async fn vital_trends(&self, series: VitalSeries) -> Result<VitalTrend> {
        self.run(task_types::VITAL_TRENDS, &series, 1).await
    }

    pub async fn statistics(&self, values: Vec<f64>) -> Result<Summary> {
        self.run(task_types::STATISTICS, &StatisticsInput { values }, 0)
            .await
    }

    /// Submit any serializable input under `task_type` and decode the result.
    pub async fn run<I, O>(&self, task_type: &str, input: &I, priority: i32) -> Result<O>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let payload = serde_json::to_value(input).map_err(CalcError::Encode)?;
        let handle = self.pool.submit(task_type, payload, priority)?;
        debug!(task_id = handle.id(), task_type, priority, "calculation submitted");
        let value = handle.await?;
        serde_json::from_value(value).map_err(CalcError::Decode)
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn metrics(&self) -> PoolMetrics {
        self.pool.metrics()
    }

    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
