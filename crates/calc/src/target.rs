use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use carepool_compute::{ExecutionTarget, UnitContext};

use crate::types::{
    task_types, BmiCategory, BmiInput, BmiResult, StatisticsInput, Summary, TrendDirection,
    VitalSeries, VitalTrend,
};

/// Execution target for the calculations service. Dispatches on the task-type tag.
#[derive(Debug, Default, Clone, Copy)]
pub struct CalculationTarget;

impl ExecutionTarget for CalculationTarget {
    fn execute(&self, ctx: &UnitContext, task_type: &str, data: Value) -> Result<Value, String> {
        trace!(unit = %ctx.unit_id(), task_type, "running calculation");
        match task_type {
            task_types::BMI => run(data, |input: BmiInput| bmi(&input)),
            task_types::VITAL_TRENDS => run(data, |input: VitalSeries| vital_trend(&input)),
            task_types::STATISTICS => run(data, |input: StatisticsInput| summarize(&input.values)),
            other => Err(format!("unknown task type '{other}'")),
        }
    }
}

/// Decode the payload, compute, encode the result.
fn run<I, O>(data: Value, f: impl FnOnce(I) -> Result<O, String>) -> Result<Value, String>
where
    I: DeserializeOwned,
    O: Serialize,
{
    let input: I = serde_json::from_value(data).map_err(|e| format!("invalid payload: {e}"))?;
    let output = f(input)?;
    serde_json::to_value(output).map_err(|e| format!("unencodable result: {e}"))
}

pub fn bmi(input: &BmiInput) -> Result<BmiResult, String> {
    let positive = |v: f64| v.is_finite() && v > 0.0;
    if !positive(input.weight_kg) || !positive(input.height_m) {
        return Err("weight and height must be positive".into());
    }
    let bmi = input.weight_kg / (input.height_m * input.height_m);
    let category = match bmi {
        b if b < 18.5 => BmiCategory::Underweight,
        b if b < 25.0 => BmiCategory::Normal,
        b if b < 30.0 => BmiCategory::Overweight,
        _ => BmiCategory::Obese,
    };
    Ok(BmiResult {
        bmi: (bmi * 10.0).round() / 10.0,
        category,
    })
}

pub fn vital_trend(series: &VitalSeries) -> Result<VitalTrend, String> {
    let readings = &series.readings;
    let latest = *readings
        .last()
        .ok_or_else(|| format!("no readings for {}", series.metric))?;

    let n = readings.len() as f64;
    let mean = readings.iter().sum::<f64>() / n;

    // Least-squares slope against the reading index
    let x_mean = (n - 1.0) / 2.0;
    let (num, den) = readings
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - mean), den + dx * dx)
        });
    let slope = if den == 0.0 { 0.0 } else { num / den };

    // Changes under 1% of the mean per reading count as flat
    let tolerance = 0.01 * mean.abs().max(1.0);
    let direction = if slope > tolerance {
        TrendDirection::Rising
    } else if slope < -tolerance {
        TrendDirection::Falling
    } else {
        TrendDirection::Stable
    };

    Ok(VitalTrend {
        metric: series.metric.clone(),
        direction,
        slope,
        mean,
        latest,
    })
}

pub fn summarize(values: &[f64]) -> Result<Summary, String> {
    if values.is_empty() {
        return Err("cannot summarize an empty series".into());
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err("series contains non-finite values".into());
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let mean = sorted.iter().sum::<f64>() / count as f64;
    let median = if count % 2 == 0 {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    } else {
        sorted[count / 2]
    };
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

    Ok(Summary {
        count,
        mean,
        median,
        min: sorted[0],
        max: sorted[count - 1],
        std_dev: variance.sqrt(),
    })
}
