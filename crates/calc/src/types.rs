use serde::{Deserialize, Serialize};

/// Task-type tags understood by [`CalculationTarget`](crate::CalculationTarget).
pub mod task_types {
    pub const BMI: &str = "bmi";
    pub const VITAL_TRENDS: &str = "vital_trends";
    pub const STATISTICS: &str = "statistics";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BmiInput {
    pub weight_kg: f64,
    pub height_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmiResult {
    pub bmi: f64,
    pub category: BmiCategory,
}

/// Evenly spaced readings of one vital sign, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalSeries {
    /// e.g. "heart_rate", "systolic_bp".
    pub metric: String,
    pub readings: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalTrend {
    pub metric: String,
    pub direction: TrendDirection,
    /// Least-squares change per reading.
    pub slope: f64,
    pub mean: f64,
    pub latest: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsInput {
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}
