//! Clinical calculations (BMI, vital-sign trends, descriptive statistics)
//! executed on a [`carepool_compute::WorkerPool`].

pub mod service;
pub mod target;
pub mod types;

pub use service::{CalcError, CalculationsService};
pub use target::CalculationTarget;
pub use types::*;
