//! calc-pool: runs a batch of sample clinical calculations on the worker pool
//! and prints each result followed by the pool stats and metrics.

use std::time::Duration;

use clap::Parser;
use futures::future::join_all;
use serde_json::json;
use tracing::{info, warn};

use carepool_calc::{BmiInput, CalculationsService, VitalSeries};
use carepool_core::{load_dotenv, PoolConfig};

// ── CLI ─────────────────────────────────────────────────────────────

/// Worker pool demo for clinical calculations.
#[derive(Parser, Debug)]
#[command(name = "calc-pool", version, about)]
struct Cli {
    /// Path to a pool TOML config file. Environment defaults apply when unset.
    #[arg(long, env = "CAREPOOL_CONFIG")]
    config: Option<String>,

    /// Number of execution units (overrides config).
    #[arg(long)]
    pool_size: Option<usize>,

    /// Per-task timeout in milliseconds (overrides config).
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Number of sample calculations to submit.
    #[arg(long, default_value_t = 12)]
    tasks: usize,
}

fn load_config(cli: &Cli) -> anyhow::Result<PoolConfig> {
    let mut config = match &cli.config {
        Some(path) => match PoolConfig::from_file(path) {
            Ok(cfg) => {
                info!(path = %path, "loaded pool config");
                cfg
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %path,
                    "failed to load config, using environment defaults"
                );
                PoolConfig::from_env()?
            }
        },
        None => PoolConfig::from_env()?,
    };

    if let Some(size) = cli.pool_size {
        config = config.with_pool_size(size);
    }
    if let Some(ms) = cli.timeout_ms {
        config = config.with_task_timeout(Duration::from_millis(ms));
    }
    config.validate()?;
    Ok(config)
}

// ── Entry point ─────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    config.log_summary();

    let service = CalculationsService::start(config)?;

    let runs = (0..cli.tasks).map(|i| {
        let service = &service;
        async move {
            let step = i as f64;
            let outcome = match i % 3 {
                0 => service
                    .bmi(BmiInput {
                        weight_kg: 55.0 + step * 4.0,
                        height_m: 1.70,
                    })
                    .await
                    .map(|r| json!(r)),
                1 => service
                    .vital_trends(VitalSeries {
                        metric: "heart_rate".into(),
                        readings: (0..6).map(|k| 68.0 + step + k as f64 * (step - 5.0)).collect(),
                    })
                    .await
                    .map(|r| json!(r)),
                _ => service
                    .statistics((0..=i).map(|k| 36.4 + k as f64 * 0.1).collect())
                    .await
                    .map(|r| json!(r)),
            };
            (i, outcome)
        }
    });

    for (i, outcome) in join_all(runs).await {
        match outcome {
            Ok(value) => println!("task {i}: {value}"),
            Err(e) => println!("task {i} failed: {e}"),
        }
    }

    println!("stats: {}", serde_json::to_string_pretty(&service.stats())?);
    println!("metrics: {}", serde_json::to_string_pretty(&service.metrics())?);

    service.shutdown().await;
    info!("calc-pool finished");
    Ok(())
}
