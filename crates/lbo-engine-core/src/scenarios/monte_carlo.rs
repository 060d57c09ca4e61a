use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::distribution::{LogNormal, Normal, Triangular, Uniform};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::error::LboError;
use crate::pipeline::ScenarioInput;
use crate::types::{ComputationMetadata, ComputationOutput};
use crate::LboResult;

use super::runner::{run_batch, CancellationToken, RunnerConfig, ScenarioStatus};
use super::sensitivity::ScenarioParameter;

// ---------------------------------------------------------------------------
// Helper: build ComputationOutput for f64 statistics
// ---------------------------------------------------------------------------

fn with_metadata_f64<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Probability distribution specification for a simulated input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum McDistribution {
    Normal { mean: f64, std_dev: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Triangular { min: f64, mode: f64, max: f64 },
    Uniform { min: f64, max: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloInput {
    pub base: ScenarioInput,
    /// Number of simulated scenarios
    #[serde(default = "default_num_simulations")]
    pub num_simulations: u32,
    /// Optional seed for reproducibility.
    pub seed: Option<u64>,
    #[serde(default)]
    pub exit_multiple: Option<McDistribution>,
    /// Multiplier on projected EBITDA and free cash flow
    #[serde(default)]
    pub ebitda_scale: Option<McDistribution>,
    /// Parallel shift added to every tranche's interest rate
    #[serde(default)]
    pub rate_shift: Option<McDistribution>,
    #[serde(default)]
    pub runner: RunnerConfig,
}

fn default_num_simulations() -> u32 {
    1_000
}

const MAX_SIMULATIONS: u32 = 100_000;

/// Percentile summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McPercentiles {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McStatistics {
    /// Paths on which the metric was defined
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: McPercentiles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloOutput {
    pub num_simulations: u32,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Failed paths by error kind
    pub failures_by_kind: BTreeMap<String, usize>,
    pub lp_irr: Option<McStatistics>,
    pub lp_moic: Option<McStatistics>,
    pub exit_equity_value: Option<McStatistics>,
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Sample a single value from the given distribution using the provided RNG.
fn sample(rng: &mut StdRng, dist: &McDistribution) -> LboResult<f64> {
    match dist {
        McDistribution::Normal { mean, std_dev } => {
            let n = Normal::new(*mean, *std_dev).map_err(|e| LboError::InvalidInput {
                field: "distribution".into(),
                reason: format!("Invalid Normal parameters: {e}"),
            })?;
            Ok(rng.sample(n))
        }
        McDistribution::LogNormal { mu, sigma } => {
            let ln = LogNormal::new(*mu, *sigma).map_err(|e| LboError::InvalidInput {
                field: "distribution".into(),
                reason: format!("Invalid LogNormal parameters: {e}"),
            })?;
            Ok(rng.sample(ln))
        }
        McDistribution::Triangular { min, mode, max } => {
            let t = Triangular::new(*min, *max, *mode).map_err(|e| LboError::InvalidInput {
                field: "distribution".into(),
                reason: format!("Invalid Triangular parameters: {e}"),
            })?;
            Ok(rng.sample(t))
        }
        McDistribution::Uniform { min, max } => {
            let u = Uniform::new(*min, *max).map_err(|e| LboError::InvalidInput {
                field: "distribution".into(),
                reason: format!("Invalid Uniform parameters: {e}"),
            })?;
            Ok(rng.sample(u))
        }
    }
}

fn to_decimal(value: f64, field: &str) -> LboResult<Decimal> {
    Decimal::from_f64(value).ok_or_else(|| LboError::InvalidInput {
        field: field.into(),
        reason: format!("Sampled value {value} is not representable"),
    })
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Percentile of a sorted, non-empty slice using linear interpolation.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

fn compute_statistics(mut values: Vec<f64>) -> Option<McStatistics> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    Some(McStatistics {
        count: values.len(),
        mean,
        std_dev: variance.sqrt(),
        min: values[0],
        max: values[values.len() - 1],
        percentiles: McPercentiles {
            p5: percentile_sorted(&values, 5.0),
            p10: percentile_sorted(&values, 10.0),
            p25: percentile_sorted(&values, 25.0),
            p50: percentile_sorted(&values, 50.0),
            p75: percentile_sorted(&values, 75.0),
            p90: percentile_sorted(&values, 90.0),
            p95: percentile_sorted(&values, 95.0),
        },
    })
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Simulate the LBO pipeline under uncertain exit multiple, operating
/// performance and interest rates.
///
/// Draws are generated serially from the seed before any scenario runs, so a
/// seeded simulation is reproducible for any thread count.
pub fn run_monte_carlo(
    input: &MonteCarloInput,
    token: &CancellationToken,
) -> LboResult<ComputationOutput<MonteCarloOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.num_simulations == 0 || input.num_simulations > MAX_SIMULATIONS {
        return Err(LboError::InvalidInput {
            field: "num_simulations".into(),
            reason: format!("Must be between 1 and {MAX_SIMULATIONS}"),
        });
    }
    let bindings: Vec<(ScenarioParameter, &McDistribution)> = [
        (ScenarioParameter::ExitMultiple, input.exit_multiple.as_ref()),
        (ScenarioParameter::EbitdaScale, input.ebitda_scale.as_ref()),
        (ScenarioParameter::InterestRateShift, input.rate_shift.as_ref()),
    ]
    .into_iter()
    .filter_map(|(param, dist)| dist.map(|d| (param, d)))
    .collect();
    if bindings.is_empty() {
        return Err(LboError::InsufficientData(
            "At least one simulated variable is required".into(),
        ));
    }

    let mut rng = match input.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let mut scenarios: Vec<ScenarioInput> = Vec::with_capacity(input.num_simulations as usize);
    for path in 0..input.num_simulations {
        let mut scenario = input.base.clone();
        for (param, dist) in &bindings {
            let value = to_decimal(sample(&mut rng, dist)?, "distribution")?;
            param.apply(&mut scenario, value);
        }
        scenario.name = format!("path {path}");
        scenarios.push(scenario);
    }

    let report = run_batch(&scenarios, &input.runner, token)?;

    let mut lp_irr = Vec::new();
    let mut lp_moic = Vec::new();
    let mut exit_equity = Vec::new();
    let mut failures_by_kind: BTreeMap<String, usize> = BTreeMap::new();
    for result in &report.results {
        match &result.status {
            ScenarioStatus::Completed { output } => {
                if let Some(v) = output.returns.lp.irr.and_then(|r| r.to_f64()) {
                    lp_irr.push(v);
                }
                if let Some(v) = output.returns.lp.moic.and_then(|m| m.to_f64()) {
                    lp_moic.push(v);
                }
                if let Some(v) = output.exit.equity_value.to_f64() {
                    exit_equity.push(v);
                }
            }
            ScenarioStatus::Failed { kind, .. } => {
                *failures_by_kind.entry(kind.clone()).or_insert(0) += 1;
            }
            ScenarioStatus::Cancelled => {}
        }
    }
    if report.failed > 0 {
        warnings.push(format!(
            "{} of {} paths failed",
            report.failed, input.num_simulations
        ));
    }
    if report.cancelled > 0 {
        warnings.push(format!("{} paths cancelled", report.cancelled));
    }

    let output = MonteCarloOutput {
        num_simulations: input.num_simulations,
        completed: report.completed,
        failed: report.failed,
        cancelled: report.cancelled,
        failures_by_kind,
        lp_irr: compute_statistics(lp_irr),
        lp_moic: compute_statistics(lp_moic),
        exit_equity_value: compute_statistics(exit_equity),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Monte Carlo simulation of the LBO pipeline",
        &serde_json::json!({
            "num_simulations": input.num_simulations,
            "seed": input.seed,
            "variables": bindings.iter().map(|(p, _)| p).collect::<Vec<_>>(),
        }),
        warnings,
        elapsed,
        output,
    ))
}
