//! Batch evaluation of independent scenarios: explicit batches, 2-way
//! sensitivity grids and (with the `monte_carlo` feature) simulations.

pub mod runner;
pub mod sensitivity;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

pub use runner::{
    run_batch, run_batch_with_progress, BatchReport, CancellationToken, RunnerConfig,
    ScenarioResult, ScenarioStatus,
};
pub use sensitivity::{run_sensitivity, OutputMetric, ScenarioParameter, SensitivityInput, SensitivityOutput};

#[cfg(feature = "monte_carlo")]
pub use monte_carlo::{run_monte_carlo, McDistribution, MonteCarloInput, MonteCarloOutput};
