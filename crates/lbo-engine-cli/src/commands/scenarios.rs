use clap::Args;
use serde_json::Value;

use lbo_engine_core::pipeline::ScenarioInput;
use lbo_engine_core::scenarios::{
    self, CancellationToken, MonteCarloInput, OutputMetric, RunnerConfig, SensitivityInput,
};
use lbo_engine_core::SensitivityVariable;

use crate::input;

/// Arguments for sensitivity analysis
#[derive(Args)]
pub struct SensitivityArgs {
    /// Path to a full JSON/YAML sensitivity input (overrides the flags below)
    #[arg(long)]
    pub input: Option<String>,

    /// Path to the base-case scenario input
    #[arg(long)]
    pub base_inputs: Option<String>,

    /// First sensitivity variable in format name:min:max:step
    /// (e.g. "exit_multiple:7:10:0.5")
    #[arg(long)]
    pub var1: Option<String>,

    /// Second sensitivity variable (e.g. "hurdle_rate:0.06:0.10:0.01")
    #[arg(long)]
    pub var2: Option<String>,

    /// Metric tabulated in the grid
    #[arg(long, default_value = "lp_irr")]
    pub metric: String,

    /// Worker threads (defaults to one per core)
    #[arg(long)]
    pub threads: Option<usize>,
}

fn parse_sens_var(spec: &str) -> Result<SensitivityVariable, Box<dyn std::error::Error>> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 4 {
        return Err(format!(
            "Sensitivity variable must be name:min:max:step, got '{}'",
            spec
        )
        .into());
    }
    Ok(SensitivityVariable {
        name: parts[0].to_string(),
        min: parts[1].parse()?,
        max: parts[2].parse()?,
        step: parts[3].parse()?,
    })
}

fn parse_metric(name: &str) -> Result<OutputMetric, Box<dyn std::error::Error>> {
    serde_json::from_value(Value::String(name.to_string())).map_err(|_| {
        format!(
            "Unknown metric '{}'. Available metrics: lp_irr, lp_moic, gp_irr, gp_moic, \
             exit_equity_value, gp_carry",
            name
        )
        .into()
    })
}

pub fn run_sensitivity(args: SensitivityArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut sens_input: SensitivityInput = if let Some(ref path) = args.input {
        input::file::read_input(path)?
    } else {
        let base_path = args
            .base_inputs
            .as_deref()
            .ok_or("--base-inputs is required (or provide --input)")?;
        let base: ScenarioInput = input::file::read_input(base_path)?;
        let var1 = args.var1.as_deref().ok_or("--var1 is required")?;
        let var2 = args.var2.as_deref().ok_or("--var2 is required")?;
        SensitivityInput {
            base,
            variable_1: parse_sens_var(var1)?,
            variable_2: parse_sens_var(var2)?,
            output_metric: parse_metric(&args.metric)?,
            runner: RunnerConfig::default(),
        }
    };
    if args.threads.is_some() {
        sens_input.runner.threads = args.threads;
    }

    let result = scenarios::run_sensitivity(&sens_input, &CancellationToken::new())?;
    Ok(serde_json::to_value(result)?)
}

/// Arguments for Monte Carlo simulation
#[derive(Args)]
pub struct MonteCarloArgs {
    /// Path to JSON/YAML simulation input
    #[arg(long)]
    pub input: Option<String>,

    /// Override the number of simulated scenarios
    #[arg(long)]
    pub simulations: Option<u32>,

    /// Seed for reproducible draws
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker threads (defaults to one per core)
    #[arg(long)]
    pub threads: Option<usize>,
}

pub fn run_monte_carlo(args: MonteCarloArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut mc_input: MonteCarloInput = input::load(args.input.as_deref(), "the simulation")?;
    if let Some(n) = args.simulations {
        mc_input.num_simulations = n;
    }
    if args.seed.is_some() {
        mc_input.seed = args.seed;
    }
    if args.threads.is_some() {
        mc_input.runner.threads = args.threads;
    }

    let result = scenarios::run_monte_carlo(&mc_input, &CancellationToken::new())?;
    Ok(serde_json::to_value(result)?)
}
