use clap::Args;
use serde::Deserialize;
use serde_json::Value;

use lbo_engine_core::pipeline::{self, ScenarioInput};
use lbo_engine_core::scenarios::{self, CancellationToken, RunnerConfig};

use crate::input;

/// Arguments for a single end-to-end scenario
#[derive(Args)]
pub struct ScenarioArgs {
    /// Path to JSON/YAML scenario input
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_scenario(args: ScenarioArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let scenario: ScenarioInput = input::load(args.input.as_deref(), "the scenario")?;
    let result = pipeline::run_scenario(&scenario)?;
    Ok(serde_json::to_value(result)?)
}

/// A batch file is either a bare list of scenarios or `{ "scenarios": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchFile {
    List(Vec<ScenarioInput>),
    Wrapped {
        scenarios: Vec<ScenarioInput>,
        #[serde(default)]
        runner: RunnerConfig,
    },
}

/// Arguments for a parallel scenario batch
#[derive(Args)]
pub struct BatchArgs {
    /// Path to JSON/YAML list of scenario inputs
    #[arg(long)]
    pub input: Option<String>,

    /// Worker threads (defaults to one per core)
    #[arg(long)]
    pub threads: Option<usize>,
}

pub fn run_batch(args: BatchArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let file: BatchFile = input::load(args.input.as_deref(), "the batch")?;
    let (inputs, mut runner) = match file {
        BatchFile::List(inputs) => (inputs, RunnerConfig::default()),
        BatchFile::Wrapped { scenarios, runner } => (scenarios, runner),
    };
    if args.threads.is_some() {
        runner.threads = args.threads;
    }

    let report = scenarios::run_batch(&inputs, &runner, &CancellationToken::new())?;
    Ok(serde_json::to_value(report)?)
}
