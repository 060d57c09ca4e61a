use clap::Args;
use serde_json::Value;

use lbo_engine_core::capital::{build_capital_structure, CapitalStructureConfig};

use crate::input;

/// Arguments for capital structure validation
#[derive(Args)]
pub struct CapitalStructureArgs {
    /// Path to JSON/YAML capital structure config
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_capital_structure(
    args: CapitalStructureArgs,
) -> Result<Value, Box<dyn std::error::Error>> {
    let config: CapitalStructureConfig = input::load(args.input.as_deref(), "capital structure")?;
    let result = build_capital_structure(&config)?;
    Ok(serde_json::to_value(result)?)
}
