use clap::Args;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use lbo_engine_core::exit::{compute_exit, ExitAssumptions};
use lbo_engine_core::schedule::{self, DebtScheduleInput};

use crate::input;

/// Debt schedule input plus exit assumptions
#[derive(Debug, Deserialize)]
struct ExitRunInput {
    #[serde(flatten)]
    schedule: DebtScheduleInput,
    #[serde(default)]
    exit: ExitAssumptions,
}

/// Arguments for exit valuation
#[derive(Args)]
pub struct ExitArgs {
    /// Path to JSON/YAML input: debt schedule input plus an `exit` section
    #[arg(long)]
    pub input: Option<String>,

    /// EV / EBITDA multiple at exit
    #[arg(long)]
    pub exit_multiple: Option<Decimal>,

    /// Exit at the end of this projection year
    #[arg(long)]
    pub hold_years: Option<u32>,

    /// Selling costs as a fraction of enterprise value
    #[arg(long)]
    pub selling_cost_pct: Option<Decimal>,
}

pub fn run_exit(args: ExitArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut run: ExitRunInput = input::load(args.input.as_deref(), "exit valuation")?;
    if let Some(multiple) = args.exit_multiple {
        run.exit.exit_multiple = Some(multiple);
    }
    if let Some(years) = args.hold_years {
        run.exit.hold_period_years = Some(years);
    }
    if let Some(pct) = args.selling_cost_pct {
        run.exit.selling_cost_pct = pct;
    }

    let schedule = schedule::run_debt_schedule(&run.schedule)?;
    let mut result = compute_exit(&schedule.result.periods, &run.exit)?;
    let mut warnings = schedule.warnings;
    warnings.append(&mut result.warnings);
    result.warnings = warnings;
    Ok(serde_json::to_value(result)?)
}
