use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde_json::Value;

use lbo_engine_core::schedule::{self, DebtScheduleInput, InterestMode};

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum InterestModeArg {
    /// Interest on the average of opening and closing balances (circular)
    Average,
    /// Interest on opening balances only
    Beginning,
}

impl From<InterestModeArg> for InterestMode {
    fn from(arg: InterestModeArg) -> Self {
        match arg {
            InterestModeArg::Average => InterestMode::AverageBalance,
            InterestModeArg::Beginning => InterestMode::BeginningBalance,
        }
    }
}

/// Arguments for the debt schedule
#[derive(Args)]
pub struct DebtScheduleArgs {
    /// Path to JSON/YAML input: capital_structure, projection, assumptions
    #[arg(long)]
    pub input: Option<String>,

    /// Override the interest basis
    #[arg(long)]
    pub interest_mode: Option<InterestModeArg>,

    /// Override the minimum cash balance
    #[arg(long)]
    pub minimum_cash: Option<Decimal>,

    /// Override the solver iteration cap
    #[arg(long)]
    pub max_iterations: Option<u32>,
}

pub fn run_debt_schedule(args: DebtScheduleArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut schedule_input: DebtScheduleInput =
        input::load(args.input.as_deref(), "the debt schedule")?;

    let assumptions = &mut schedule_input.assumptions;
    if let Some(mode) = args.interest_mode {
        assumptions.solver.interest_mode = mode.into();
    }
    if let Some(cash) = args.minimum_cash {
        assumptions.minimum_cash = cash;
    }
    if let Some(cap) = args.max_iterations {
        assumptions.solver.max_iterations = cap;
    }

    let result = schedule::run_debt_schedule(&schedule_input)?;
    Ok(serde_json::to_value(result)?)
}
