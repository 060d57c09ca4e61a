use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use lbo_engine_core::waterfall::{run_waterfall_input, WaterfallInput};

use crate::input;

/// Arguments for the distribution waterfall
#[derive(Args)]
pub struct WaterfallArgs {
    /// Path to JSON/YAML input: contributions, distributions, config
    #[arg(long)]
    pub input: Option<String>,

    /// Annual preferred return
    #[arg(long)]
    pub hurdle_rate: Option<Decimal>,

    /// GP share of the catch-up tier
    #[arg(long)]
    pub catch_up_pct: Option<Decimal>,

    /// GP carried interest share
    #[arg(long)]
    pub carry_pct: Option<Decimal>,

    /// Round allocations to this many decimal places
    #[arg(long)]
    pub rounding_dp: Option<u32>,
}

pub fn run_waterfall(args: WaterfallArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut waterfall_input: WaterfallInput =
        input::load(args.input.as_deref(), "the waterfall")?;

    let config = &mut waterfall_input.config;
    if let Some(rate) = args.hurdle_rate {
        config.hurdle_rate = rate;
    }
    if let Some(pct) = args.catch_up_pct {
        config.catch_up_pct = pct;
    }
    if let Some(pct) = args.carry_pct {
        config.carry_pct = pct;
    }
    if args.rounding_dp.is_some() {
        config.rounding_dp = args.rounding_dp;
    }

    let result = run_waterfall_input(&waterfall_input)?;
    Ok(serde_json::to_value(result)?)
}
