//! End-to-end evaluation of one LBO scenario.
//!
//! Capital structure -> debt schedule -> exit valuation -> waterfall. The
//! result is a pure function of the input: no timing or other run-specific
//! data is carried in [`ScenarioOutput`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capital::{build_capital_structure, CapitalStructure, CapitalStructureConfig};
use crate::error::LboError;
use crate::exit::{compute_exit, ExitAssumptions, ExitEvent};
use crate::schedule::{build_debt_schedule, DebtScheduleReport, OperatingPeriod, ScheduleAssumptions};
use crate::types::Money;
use crate::waterfall::{run_waterfall, ProceedsEvent, ReturnsSummary, WaterfallBreakdown, WaterfallConfig};
use crate::LboResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioInput {
    #[serde(default)]
    pub name: String,
    pub capital_structure: CapitalStructureConfig,
    pub projection: Vec<OperatingPeriod>,
    #[serde(default)]
    pub schedule: ScheduleAssumptions,
    pub exit: ExitAssumptions,
    pub waterfall: WaterfallConfig,
    /// Distributions before exit (e.g. from a partial realisation)
    #[serde(default)]
    pub interim_distributions: Vec<ProceedsEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutput {
    pub name: String,
    pub capital_structure: CapitalStructure,
    pub schedule: DebtScheduleReport,
    pub exit: ExitEvent,
    pub waterfall: WaterfallBreakdown,
    pub returns: ReturnsSummary,
    pub warnings: Vec<String>,
}

impl ScenarioOutput {
    pub fn exit_equity_value(&self) -> Money {
        self.exit.equity_value
    }
}

/// Run the full pipeline for one scenario.
pub fn run_scenario(input: &ScenarioInput) -> LboResult<ScenarioOutput> {
    let mut warnings: Vec<String> = Vec::new();

    let structure = build_capital_structure(&input.capital_structure)?;
    warnings.extend(structure.warnings);
    let structure = structure.result;

    if input.exit.hold_period_years == Some(0) {
        return Err(LboError::InvalidInput {
            field: "hold_period_years".into(),
            reason: "Hold period must be at least one year".into(),
        });
    }
    let hold = input
        .exit
        .hold_period_years
        .map_or(input.projection.len(), |h| h as usize);
    let horizon = &input.projection[..hold.min(input.projection.len())];

    let schedule = build_debt_schedule(&structure, horizon, &input.schedule)?;
    warnings.extend(schedule.warnings);
    let schedule = schedule.result;

    let exit = compute_exit(&schedule.periods, &input.exit)?;
    warnings.extend(exit.warnings);
    let exit = exit.result;

    if let Some(late) = input
        .interim_distributions
        .iter()
        .find(|d| d.date > exit.exit_date)
    {
        return Err(LboError::InvalidInput {
            field: "interim_distributions".into(),
            reason: format!(
                "Interim distribution on {} falls after the exit date {}",
                late.date, exit.exit_date
            ),
        });
    }
    let mut distributions = input.interim_distributions.clone();
    distributions.push(ProceedsEvent {
        date: exit.exit_date,
        amount: exit.distributable_proceeds,
        label: Some("Exit".into()),
    });

    let waterfall = run_waterfall(
        &structure.contribution_events(),
        &distributions,
        &input.waterfall,
    )?;
    warnings.extend(waterfall.warnings);
    let waterfall = waterfall.result;

    debug!(
        scenario = %input.name,
        equity_value = %exit.equity_value,
        lp_moic = ?waterfall.returns.lp.moic,
        "scenario evaluated"
    );

    Ok(ScenarioOutput {
        name: input.name.clone(),
        capital_structure: structure,
        schedule,
        exit,
        waterfall: waterfall.breakdown,
        returns: waterfall.returns,
        warnings,
    })
}
