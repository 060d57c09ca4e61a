use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Instant;

use crate::error::LboError;
use crate::pipeline::{ScenarioInput, ScenarioOutput};
use crate::types::*;
use crate::LboResult;

use super::runner::{run_batch, CancellationToken, RunnerConfig, ScenarioStatus};

/// Scenario input a sensitivity or simulation variable is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioParameter {
    ExitMultiple,
    HurdleRate,
    CarryPct,
    CatchUpPct,
    SellingCostPct,
    MinimumCash,
    /// Multiplier on every projected EBITDA and free cash flow
    EbitdaScale,
    /// Added to every tranche's interest rate (floored at zero)
    InterestRateShift,
}

impl FromStr for ScenarioParameter {
    type Err = LboError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exit_multiple" => Ok(Self::ExitMultiple),
            "hurdle_rate" => Ok(Self::HurdleRate),
            "carry_pct" => Ok(Self::CarryPct),
            "catch_up_pct" => Ok(Self::CatchUpPct),
            "selling_cost_pct" => Ok(Self::SellingCostPct),
            "minimum_cash" => Ok(Self::MinimumCash),
            "ebitda_scale" => Ok(Self::EbitdaScale),
            "interest_rate_shift" => Ok(Self::InterestRateShift),
            other => Err(LboError::InvalidInput {
                field: format!("variable:{other}"),
                reason: "Unknown scenario parameter".into(),
            }),
        }
    }
}

impl ScenarioParameter {
    /// Overwrite (or scale/shift) the bound input with `value`.
    pub fn apply(self, input: &mut ScenarioInput, value: Decimal) {
        match self {
            Self::ExitMultiple => input.exit.exit_multiple = Some(value),
            Self::HurdleRate => input.waterfall.hurdle_rate = value,
            Self::CarryPct => input.waterfall.carry_pct = value,
            Self::CatchUpPct => input.waterfall.catch_up_pct = value,
            Self::SellingCostPct => input.exit.selling_cost_pct = value,
            Self::MinimumCash => input.schedule.minimum_cash = value,
            Self::EbitdaScale => {
                for period in &mut input.projection {
                    period.ebitda = period.ebitda.map(|e| e * value);
                    period.fcf_before_debt_service =
                        period.fcf_before_debt_service.map(|f| f * value);
                }
            }
            Self::InterestRateShift => {
                for tranche in &mut input.capital_structure.tranches {
                    tranche.interest_rate = (tranche.interest_rate + value).max(Decimal::ZERO);
                }
            }
        }
    }
}

/// Scenario result tabulated in a sensitivity grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMetric {
    LpIrr,
    LpMoic,
    GpIrr,
    GpMoic,
    ExitEquityValue,
    GpCarry,
}

impl OutputMetric {
    pub fn extract(self, output: &ScenarioOutput) -> Option<Decimal> {
        match self {
            Self::LpIrr => output.returns.lp.irr,
            Self::LpMoic => output.returns.lp.moic,
            Self::GpIrr => output.returns.gp.irr,
            Self::GpMoic => output.returns.gp.moic,
            Self::ExitEquityValue => Some(output.exit.equity_value),
            Self::GpCarry => Some(output.waterfall.gp_carry),
        }
    }
}

/// Input for 2-way sensitivity analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityInput {
    /// Base case scenario
    pub base: ScenarioInput,
    /// First variable to sweep (rows); `name` is a scenario parameter
    pub variable_1: SensitivityVariable,
    /// Second variable to sweep (columns)
    pub variable_2: SensitivityVariable,
    pub output_metric: OutputMetric,
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Output of 2-way sensitivity analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityOutput {
    pub variable_1_name: String,
    pub variable_2_name: String,
    pub variable_1_values: Vec<Decimal>,
    pub variable_2_values: Vec<Decimal>,
    pub output_metric: OutputMetric,
    /// Matrix[i][j] = metric when variable_1 = variable_1_values[i], variable_2 = variable_2_values[j];
    /// `None` where the scenario failed, was cancelled or the metric is undefined
    pub matrix: Vec<Vec<Option<Decimal>>>,
    /// Value at the grid point closest to the midpoint of both ranges
    pub base_case_value: Option<Decimal>,
    /// Position of the base case in the matrix (row, col)
    pub base_case_position: (usize, usize),
}

/// Generate the sweep values for a sensitivity variable from min to max with step.
fn generate_sweep_values(var: &SensitivityVariable) -> LboResult<Vec<Decimal>> {
    if var.step <= Decimal::ZERO {
        return Err(LboError::InvalidInput {
            field: format!("variable:{}", var.name),
            reason: "Step must be positive".into(),
        });
    }
    if var.min > var.max {
        return Err(LboError::InvalidInput {
            field: format!("variable:{}", var.name),
            reason: "Min must be <= max".into(),
        });
    }

    let mut values = Vec::new();
    let mut current = var.min;
    while current <= var.max {
        values.push(current);
        current += var.step;
    }
    // Ensure max is included if step doesn't land exactly on it
    if let Some(&last) = values.last() {
        if last < var.max {
            values.push(var.max);
        }
    }

    Ok(values)
}

/// Find the closest index to a target value in a sorted list.
fn closest_index(values: &[Decimal], target: Decimal) -> usize {
    values
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| (**v - target).abs())
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Evaluate the full pipeline over a 2-way grid of scenario parameters.
///
/// Every cell is an independent scenario run through the batch runner, so
/// cells fail (or are cancelled) individually.
pub fn run_sensitivity(
    input: &SensitivityInput,
    token: &CancellationToken,
) -> LboResult<ComputationOutput<SensitivityOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let param_1 = ScenarioParameter::from_str(&input.variable_1.name)?;
    let param_2 = ScenarioParameter::from_str(&input.variable_2.name)?;
    if param_1 == param_2 {
        return Err(LboError::InvalidInput {
            field: "variable_2".into(),
            reason: "Sensitivity variables must be bound to different parameters".into(),
        });
    }
    let v1_values = generate_sweep_values(&input.variable_1)?;
    let v2_values = generate_sweep_values(&input.variable_2)?;

    let mut scenarios: Vec<ScenarioInput> = Vec::with_capacity(v1_values.len() * v2_values.len());
    for v1 in &v1_values {
        for v2 in &v2_values {
            let mut scenario = input.base.clone();
            param_1.apply(&mut scenario, *v1);
            param_2.apply(&mut scenario, *v2);
            scenario.name = format!(
                "{}={v1}, {}={v2}",
                input.variable_1.name, input.variable_2.name
            );
            scenarios.push(scenario);
        }
    }

    let report = run_batch(&scenarios, &input.runner, token)?;

    let mut cells = report.results.into_iter();
    let mut matrix = Vec::with_capacity(v1_values.len());
    for v1 in &v1_values {
        let mut row = Vec::with_capacity(v2_values.len());
        for v2 in &v2_values {
            let value = match cells.next().map(|r| r.status) {
                Some(ScenarioStatus::Completed { output }) => {
                    let value = input.output_metric.extract(&output);
                    if value.is_none() {
                        warnings.push(format!("Metric undefined at ({v1}, {v2})"));
                    }
                    value
                }
                Some(ScenarioStatus::Failed { message, .. }) => {
                    warnings.push(format!("Evaluation failed at ({v1}, {v2}): {message}"));
                    None
                }
                Some(ScenarioStatus::Cancelled) | None => {
                    warnings.push(format!("Evaluation cancelled at ({v1}, {v2})"));
                    None
                }
            };
            row.push(value);
        }
        matrix.push(row);
    }

    let mid1 = (input.variable_1.min + input.variable_1.max) / dec!(2);
    let mid2 = (input.variable_2.min + input.variable_2.max) / dec!(2);
    let base_row = closest_index(&v1_values, mid1);
    let base_col = closest_index(&v2_values, mid2);
    let base_case_value = matrix[base_row][base_col];

    let output = SensitivityOutput {
        variable_1_name: input.variable_1.name.clone(),
        variable_2_name: input.variable_2.name.clone(),
        variable_1_values: v1_values,
        variable_2_values: v2_values,
        output_metric: input.output_metric,
        matrix,
        base_case_value,
        base_case_position: (base_row, base_col),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "2-Way Sensitivity Analysis over the LBO pipeline",
        &serde_json::json!({
            "variable_1": input.variable_1.name,
            "variable_2": input.variable_2.name,
            "output_metric": input.output_metric,
            "threads": input.runner.threads,
        }),
        warnings,
        elapsed,
        output,
    ))
}
