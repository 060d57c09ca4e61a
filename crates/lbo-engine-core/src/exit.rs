use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::LboError;
use crate::schedule::PeriodRecord;
use crate::types::*;
use crate::LboResult;

/// Exit assumptions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitAssumptions {
    /// EV / EBITDA multiple applied to exit-year EBITDA
    #[serde(default)]
    pub exit_multiple: Option<Multiple>,
    /// Transaction costs on sale as a fraction of enterprise value
    #[serde(default)]
    pub selling_cost_pct: Rate,
    /// Exit at the end of this projection year; the last period when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_period_years: Option<u32>,
}

/// Terminal valuation of the equity at exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitEvent {
    pub period: u32,
    pub exit_date: NaiveDate,
    pub exit_ebitda: Money,
    pub exit_multiple: Multiple,
    pub enterprise_value: Money,
    pub selling_costs: Money,
    pub total_debt: Money,
    pub cash: Money,
    pub net_debt: Money,
    /// May be negative when debt exceeds value
    pub equity_value: Money,
    /// Equity value floored at zero
    pub distributable_proceeds: Money,
}

/// Value the business at the end of the hold period.
///
/// EV = EBITDA x multiple; equity = EV - net debt - selling costs.
pub fn compute_exit(
    periods: &[PeriodRecord],
    assumptions: &ExitAssumptions,
) -> LboResult<ComputationOutput<ExitEvent>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let exit_multiple = assumptions
        .exit_multiple
        .ok_or_else(|| LboError::InsufficientData("Exit multiple is required".into()))?;
    if exit_multiple <= Decimal::ZERO {
        return Err(LboError::InvalidInput {
            field: "exit_multiple".into(),
            reason: "Exit multiple must be positive".into(),
        });
    }
    if assumptions.selling_cost_pct < Decimal::ZERO || assumptions.selling_cost_pct >= Decimal::ONE
    {
        return Err(LboError::InvalidInput {
            field: "selling_cost_pct".into(),
            reason: "Selling costs must be in [0, 1)".into(),
        });
    }

    let hold = match assumptions.hold_period_years {
        Some(0) => {
            return Err(LboError::InvalidInput {
                field: "hold_period_years".into(),
                reason: "Hold period must be at least one year".into(),
            })
        }
        Some(years) => years as usize,
        None => periods.len(),
    };
    let record = periods.get(hold.wrapping_sub(1)).ok_or_else(|| {
        LboError::InsufficientData(format!(
            "Hold period of {hold} years is not covered by a projection of {} periods",
            periods.len()
        ))
    })?;

    let enterprise_value = record.ebitda * exit_multiple;
    let selling_costs = enterprise_value * assumptions.selling_cost_pct;
    let net_debt = record.total_debt - record.ending_cash;
    let equity_value = enterprise_value - net_debt - selling_costs;

    if record.ebitda <= Decimal::ZERO {
        warnings.push(format!(
            "Exit EBITDA is not positive ({}); enterprise value is {enterprise_value}",
            record.ebitda
        ));
    }
    if equity_value < Decimal::ZERO {
        warnings.push(format!(
            "Equity is underwater at exit ({equity_value}); no proceeds to distribute"
        ));
    }

    let output = ExitEvent {
        period: record.period,
        exit_date: record.end_date,
        exit_ebitda: record.ebitda,
        exit_multiple,
        enterprise_value,
        selling_costs,
        total_debt: record.total_debt,
        cash: record.ending_cash,
        net_debt,
        equity_value,
        distributable_proceeds: equity_value.max(Decimal::ZERO),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Exit valuation: EV/EBITDA multiple less net debt and selling costs",
        &serde_json::json!({
            "exit_multiple": exit_multiple.to_string(),
            "selling_cost_pct": assumptions.selling_cost_pct.to_string(),
            "exit_period": record.period,
        }),
        warnings,
        elapsed,
        output,
    ))
}
