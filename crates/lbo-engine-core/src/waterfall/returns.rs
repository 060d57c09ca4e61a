use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::time_value;
use crate::types::*;

/// Return metrics for one holder class (or the fund as a whole)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderReturns {
    /// Total capital contributed (positive)
    pub contributed: Money,
    /// Total distributions received
    pub distributed: Money,
    /// Distributed minus contributed
    pub profit: Money,
    /// Multiple on invested capital; `None` without contributions
    pub moic: Option<Multiple>,
    /// Date-weighted IRR; `None` when it cannot be solved
    pub irr: Option<Rate>,
}

/// Return metrics per holder class and for the fund
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnsSummary {
    pub lp: HolderReturns,
    pub gp: HolderReturns,
    pub fund: HolderReturns,
}

fn holder_returns(
    label: &str,
    events: &[&CashFlowEvent],
    warnings: &mut Vec<String>,
) -> HolderReturns {
    let contributed: Money = events
        .iter()
        .filter(|e| e.amount.is_sign_negative())
        .map(|e| e.amount.abs())
        .sum();
    let distributed: Money = events
        .iter()
        .filter(|e| e.amount.is_sign_positive())
        .map(|e| e.amount)
        .sum();

    let moic = (!contributed.is_zero()).then(|| distributed / contributed);

    let mut flows: Vec<(NaiveDate, Money)> = events
        .iter()
        .filter(|e| !e.amount.is_zero())
        .map(|e| (e.date, e.amount))
        .collect();
    flows.sort_by_key(|(date, _)| *date);

    let irr = if contributed.is_zero() {
        None
    } else {
        match time_value::xirr(&flows, dec!(0.10)) {
            Ok(r) => Some(r),
            Err(e) => {
                warnings.push(format!("{label} IRR calculation warning: {e}"));
                None
            }
        }
    };

    HolderReturns {
        contributed,
        distributed,
        profit: distributed - contributed,
        moic,
        irr,
    }
}

/// MOIC and XIRR per holder class from the contribution/distribution ledger.
/// IRR failures are reported as warnings and leave `irr` unset.
pub fn summarise_returns(ledger: &[CashFlowEvent], warnings: &mut Vec<String>) -> ReturnsSummary {
    let lp: Vec<&CashFlowEvent> = ledger
        .iter()
        .filter(|e| e.holder == HolderClass::LP)
        .collect();
    let gp: Vec<&CashFlowEvent> = ledger
        .iter()
        .filter(|e| e.holder == HolderClass::GP)
        .collect();
    let fund: Vec<&CashFlowEvent> = ledger.iter().collect();

    ReturnsSummary {
        lp: holder_returns("LP", &lp, warnings),
        gp: holder_returns("GP", &gp, warnings),
        fund: holder_returns("Fund", &fund, warnings),
    }
}

impl HolderReturns {
    pub fn is_loss(&self) -> bool {
        self.profit < Decimal::ZERO
    }
}
