use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::LboError;
use crate::types::{Money, Rate, Years};
use crate::LboResult;

const CONVERGENCE_THRESHOLD: Decimal = dec!(0.0000001);
const MAX_IRR_ITERATIONS: u32 = 100;
const DAYS_PER_YEAR: Decimal = dec!(365.25);

/// Year fraction between two dates on an actual/365.25 basis.
/// Negative when `to` precedes `from`.
pub fn year_fraction(from: NaiveDate, to: NaiveDate) -> Years {
    Decimal::from((to - from).num_days()) / DAYS_PER_YEAR
}

/// Growth factor `(1 + rate)^years`; 1 for non-positive horizons.
pub fn compound_factor(rate: Rate, years: Years) -> LboResult<Decimal> {
    if years <= Decimal::ZERO || rate.is_zero() {
        return Ok(Decimal::ONE);
    }
    let base = Decimal::ONE + rate;
    if base <= Decimal::ZERO {
        return Err(LboError::InvalidInput {
            field: "rate".into(),
            reason: "Compounding rate must be greater than -100%".into(),
        });
    }
    base.checked_powd(years)
        .ok_or_else(|| LboError::InvalidInput {
            field: "rate".into(),
            reason: format!("Compounding overflow at rate {rate} over {years} years"),
        })
}

/// Net present value of dated cash flows, discounted to the first date.
pub fn xnpv(rate: Rate, dated_flows: &[(NaiveDate, Money)]) -> LboResult<Money> {
    let Some(&(base_date, _)) = dated_flows.first() else {
        return Ok(Decimal::ZERO);
    };
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return Err(LboError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    let mut result = Decimal::ZERO;
    for (date, amount) in dated_flows {
        let years = year_fraction(base_date, *date);
        let discount = one_plus_r.checked_powd(years).ok_or_else(|| LboError::InvalidInput {
            field: "rate".into(),
            reason: format!("Discount factor overflow at rate {rate} over {years} years"),
        })?;
        if discount.is_zero() {
            return Err(LboError::DivisionByZero {
                context: format!("XNPV discount factor at {date}"),
            });
        }
        result = amount
            .checked_div(discount)
            .and_then(|pv| result.checked_add(pv))
            .ok_or_else(|| LboError::InvalidInput {
                field: "rate".into(),
                reason: format!("Present value overflow at rate {rate} on {date}"),
            })?;
    }
    Ok(result)
}

/// Present value of one flow and its derivative with respect to the rate.
/// `None` when any intermediate leaves the representable range.
fn discounted_term(one_plus_r: Decimal, years: Years, amount: Money) -> Option<(Money, Money)> {
    let discount = one_plus_r.checked_powd(years)?;
    if discount.is_zero() {
        return Some((Decimal::ZERO, Decimal::ZERO));
    }
    let pv = amount.checked_div(discount)?;
    let slope = years
        .checked_mul(amount)?
        .checked_div(one_plus_r.checked_mul(discount)?)?;
    Some((pv, -slope))
}

/// Extended IRR for irregular cash flow dates using Newton-Raphson
pub fn xirr(dated_flows: &[(NaiveDate, Money)], guess: Rate) -> LboResult<Rate> {
    if dated_flows.len() < 2 {
        return Err(LboError::InsufficientData(
            "XIRR requires at least 2 cash flows".into(),
        ));
    }
    let has_outflow = dated_flows.iter().any(|(_, a)| *a < Decimal::ZERO);
    let has_inflow = dated_flows.iter().any(|(_, a)| *a > Decimal::ZERO);
    if !has_outflow || !has_inflow {
        return Err(LboError::InsufficientData(
            "XIRR requires both negative and positive cash flows".into(),
        ));
    }

    let base_date = dated_flows[0].0;
    let mut rate = guess;

    for i in 0..MAX_IRR_ITERATIONS {
        let mut npv_val = Decimal::ZERO;
        let mut dnpv = Decimal::ZERO;
        let one_plus_r = Decimal::ONE + rate;

        for (date, amount) in dated_flows {
            let years = year_fraction(base_date, *date);
            let term = discounted_term(one_plus_r, years, *amount).and_then(|(pv, slope)| {
                Some((npv_val.checked_add(pv)?, dnpv.checked_add(slope)?))
            });
            let Some((npv_next, dnpv_next)) = term else {
                // Rate has run to a bound where the flows no longer fit a Decimal
                return Err(LboError::ConvergenceFailure {
                    function: "XIRR".into(),
                    iterations: i,
                    last_delta: npv_val,
                });
            };
            npv_val = npv_next;
            dnpv = dnpv_next;
        }

        if npv_val.abs() < CONVERGENCE_THRESHOLD {
            return Ok(rate);
        }

        if dnpv.is_zero() {
            return Err(LboError::ConvergenceFailure {
                function: "XIRR".into(),
                iterations: i,
                last_delta: npv_val,
            });
        }

        rate = npv_val
            .checked_div(dnpv)
            .and_then(|step| rate.checked_sub(step))
            .ok_or_else(|| LboError::ConvergenceFailure {
                function: "XIRR".into(),
                iterations: i,
                last_delta: npv_val,
            })?;

        // Guard against divergence
        if rate < dec!(-0.99) {
            rate = dec!(-0.99);
        } else if rate > dec!(100.0) {
            rate = dec!(100.0);
        }
    }

    Err(LboError::ConvergenceFailure {
        function: "XIRR".into(),
        iterations: MAX_IRR_ITERATIONS,
        last_delta: xnpv(rate, dated_flows).unwrap_or(Decimal::MAX),
    })
}
