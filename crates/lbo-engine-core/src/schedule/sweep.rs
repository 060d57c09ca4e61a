//! Cash allocation for one solver iteration: revolver draw on a shortfall,
//! otherwise revolver repayment followed by the seniority cascade.

use rust_decimal::Decimal;

use crate::capital::DebtTranche;
use crate::types::Money;

/// Per-tranche state entering the allocation, in sweep priority order.
#[derive(Debug, Clone)]
pub(crate) struct TrancheState<'a> {
    pub tranche: &'a DebtTranche,
    pub beginning: Money,
    pub mandatory: Money,
    /// Fully repaid in an earlier period; never swept again.
    pub retired: bool,
}

impl TrancheState<'_> {
    fn balance_after_mandatory(&self) -> Money {
        (self.beginning - self.mandatory).max(Decimal::ZERO)
    }
}

/// Result of allocating the cash left after interest, fees and mandatory
/// amortisation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CashAllocation {
    pub ending: Vec<Money>,
    /// Mandatory amortisation actually paid (scheduled less any deferral)
    pub mandatory: Vec<Money>,
    pub sweep: Vec<Money>,
    pub draw: Money,
    /// Cash after interest, fees and the amortisation actually paid
    pub cash_before_sweep: Money,
    pub ending_cash: Money,
    /// Part of the shortfall below the floor the revolver could not fund
    pub unfunded_shortfall: Money,
    /// Scheduled amortisation left unpaid for lack of cash
    pub deferred_amortisation: Money,
    /// Interest and fees cash could not cover even with no amortisation
    pub uncovered: Money,
}

/// Allocate `cash_before_sweep` across the tranches.
///
/// Below the floor, the revolver is drawn up to its undrawn commitment and
/// nothing is swept. If cash is still negative, scheduled amortisation is
/// deferred from the most junior tranche upwards until cash is back to zero;
/// whatever remains is reported as `uncovered`. Above the floor, cash in
/// excess of it repays the revolver first, then each unretired tranche takes
/// its sweep percentage of what is still available, capped at its balance.
pub(crate) fn allocate_cash(
    states: &[TrancheState<'_>],
    cash_before_sweep: Money,
    minimum_cash: Money,
) -> CashAllocation {
    let mut ending: Vec<Money> = states.iter().map(|s| s.balance_after_mandatory()).collect();
    let mut mandatory: Vec<Money> = states.iter().map(|s| s.mandatory).collect();
    let mut sweep = vec![Decimal::ZERO; states.len()];

    if cash_before_sweep < minimum_cash {
        let shortfall = minimum_cash - cash_before_sweep;
        let mut draw = Decimal::ZERO;
        if let Some(idx) = states.iter().position(|s| s.tranche.is_revolver()) {
            let headroom =
                (states[idx].tranche.facility_limit() - states[idx].beginning).max(Decimal::ZERO);
            draw = shortfall.min(headroom);
            ending[idx] += draw;
        }

        let mut deficit = (-(cash_before_sweep + draw)).max(Decimal::ZERO);
        let mut deferred = Decimal::ZERO;
        for i in (0..states.len()).rev() {
            if deficit <= Decimal::ZERO {
                break;
            }
            let unpaid = deficit.min(mandatory[i]);
            mandatory[i] -= unpaid;
            ending[i] += unpaid;
            deficit -= unpaid;
            deferred += unpaid;
        }

        let cash_before_sweep = cash_before_sweep + deferred;
        let ending_cash = cash_before_sweep + draw;
        return CashAllocation {
            ending,
            mandatory,
            sweep,
            draw,
            cash_before_sweep,
            ending_cash,
            unfunded_shortfall: (minimum_cash - ending_cash.max(Decimal::ZERO))
                .max(Decimal::ZERO),
            deferred_amortisation: deferred,
            uncovered: deficit,
        };
    }

    let mut available = cash_before_sweep - minimum_cash;
    for (i, state) in states.iter().enumerate() {
        if available <= Decimal::ZERO {
            break;
        }
        if state.retired || ending[i] <= Decimal::ZERO {
            continue;
        }
        let paydown = if state.tranche.is_revolver() {
            available.min(ending[i])
        } else {
            (available * state.tranche.sweep_pct).min(ending[i])
        };
        sweep[i] = paydown;
        ending[i] -= paydown;
        available -= paydown;
    }

    let total_sweep: Money = sweep.iter().copied().sum();
    CashAllocation {
        ending,
        mandatory,
        sweep,
        draw: Decimal::ZERO,
        cash_before_sweep,
        ending_cash: cash_before_sweep - total_sweep,
        unfunded_shortfall: Decimal::ZERO,
        deferred_amortisation: Decimal::ZERO,
        uncovered: Decimal::ZERO,
    }
}
