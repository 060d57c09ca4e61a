use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use crate::capital::{build_capital_structure, CapitalStructure, CapitalStructureConfig, TrancheKind};
use crate::error::LboError;
use crate::types::*;
use crate::LboResult;

use super::covenants::{self, Covenant, CovenantBreach};
use super::sweep::{allocate_cash, CashAllocation, TrancheState};

/// Default solver tolerance as a fraction of entry EBITDA
const DEFAULT_RELATIVE_TOLERANCE: Decimal = dec!(0.000001);

fn default_max_iterations() -> u32 {
    100
}

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// One projection year supplied by the operating model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatingPeriod {
    #[serde(default)]
    pub ebitda: Option<Money>,
    /// Free cash flow before interest and principal
    #[serde(default)]
    pub fcf_before_debt_service: Option<Money>,
}

impl OperatingPeriod {
    pub fn new(ebitda: Money, fcf_before_debt_service: Money) -> Self {
        Self {
            ebitda: Some(ebitda),
            fcf_before_debt_service: Some(fcf_before_debt_service),
        }
    }
}

/// Balance on which a period's interest accrues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterestMode {
    /// Average of beginning and ending balance, solved by fixed-point iteration.
    #[default]
    AverageBalance,
    /// Beginning balance only; each period is solved in a single pass.
    BeginningBalance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default)]
    pub interest_mode: InterestMode,
    /// Absolute tolerance on ending balances (default 1e-6 x entry EBITDA)
    #[serde(default)]
    pub tolerance: Option<Money>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            interest_mode: InterestMode::default(),
            tolerance: None,
            max_iterations: default_max_iterations(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleAssumptions {
    /// Cash floor maintained before any sweep
    #[serde(default)]
    pub minimum_cash: Money,
    /// Overrides the cash funded to the balance sheet at close
    #[serde(default)]
    pub opening_cash: Option<Money>,
    #[serde(default)]
    pub covenants: Vec<Covenant>,
    #[serde(default)]
    pub solver: SolverConfig,
}

/// Standalone schedule request: structure, projection and assumptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtScheduleInput {
    pub capital_structure: CapitalStructureConfig,
    pub projection: Vec<OperatingPeriod>,
    #[serde(default)]
    pub assumptions: ScheduleAssumptions,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranchePeriod {
    pub name: String,
    pub kind: TrancheKind,
    pub beginning_balance: Money,
    pub interest: Money,
    pub mandatory_amortisation: Money,
    /// Revolver draw (zero for term tranches)
    pub draw: Money,
    pub sweep: Money,
    pub ending_balance: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PeriodFlag {
    RevolverDraw { amount: Money },
    /// Cash ended below the floor after a full revolver draw; any
    /// amortisation left unpaid to keep cash at zero is carried here
    MinimumCashBreach {
        shortfall: Money,
        #[serde(default)]
        deferred_amortisation: Money,
    },
    CovenantBreach(CovenantBreach),
}

/// Fully solved projection year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub period: u32,
    pub end_date: NaiveDate,
    pub ebitda: Money,
    pub fcf_before_debt_service: Money,
    pub tranches: Vec<TranchePeriod>,
    pub total_interest: Money,
    pub commitment_fee: Money,
    pub total_mandatory: Money,
    pub total_sweep: Money,
    pub revolver_draw: Money,
    pub beginning_cash: Money,
    /// Cash after interest, fees and mandatory amortisation
    pub cash_before_sweep: Money,
    pub ending_cash: Money,
    pub minimum_cash: Money,
    pub total_debt: Money,
    pub net_debt: Money,
    /// `None` when EBITDA is not positive
    pub leverage: Option<Multiple>,
    pub net_leverage: Option<Multiple>,
    /// `None` when there is no interest or fee expense
    pub interest_coverage: Option<Multiple>,
    pub iterations: u32,
    pub residual: Money,
    pub flags: Vec<PeriodFlag>,
}

impl PeriodRecord {
    pub fn has_breach(&self) -> bool {
        self.flags
            .iter()
            .any(|f| !matches!(f, PeriodFlag::RevolverDraw { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrancheSummary {
    pub name: String,
    pub kind: TrancheKind,
    pub original_principal: Money,
    pub final_balance: Money,
    pub total_interest: Money,
    pub total_mandatory: Money,
    pub total_sweep: Money,
    pub total_draws: Money,
    /// First period in which a term tranche reached zero
    pub repaid_in_period: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtScheduleReport {
    pub interest_mode: InterestMode,
    pub periods: Vec<PeriodRecord>,
    pub tranches: Vec<TrancheSummary>,
    pub total_interest: Money,
    pub total_commitment_fees: Money,
    pub total_mandatory: Money,
    pub total_sweep: Money,
    pub total_draws: Money,
    pub final_cash: Money,
    pub final_total_debt: Money,
    /// Periods carrying a cash-floor or covenant breach flag
    pub breach_periods: Vec<u32>,
}

impl DebtScheduleReport {
    pub fn final_period(&self) -> Option<&PeriodRecord> {
        self.periods.last()
    }

    pub fn final_net_debt(&self) -> Money {
        self.final_total_debt - self.final_cash
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct PeriodSolution {
    interest: Vec<Money>,
    commitment_fee: Money,
    allocation: CashAllocation,
    iterations: u32,
    residual: Money,
}

fn interest_basis(mode: InterestMode, beginning: Money, ending: Money) -> Money {
    match mode {
        InterestMode::AverageBalance => (beginning + ending) / dec!(2),
        InterestMode::BeginningBalance => beginning,
    }
}

/// Solve one period's interest / sweep circularity.
///
/// Starting from ending balances net of mandatory amortisation, interest is
/// recomputed on the iterate and cash reallocated until no ending balance
/// moves by more than `tolerance`.
fn solve_period(
    period: u32,
    states: &[TrancheState<'_>],
    opening_cash: Money,
    fcf: Money,
    minimum_cash: Money,
    solver: &SolverConfig,
    tolerance: Money,
) -> LboResult<PeriodSolution> {
    let mode = solver.interest_mode;
    let total_mandatory: Money = states.iter().map(|s| s.mandatory).sum();
    let mut guess: Vec<Money> = states.iter().map(|s| s.beginning - s.mandatory).collect();
    let max_iterations = match mode {
        InterestMode::BeginningBalance => 1,
        InterestMode::AverageBalance => solver.max_iterations,
    };

    let mut residual = Decimal::ZERO;
    for iteration in 1..=max_iterations {
        let mut commitment_fee = Decimal::ZERO;
        let interest: Vec<Money> = states
            .iter()
            .zip(&guess)
            .map(|(s, end)| {
                let basis = interest_basis(mode, s.beginning, *end);
                if s.tranche.is_revolver() {
                    if let Some(fee) = s.tranche.commitment_fee {
                        let undrawn = (s.tranche.facility_limit() - basis).max(Decimal::ZERO);
                        commitment_fee += fee * undrawn;
                    }
                }
                s.tranche.interest_rate * basis
            })
            .collect();
        let total_interest: Money = interest.iter().copied().sum();

        let cash_before_sweep =
            opening_cash + fcf - total_interest - commitment_fee - total_mandatory;
        let allocation = allocate_cash(states, cash_before_sweep, minimum_cash);

        residual = allocation
            .ending
            .iter()
            .zip(&guess)
            .map(|(new, old)| (*new - *old).abs())
            .max()
            .unwrap_or(Decimal::ZERO);

        if mode == InterestMode::BeginningBalance || residual < tolerance {
            if allocation.uncovered > Decimal::ZERO {
                warn!(period, uncovered = %allocation.uncovered, "interest exceeds available cash");
                return Err(LboError::CashShortfall {
                    period,
                    shortfall: allocation.uncovered,
                });
            }
            return Ok(PeriodSolution {
                interest,
                commitment_fee,
                iterations: iteration,
                residual: if mode == InterestMode::BeginningBalance {
                    Decimal::ZERO
                } else {
                    residual
                },
                allocation,
            });
        }
        guess = allocation.ending;
    }

    let last_iterate: Money = guess.iter().copied().sum();
    warn!(period, iterations = max_iterations, %residual, "interest circularity did not converge");
    Err(LboError::NonConvergence {
        period,
        iterations: max_iterations,
        last_iterate,
        residual,
    })
}

fn validate_assumptions(
    structure: &CapitalStructure,
    projection: &[OperatingPeriod],
    assumptions: &ScheduleAssumptions,
) -> LboResult<Vec<(Money, Money)>> {
    if projection.is_empty() {
        return Err(LboError::InsufficientData(
            "Projection must contain at least one period".into(),
        ));
    }
    if assumptions.minimum_cash < Decimal::ZERO {
        return Err(LboError::InvalidInput {
            field: "minimum_cash".into(),
            reason: "Minimum cash cannot be negative".into(),
        });
    }
    if let Some(cash) = assumptions.opening_cash {
        if cash < Decimal::ZERO {
            return Err(LboError::InvalidInput {
                field: "opening_cash".into(),
                reason: "Opening cash cannot be negative".into(),
            });
        }
    }
    if assumptions.solver.max_iterations == 0 {
        return Err(LboError::InvalidInput {
            field: "solver.max_iterations".into(),
            reason: "Iteration cap must be at least 1".into(),
        });
    }
    if let Some(tol) = assumptions.solver.tolerance {
        if tol <= Decimal::ZERO {
            return Err(LboError::InvalidInput {
                field: "solver.tolerance".into(),
                reason: "Solver tolerance must be positive".into(),
            });
        }
    }
    if structure.tranches().is_empty() {
        return Err(LboError::InsufficientData(
            "Capital structure has no debt tranches".into(),
        ));
    }

    projection
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let period = i + 1;
            let ebitda = p.ebitda.ok_or_else(|| {
                LboError::InsufficientData(format!("Period {period}: EBITDA is missing"))
            })?;
            let fcf = p.fcf_before_debt_service.ok_or_else(|| {
                LboError::InsufficientData(format!(
                    "Period {period}: free cash flow before debt service is missing"
                ))
            })?;
            Ok((ebitda, fcf))
        })
        .collect()
}

fn period_end_date(close_date: NaiveDate, period: u32) -> LboResult<NaiveDate> {
    close_date
        .checked_add_months(Months::new(12 * period))
        .ok_or_else(|| LboError::DateError(format!("Period {period} end date is out of range")))
}

fn safe_ratio(numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    (denominator > Decimal::ZERO).then(|| numerator / denominator)
}

/// Project every tranche period by period, resolving the interest/sweep
/// circularity, drawing the revolver on cash shortfalls and testing
/// covenants.
pub fn build_debt_schedule(
    structure: &CapitalStructure,
    projection: &[OperatingPeriod],
    assumptions: &ScheduleAssumptions,
) -> LboResult<ComputationOutput<DebtScheduleReport>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let operating = validate_assumptions(structure, projection, assumptions)?;
    let solver = &assumptions.solver;
    let tolerance = solver
        .tolerance
        .unwrap_or(structure.entry_ebitda() * DEFAULT_RELATIVE_TOLERANCE);
    let minimum_cash = assumptions.minimum_cash;
    let tranches = structure.tranches();

    let mut balances: Vec<Money> = tranches.iter().map(|t| t.principal).collect();
    let mut retired: Vec<bool> = tranches
        .iter()
        .map(|t| !t.is_revolver() && t.principal.is_zero())
        .collect();
    let mut summaries: Vec<TrancheSummary> = tranches
        .iter()
        .map(|t| TrancheSummary {
            name: t.name.clone(),
            kind: t.kind,
            original_principal: t.principal,
            final_balance: t.principal,
            total_interest: Decimal::ZERO,
            total_mandatory: Decimal::ZERO,
            total_sweep: Decimal::ZERO,
            total_draws: Decimal::ZERO,
            repaid_in_period: None,
        })
        .collect();
    let mut cash = assumptions
        .opening_cash
        .unwrap_or_else(|| structure.opening_cash());
    let mut periods: Vec<PeriodRecord> = Vec::with_capacity(operating.len());

    for (idx, (ebitda, fcf)) in operating.into_iter().enumerate() {
        let period = (idx + 1) as u32;

        let states: Vec<TrancheState<'_>> = tranches
            .iter()
            .zip(&balances)
            .zip(&retired)
            .map(|((tranche, beginning), retired)| TrancheState {
                tranche,
                beginning: *beginning,
                mandatory: tranche.scheduled_amortisation().min(*beginning),
                retired: *retired,
            })
            .collect();

        let solution = solve_period(period, &states, cash, fcf, minimum_cash, solver, tolerance)?;
        let alloc = &solution.allocation;

        // ─── Tranche rows ────────────────────────────────────────────
        let mut rows: Vec<TranchePeriod> = Vec::with_capacity(states.len());
        for (i, state) in states.iter().enumerate() {
            let draw = if state.tranche.is_revolver() {
                alloc.draw
            } else {
                Decimal::ZERO
            };
            rows.push(TranchePeriod {
                name: state.tranche.name.clone(),
                kind: state.tranche.kind,
                beginning_balance: state.beginning,
                interest: solution.interest[i],
                mandatory_amortisation: alloc.mandatory[i],
                draw,
                sweep: alloc.sweep[i],
                ending_balance: alloc.ending[i],
            });

            let summary = &mut summaries[i];
            summary.total_interest += solution.interest[i];
            summary.total_mandatory += alloc.mandatory[i];
            summary.total_sweep += alloc.sweep[i];
            summary.total_draws += draw;
            summary.final_balance = alloc.ending[i];
            if !state.tranche.is_revolver()
                && !retired[i]
                && alloc.ending[i] <= Decimal::ZERO
            {
                retired[i] = true;
                summary.repaid_in_period = Some(period);
            }
        }

        // ─── Period metrics ──────────────────────────────────────────
        let total_interest: Money = solution.interest.iter().copied().sum();
        let total_debt: Money = alloc.ending.iter().copied().sum();
        let net_debt = total_debt - alloc.ending_cash;
        let interest_expense = total_interest + solution.commitment_fee;

        let mut flags: Vec<PeriodFlag> = Vec::new();
        if alloc.draw > Decimal::ZERO {
            flags.push(PeriodFlag::RevolverDraw { amount: alloc.draw });
        }
        if alloc.unfunded_shortfall > Decimal::ZERO {
            flags.push(PeriodFlag::MinimumCashBreach {
                shortfall: alloc.unfunded_shortfall,
                deferred_amortisation: alloc.deferred_amortisation,
            });
        }

        let mut record = PeriodRecord {
            period,
            end_date: period_end_date(structure.close_date(), period)?,
            ebitda,
            fcf_before_debt_service: fcf,
            total_interest,
            commitment_fee: solution.commitment_fee,
            total_mandatory: rows.iter().map(|r| r.mandatory_amortisation).sum(),
            total_sweep: alloc.sweep.iter().copied().sum(),
            revolver_draw: alloc.draw,
            beginning_cash: cash,
            cash_before_sweep: alloc.cash_before_sweep,
            ending_cash: alloc.ending_cash,
            minimum_cash,
            total_debt,
            net_debt,
            leverage: safe_ratio(total_debt, ebitda),
            net_leverage: safe_ratio(net_debt, ebitda),
            interest_coverage: (interest_expense > Decimal::ZERO)
                .then(|| ebitda / interest_expense),
            iterations: solution.iterations,
            residual: solution.residual,
            tranches: rows,
            flags,
        };
        let breaches = covenants::find_breaches(&assumptions.covenants, &record);
        record
            .flags
            .extend(breaches.into_iter().map(PeriodFlag::CovenantBreach));

        debug!(
            period,
            iterations = record.iterations,
            total_debt = %record.total_debt,
            ending_cash = %record.ending_cash,
            "period solved"
        );
        for flag in &record.flags {
            match flag {
                PeriodFlag::RevolverDraw { .. } => {}
                PeriodFlag::MinimumCashBreach {
                    shortfall,
                    deferred_amortisation,
                } => {
                    warn!(period, %shortfall, %deferred_amortisation, "minimum cash breached after full revolver draw");
                    warnings.push(format!(
                        "Period {period}: cash below minimum by {shortfall} after full revolver draw"
                    ));
                    if *deferred_amortisation > Decimal::ZERO {
                        warnings.push(format!(
                            "Period {period}: {deferred_amortisation} of scheduled amortisation deferred for lack of cash"
                        ));
                    }
                }
                PeriodFlag::CovenantBreach(b) => {
                    warn!(period, covenant = %b.covenant, "covenant breached");
                    warnings.push(format!(
                        "Period {period}: covenant '{}' breached (actual {}, threshold {})",
                        b.covenant,
                        b.actual.map_or_else(|| "undefined".to_string(), |v| v.to_string()),
                        b.threshold
                    ));
                }
            }
        }

        balances = alloc.ending.clone();
        cash = alloc.ending_cash;
        periods.push(record);
    }

    let report = DebtScheduleReport {
        interest_mode: solver.interest_mode,
        total_interest: periods.iter().map(|p| p.total_interest).sum(),
        total_commitment_fees: periods.iter().map(|p| p.commitment_fee).sum(),
        total_mandatory: periods.iter().map(|p| p.total_mandatory).sum(),
        total_sweep: periods.iter().map(|p| p.total_sweep).sum(),
        total_draws: periods.iter().map(|p| p.revolver_draw).sum(),
        final_cash: cash,
        final_total_debt: balances.iter().copied().sum(),
        breach_periods: periods
            .iter()
            .filter(|p| p.has_breach())
            .map(|p| p.period)
            .collect(),
        tranches: summaries,
        periods,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Multi-tranche debt schedule with circular interest and cash sweep",
        &serde_json::json!({
            "interest_mode": solver.interest_mode,
            "tolerance": tolerance.to_string(),
            "max_iterations": solver.max_iterations,
            "minimum_cash": minimum_cash.to_string(),
            "num_periods": projection.len(),
            "num_covenants": assumptions.covenants.len(),
        }),
        warnings,
        elapsed,
        report,
    ))
}

/// Validate the capital structure, then build its debt schedule.
pub fn run_debt_schedule(
    input: &DebtScheduleInput,
) -> LboResult<ComputationOutput<DebtScheduleReport>> {
    let structure = build_capital_structure(&input.capital_structure)?;
    let mut output = build_debt_schedule(&structure.result, &input.projection, &input.assumptions)?;
    let mut warnings = structure.warnings;
    warnings.append(&mut output.warnings);
    output.warnings = warnings;
    Ok(output)
}
