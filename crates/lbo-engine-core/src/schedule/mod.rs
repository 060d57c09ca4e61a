//! Debt schedule engine: per-period interest, mandatory amortisation,
//! revolver draws, the seniority-ordered cash sweep and covenant tests.

pub mod covenants;
pub mod engine;
mod sweep;

pub use covenants::{Covenant, CovenantBreach, CovenantDirection, CovenantMetric};
pub use engine::{
    build_debt_schedule, run_debt_schedule, DebtScheduleInput, DebtScheduleReport, InterestMode,
    OperatingPeriod, PeriodFlag, PeriodRecord, ScheduleAssumptions, SolverConfig, TranchePeriod,
    TrancheSummary,
};
