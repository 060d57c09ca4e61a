#![cfg(feature = "scenarios")]

use chrono::NaiveDate;
use lbo_engine_core::capital::{
    CapitalStructureConfig, DebtTranche, EquityTranche, TrancheKind, UsesOfFunds,
};
use lbo_engine_core::exit::ExitAssumptions;
use lbo_engine_core::pipeline::{run_scenario, ScenarioInput};
use lbo_engine_core::scenarios::{
    run_batch, run_batch_with_progress, run_sensitivity, CancellationToken, OutputMetric,
    RunnerConfig, ScenarioStatus, SensitivityInput,
};
use lbo_engine_core::schedule::{OperatingPeriod, ScheduleAssumptions};
use lbo_engine_core::waterfall::{ProceedsEvent, WaterfallConfig};
use lbo_engine_core::{HolderClass, LboError, Money, SensitivityVariable};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn term(name: &str, principal: Money, rate: Decimal, sweep: Decimal, seniority: u32) -> DebtTranche {
    DebtTranche {
        name: name.into(),
        principal,
        interest_rate: rate,
        amortisation_rate: dec!(0.02),
        sweep_pct: sweep,
        seniority,
        kind: TrancheKind::Term,
        commitment: None,
        commitment_fee: None,
    }
}

fn base_scenario() -> ScenarioInput {
    ScenarioInput {
        name: "Base".into(),
        capital_structure: CapitalStructureConfig {
            close_date: ymd(2020, 1, 1),
            entry_ebitda: dec!(100),
            tranches: vec![
                DebtTranche {
                    kind: TrancheKind::Revolver,
                    principal: Decimal::ZERO,
                    amortisation_rate: Decimal::ZERO,
                    commitment: Some(dec!(40)),
                    ..term("Revolver", Decimal::ZERO, dec!(0.05), Decimal::ZERO, 1)
                },
                term("TLB", dec!(350), dec!(0.07), dec!(0.75), 1),
                term("Notes", dec!(150), dec!(0.09), Decimal::ZERO, 2),
            ],
            equity: vec![
                EquityTranche {
                    name: "Fund".into(),
                    holder: HolderClass::LP,
                    amount: dec!(490),
                    date: ymd(2020, 1, 1),
                },
                EquityTranche {
                    name: "Sponsor".into(),
                    holder: HolderClass::GP,
                    amount: dec!(10),
                    date: ymd(2020, 1, 1),
                },
            ],
            uses: UsesOfFunds {
                purchase_enterprise_value: dec!(980),
                transaction_fees: Some(dec!(10)),
                financing_fees: None,
                cash_to_balance_sheet: Some(dec!(10)),
            },
            leverage_targets: None,
            rounding_tolerance: dec!(0.01),
        },
        projection: [
            (dec!(100), dec!(45)),
            (dec!(106), dec!(50)),
            (dec!(112), dec!(56)),
            (dec!(119), dec!(62)),
            (dec!(126), dec!(68)),
        ]
        .into_iter()
        .map(|(ebitda, fcf)| OperatingPeriod::new(ebitda, fcf))
        .collect(),
        schedule: ScheduleAssumptions {
            minimum_cash: dec!(10),
            ..ScheduleAssumptions::default()
        },
        exit: ExitAssumptions {
            exit_multiple: Some(dec!(8)),
            selling_cost_pct: dec!(0.02),
            hold_period_years: None,
        },
        waterfall: WaterfallConfig {
            hurdle_rate: dec!(0.08),
            catch_up_pct: dec!(1.0),
            carry_pct: dec!(0.20),
            rounding_dp: None,
        },
        interim_distributions: vec![],
    }
}

// ===========================================================================
// Pipeline
// ===========================================================================

#[test]
fn test_pipeline_conserves_exit_proceeds() {
    let out = run_scenario(&base_scenario()).unwrap();

    assert_eq!(out.exit.exit_date, ymd(2025, 1, 1));
    assert_eq!(out.exit.period, 5);
    assert_eq!(out.exit.enterprise_value, dec!(1008));
    assert!(out.exit.distributable_proceeds > dec!(500));

    let allocated = out.waterfall.total_to_lp + out.waterfall.total_to_gp;
    assert!((allocated - out.exit.distributable_proceeds).abs() < dec!(0.0000001));
    assert_eq!(out.returns.fund.contributed, dec!(500));
    assert!(out.returns.lp.irr.unwrap() > Decimal::ZERO);
    assert!(out.returns.lp.moic.unwrap() > Decimal::ONE);
}

#[test]
fn test_pipeline_is_idempotent() {
    let input = base_scenario();
    let a = serde_json::to_string(&run_scenario(&input).unwrap()).unwrap();
    let b = serde_json::to_string(&run_scenario(&input).unwrap()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_shorter_hold_exits_earlier() {
    let mut input = base_scenario();
    input.exit.hold_period_years = Some(3);
    let out = run_scenario(&input).unwrap();

    assert_eq!(out.schedule.periods.len(), 3);
    assert_eq!(out.exit.exit_date, ymd(2023, 1, 1));
    assert_eq!(out.exit.exit_ebitda, dec!(112));
}

#[test]
fn test_hold_beyond_projection_is_insufficient_data() {
    let mut input = base_scenario();
    input.exit.hold_period_years = Some(7);
    assert!(matches!(
        run_scenario(&input),
        Err(LboError::InsufficientData(_))
    ));
}

#[test]
fn test_zero_hold_period_rejected() {
    let mut input = base_scenario();
    input.exit.hold_period_years = Some(0);
    match run_scenario(&input).unwrap_err() {
        LboError::InvalidInput { field, .. } => assert_eq!(field, "hold_period_years"),
        other => panic!("Expected InvalidInput, got: {other:?}"),
    }
}

#[test]
fn test_interim_distribution_after_exit_rejected() {
    let mut input = base_scenario();
    input.exit.hold_period_years = Some(2);
    input.interim_distributions.push(ProceedsEvent {
        date: ymd(2023, 6, 30),
        amount: dec!(50),
        label: Some("Dividend recap".into()),
    });
    match run_scenario(&input).unwrap_err() {
        LboError::InvalidInput { field, .. } => assert_eq!(field, "interim_distributions"),
        other => panic!("Expected InvalidInput, got: {other:?}"),
    }
}

#[test]
fn test_interim_distribution_enters_waterfall() {
    let mut input = base_scenario();
    input.interim_distributions.push(ProceedsEvent {
        date: ymd(2022, 6, 30),
        amount: dec!(100),
        label: Some("Dividend recap".into()),
    });
    let out = run_scenario(&input).unwrap();

    assert_eq!(out.waterfall.events.len(), 2);
    assert_eq!(out.waterfall.events[1].label.as_deref(), Some("Exit"));
    let allocated = out.waterfall.total_to_lp + out.waterfall.total_to_gp;
    let expected = out.exit.distributable_proceeds + dec!(100);
    assert!((allocated - expected).abs() < dec!(0.0000001));
}

// ===========================================================================
// Batch runner
// ===========================================================================

fn batch() -> Vec<ScenarioInput> {
    let mut inputs = Vec::new();
    for (i, multiple) in [dec!(7), dec!(8), dec!(9), dec!(10)].into_iter().enumerate() {
        let mut input = base_scenario();
        input.name = format!("Exit {multiple}x");
        input.exit.exit_multiple = Some(multiple);
        if i == 1 {
            input.exit.hold_period_years = Some(9);
        }
        inputs.push(input);
    }
    inputs
}

#[test]
fn test_batch_isolates_failures() {
    let report = run_batch(&batch(), &RunnerConfig::default(), &CancellationToken::new()).unwrap();

    assert_eq!(report.completed, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.cancelled, 0);
    let indices: Vec<usize> = report.results.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    match &report.results[1].status {
        ScenarioStatus::Failed { kind, .. } => assert_eq!(kind, "insufficient_data"),
        other => panic!("Expected Failed, got: {other:?}"),
    }
    assert_eq!(report.results[2].name, "Exit 9x");
}

#[test]
fn test_batch_matches_serial_evaluation() {
    let inputs = batch();
    let report = run_batch(&inputs, &RunnerConfig::default(), &CancellationToken::new()).unwrap();

    let serial = run_scenario(&inputs[3]).unwrap();
    let parallel = report.results[3].status.output().unwrap();
    assert_eq!(
        serde_json::to_string(&serial).unwrap(),
        serde_json::to_string(parallel).unwrap()
    );
}

#[test]
fn test_batch_independent_of_thread_count() {
    let inputs = batch();
    let token = CancellationToken::new();
    let one = run_batch(&inputs, &RunnerConfig { threads: Some(1) }, &token).unwrap();
    let two = run_batch(&inputs, &RunnerConfig { threads: Some(2) }, &token).unwrap();
    assert_eq!(
        serde_json::to_string(&one).unwrap(),
        serde_json::to_string(&two).unwrap()
    );
}

#[test]
fn test_cancelled_batch_dispatches_nothing() {
    let token = CancellationToken::new();
    token.cancel();
    let report = run_batch(&batch(), &RunnerConfig::default(), &token).unwrap();

    assert_eq!(report.cancelled, 4);
    assert!(report
        .results
        .iter()
        .all(|r| matches!(r.status, ScenarioStatus::Cancelled)));
}

#[test]
fn test_batch_output_unaffected_by_cancelled_run() {
    let inputs = batch();
    let config = RunnerConfig { threads: Some(2) };
    let first = run_batch(&inputs, &config, &CancellationToken::new()).unwrap();

    let stopped = CancellationToken::new();
    stopped.cancel();
    let skipped = run_batch(&inputs, &config, &stopped).unwrap();
    assert_eq!(skipped.cancelled, inputs.len());

    let second = run_batch(&inputs, &config, &CancellationToken::new()).unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_cancel_mid_batch_skips_remaining_scenarios() {
    let inputs: Vec<ScenarioInput> = [dec!(7), dec!(8), dec!(9), dec!(10), dec!(11)]
        .into_iter()
        .map(|multiple| {
            let mut input = base_scenario();
            input.exit.exit_multiple = Some(multiple);
            input
        })
        .collect();
    let token = CancellationToken::new();

    // A single worker settles scenarios in input order
    let report = run_batch_with_progress(&inputs, &RunnerConfig { threads: Some(1) }, &token, |r| {
        if r.status.output().is_some() {
            token.cancel();
        }
    })
    .unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.completed + report.cancelled, inputs.len());
    assert!(report.results[0].status.output().is_some());
    for result in &report.results[1..] {
        assert!(matches!(result.status, ScenarioStatus::Cancelled));
        assert!(result.status.output().is_none());
    }
}

/// Base deal held 25 years, with a distribution the day after close large
/// enough that the holders' IRR cannot be represented.
fn quick_flip_long_hold() -> ScenarioInput {
    let mut input = base_scenario();
    input.name = "Quick flip".into();
    let last = input.projection[4].clone();
    input.projection.resize(25, last);
    input.interim_distributions.push(ProceedsEvent {
        date: ymd(2020, 1, 2),
        amount: dec!(6000),
        label: Some("Recap".into()),
    });
    input
}

#[test]
fn test_unsolvable_irr_does_not_disturb_siblings() {
    let inputs = vec![base_scenario(), quick_flip_long_hold()];
    let report = run_batch(&inputs, &RunnerConfig { threads: Some(2) }, &CancellationToken::new())
        .unwrap();

    assert_eq!(report.completed, 2);
    let base = report.results[0].status.output().unwrap();
    assert!(base.returns.lp.irr.is_some());

    let flip = report.results[1].status.output().unwrap();
    assert_eq!(flip.exit.exit_date, ymd(2045, 1, 1));
    assert_eq!(flip.returns.lp.irr, None);
    assert!(flip.warnings.iter().any(|w| w.contains("IRR")));
}

#[test]
fn test_zero_threads_rejected() {
    let result = run_batch(
        &batch(),
        &RunnerConfig { threads: Some(0) },
        &CancellationToken::new(),
    );
    assert!(matches!(result, Err(LboError::InvalidInput { .. })));
}

// ===========================================================================
// Sensitivity
// ===========================================================================

#[test]
fn test_sensitivity_grid_over_exit_multiple_and_carry() {
    let input = SensitivityInput {
        base: base_scenario(),
        variable_1: SensitivityVariable {
            name: "exit_multiple".into(),
            min: dec!(7),
            max: dec!(9),
            step: dec!(1),
        },
        variable_2: SensitivityVariable {
            name: "carry_pct".into(),
            min: dec!(0.1),
            max: dec!(0.3),
            step: dec!(0.1),
        },
        output_metric: OutputMetric::ExitEquityValue,
        runner: RunnerConfig { threads: Some(2) },
    };
    let out = run_sensitivity(&input, &CancellationToken::new())
        .unwrap()
        .result;

    assert_eq!(out.matrix.len(), 3);
    assert!(out.matrix.iter().all(|row| row.len() == 3));
    assert_eq!(out.base_case_position, (1, 1));

    // Equity value moves with the multiple, not with carry
    let cell = |i: usize, j: usize| out.matrix[i][j].unwrap();
    assert!(cell(0, 0) < cell(1, 0) && cell(1, 0) < cell(2, 0));
    assert_eq!(cell(1, 0), cell(1, 2));
    assert!((cell(2, 1) - cell(1, 1) - dec!(126) * dec!(0.98)).abs() < dec!(0.0000001));
}

#[test]
fn test_sensitivity_rejects_same_parameter_twice() {
    let var = SensitivityVariable {
        name: "hurdle_rate".into(),
        min: dec!(0.06),
        max: dec!(0.10),
        step: dec!(0.02),
    };
    let input = SensitivityInput {
        base: base_scenario(),
        variable_1: var.clone(),
        variable_2: var,
        output_metric: OutputMetric::LpIrr,
        runner: RunnerConfig::default(),
    };
    assert!(run_sensitivity(&input, &CancellationToken::new()).is_err());
}

// ===========================================================================
// Monte Carlo
// ===========================================================================

#[cfg(feature = "monte_carlo")]
mod monte_carlo {
    use super::*;
    use pretty_assertions::assert_eq;
    use lbo_engine_core::scenarios::{run_monte_carlo, McDistribution, MonteCarloInput};

    fn simulation(threads: usize) -> MonteCarloInput {
        MonteCarloInput {
            base: base_scenario(),
            num_simulations: 200,
            seed: Some(42),
            // Roughly a quarter of draws fall at or below zero
            exit_multiple: Some(McDistribution::Uniform { min: -4.0, max: 12.0 }),
            ebitda_scale: Some(McDistribution::Triangular {
                min: 0.9,
                mode: 1.0,
                max: 1.1,
            }),
            rate_shift: None,
            runner: RunnerConfig {
                threads: Some(threads),
            },
        }
    }

    #[test]
    fn test_seeded_simulation_independent_of_thread_count() {
        let token = CancellationToken::new();
        let one = run_monte_carlo(&simulation(1), &token).unwrap().result;
        let four = run_monte_carlo(&simulation(4), &token).unwrap().result;
        assert_eq!(
            serde_json::to_string(&one).unwrap(),
            serde_json::to_string(&four).unwrap()
        );
    }

    #[test]
    fn test_path_outcomes_account_for_every_simulation() {
        let out = run_monte_carlo(&simulation(2), &CancellationToken::new())
            .unwrap()
            .result;

        assert_eq!(out.completed + out.failed + out.cancelled, 200);
        assert_eq!(out.cancelled, 0);
        assert!(out.failed > 0);
        assert_eq!(out.failures_by_kind.get("invalid_input"), Some(&out.failed));
        assert_eq!(out.failures_by_kind.values().sum::<usize>(), out.failed);

        let equity = out.exit_equity_value.unwrap();
        assert_eq!(equity.count, out.completed);
        assert!(equity.min <= equity.percentiles.p50 && equity.percentiles.p50 <= equity.max);
    }

    #[test]
    fn test_cancelled_simulation_reports_all_paths_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let out = run_monte_carlo(&simulation(2), &token).unwrap();

        assert_eq!(out.result.cancelled, 200);
        assert_eq!(out.result.completed + out.result.failed, 0);
        assert!(out.result.exit_equity_value.is_none());
        assert!(out.warnings.iter().any(|w| w.contains("cancelled")));
    }

    #[test]
    fn test_simulation_requires_a_variable() {
        let mut input = simulation(1);
        input.exit_multiple = None;
        input.ebitda_scale = None;
        assert!(matches!(
            run_monte_carlo(&input, &CancellationToken::new()),
            Err(LboError::InsufficientData(_))
        ));
    }
}
