use chrono::NaiveDate;
use lbo_engine_core::capital::{
    build_capital_structure, CapitalStructureConfig, DebtTranche, EquityTranche, LeverageTargets,
    TrancheKind, UsesOfFunds,
};
use lbo_engine_core::schedule::{
    build_debt_schedule, run_debt_schedule, DebtScheduleInput, InterestMode, OperatingPeriod,
    PeriodFlag, ScheduleAssumptions, SolverConfig,
};
use lbo_engine_core::{HolderClass, LboError, Money};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn close_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

fn tranche(
    name: &str,
    kind: TrancheKind,
    principal: Money,
    rate: Decimal,
    amort: Decimal,
    sweep: Decimal,
    seniority: u32,
) -> DebtTranche {
    DebtTranche {
        name: name.into(),
        principal,
        interest_rate: rate,
        amortisation_rate: amort,
        sweep_pct: sweep,
        seniority,
        kind,
        commitment: None,
        commitment_fee: None,
    }
}

fn config(commitment_fee: Option<Decimal>) -> CapitalStructureConfig {
    CapitalStructureConfig {
        close_date: close_date(),
        entry_ebitda: dec!(100),
        tranches: vec![
            DebtTranche {
                commitment: Some(dec!(50)),
                commitment_fee,
                ..tranche("Revolver", TrancheKind::Revolver, dec!(0), dec!(0.05), dec!(0), dec!(0), 1)
            },
            tranche("TLA", TrancheKind::Term, dec!(200), dec!(0.06), dec!(0.05), dec!(1.0), 1),
            tranche("TLB", TrancheKind::Term, dec!(200), dec!(0.075), dec!(0.01), dec!(0.5), 2),
            tranche("Sub", TrancheKind::Subordinated, dec!(100), dec!(0.10), dec!(0), dec!(0), 3),
        ],
        equity: vec![
            EquityTranche {
                name: "Fund".into(),
                holder: HolderClass::LP,
                amount: dec!(510),
                date: close_date(),
            },
            EquityTranche {
                name: "Sponsor".into(),
                holder: HolderClass::GP,
                amount: dec!(10),
                date: close_date(),
            },
        ],
        uses: UsesOfFunds {
            purchase_enterprise_value: dec!(1000),
            transaction_fees: None,
            financing_fees: None,
            cash_to_balance_sheet: Some(dec!(20)),
        },
        leverage_targets: Some(LeverageTargets {
            total_leverage: Some(dec!(5.0)),
            senior_leverage: Some(dec!(4.0)),
            tolerance: dec!(0.05),
        }),
        rounding_tolerance: dec!(0.01),
    }
}

fn projection() -> Vec<OperatingPeriod> {
    [
        (dec!(100), dec!(40)),
        (dec!(104), dec!(-15)),
        (dec!(110), dec!(140)),
        (dec!(116), dec!(85)),
        (dec!(122), dec!(95)),
    ]
    .into_iter()
    .map(|(ebitda, fcf)| OperatingPeriod::new(ebitda, fcf))
    .collect()
}

fn assumptions(mode: InterestMode) -> ScheduleAssumptions {
    ScheduleAssumptions {
        minimum_cash: dec!(20),
        opening_cash: None,
        covenants: vec![],
        solver: SolverConfig {
            interest_mode: mode,
            ..SolverConfig::default()
        },
    }
}

// ===========================================================================
// Period identities
// ===========================================================================

#[test]
fn test_balance_and_cash_identities_hold_every_period() {
    for mode in [InterestMode::AverageBalance, InterestMode::BeginningBalance] {
        let structure = build_capital_structure(&config(Some(dec!(0.005))))
            .unwrap()
            .result;
        let report = build_debt_schedule(&structure, &projection(), &assumptions(mode))
            .unwrap()
            .result;
        let tol = dec!(0.0001);

        for p in &report.periods {
            for t in &p.tranches {
                let expected =
                    t.beginning_balance - t.mandatory_amortisation - t.sweep + t.draw;
                assert_eq!(t.ending_balance, expected, "{} period {}", t.name, p.period);
                assert!(t.ending_balance >= Decimal::ZERO);
            }

            let interest: Money = p.tranches.iter().map(|t| t.interest).sum();
            assert_eq!(p.total_interest, interest);
            let expected_before = p.beginning_cash + p.fcf_before_debt_service
                - p.total_interest
                - p.commitment_fee
                - p.total_mandatory;
            assert!((p.cash_before_sweep - expected_before).abs() < tol);
            assert_eq!(
                p.ending_cash,
                p.cash_before_sweep - p.total_sweep + p.revolver_draw
            );

            let flagged = p.flags.iter().any(|f| {
                matches!(
                    f,
                    PeriodFlag::RevolverDraw { .. } | PeriodFlag::MinimumCashBreach { .. }
                )
            });
            assert!(p.ending_cash >= p.minimum_cash - tol || flagged);
        }
    }
}

#[test]
fn test_cash_never_negative_when_revolver_exhausted() {
    // Year 1 drains the revolver; year 2 cannot pay full amortisation
    let stressed: Vec<OperatingPeriod> = [
        (dec!(100), dec!(-20)),
        (dec!(100), dec!(45)),
        (dec!(110), dec!(120)),
        (dec!(116), dec!(85)),
    ]
    .into_iter()
    .map(|(ebitda, fcf)| OperatingPeriod::new(ebitda, fcf))
    .collect();

    for mode in [InterestMode::AverageBalance, InterestMode::BeginningBalance] {
        let structure = build_capital_structure(&config(None)).unwrap().result;
        let report = build_debt_schedule(&structure, &stressed, &assumptions(mode))
            .unwrap()
            .result;

        for p in &report.periods {
            assert!(p.ending_cash >= Decimal::ZERO, "{mode:?} period {}", p.period);
            for t in &p.tranches {
                assert_eq!(
                    t.ending_balance,
                    t.beginning_balance - t.mandatory_amortisation - t.sweep + t.draw
                );
            }
        }

        let year2 = &report.periods[1];
        let deferred = year2.flags.iter().find_map(|f| match f {
            PeriodFlag::MinimumCashBreach {
                deferred_amortisation,
                ..
            } => Some(*deferred_amortisation),
            _ => None,
        });
        assert!(deferred.unwrap() > Decimal::ZERO, "{mode:?}");
        assert!(year2.total_mandatory < dec!(12));
        assert_eq!(year2.ending_cash, Decimal::ZERO);
        assert_eq!(year2.total_mandatory, dec!(12) - deferred.unwrap());
    }
}

#[test]
fn test_unfundable_interest_is_typed_error() {
    let structure = build_capital_structure(&config(None)).unwrap().result;
    let result = build_debt_schedule(
        &structure,
        &[OperatingPeriod::new(dec!(100), dec!(-20)), OperatingPeriod::new(dec!(100), dec!(-10))],
        &assumptions(InterestMode::BeginningBalance),
    );
    match result {
        Err(LboError::CashShortfall { period, shortfall }) => {
            assert_eq!(period, 2);
            assert!(shortfall > Decimal::ZERO);
        }
        other => panic!("Expected CashShortfall, got: {other:?}"),
    }
}

#[test]
fn test_revolver_drawn_then_repaid_first() {
    let structure = build_capital_structure(&config(None)).unwrap().result;
    let report = build_debt_schedule(
        &structure,
        &projection(),
        &assumptions(InterestMode::AverageBalance),
    )
    .unwrap()
    .result;

    let revolver = |period: usize| {
        report.periods[period]
            .tranches
            .iter()
            .find(|t| t.kind == TrancheKind::Revolver)
            .unwrap()
            .clone()
    };

    // Year 2 has negative FCF: revolver funds the floor
    assert!(revolver(1).draw > Decimal::ZERO);
    assert!(report.periods[1]
        .flags
        .iter()
        .any(|f| matches!(f, PeriodFlag::RevolverDraw { .. })));

    // Year 3 sweeps the revolver before any term debt
    let year3 = &report.periods[2];
    assert_eq!(revolver(2).ending_balance, Decimal::ZERO);
    assert!(revolver(2).sweep > Decimal::ZERO);
    assert!(year3.total_sweep > revolver(2).sweep);
}

#[test]
fn test_commitment_fee_on_undrawn_facility() {
    let structure = build_capital_structure(&config(Some(dec!(0.005))))
        .unwrap()
        .result;
    let report = build_debt_schedule(
        &structure,
        &[OperatingPeriod::new(dec!(100), dec!(80))],
        &assumptions(InterestMode::BeginningBalance),
    )
    .unwrap()
    .result;

    // Undrawn 50 at 50bp
    assert_eq!(report.periods[0].commitment_fee, dec!(0.25));
    assert_eq!(report.total_commitment_fees, dec!(0.25));
}

#[test]
fn test_report_totals_match_periods() {
    let structure = build_capital_structure(&config(None)).unwrap().result;
    let report = build_debt_schedule(
        &structure,
        &projection(),
        &assumptions(InterestMode::AverageBalance),
    )
    .unwrap()
    .result;

    // Same amounts summed in a different order
    let tol = dec!(0.0000001);
    let interest: Money = report.tranches.iter().map(|t| t.total_interest).sum();
    assert!((report.total_interest - interest).abs() < tol);
    let final_debt: Money = report.tranches.iter().map(|t| t.final_balance).sum();
    assert!((report.final_total_debt - final_debt).abs() < tol);
    assert_eq!(report.final_cash, report.periods[4].ending_cash);
    let rolled_forward = structure.total_debt() - report.total_mandatory - report.total_sweep
        + report.total_draws;
    assert!((report.final_total_debt - rolled_forward).abs() < tol);
}

#[test]
fn test_schedule_is_deterministic() {
    let input = DebtScheduleInput {
        capital_structure: config(Some(dec!(0.005))),
        projection: projection(),
        assumptions: assumptions(InterestMode::AverageBalance),
    };
    let a = serde_json::to_string(&run_debt_schedule(&input).unwrap().result).unwrap();
    let b = serde_json::to_string(&run_debt_schedule(&input).unwrap().result).unwrap();
    assert_eq!(a, b);
}

// ===========================================================================
// Configuration errors
// ===========================================================================

#[test]
fn test_leverage_target_mismatch_rejected_before_schedule() {
    let mut cfg = config(None);
    if let Some(targets) = cfg.leverage_targets.as_mut() {
        targets.total_leverage = Some(dec!(6.0));
    }
    let input = DebtScheduleInput {
        capital_structure: cfg,
        projection: projection(),
        assumptions: assumptions(InterestMode::AverageBalance),
    };
    match run_debt_schedule(&input).unwrap_err() {
        LboError::InvalidCapitalStructure { subject, field, .. } => {
            assert_eq!(subject, "leverage_targets");
            assert_eq!(field, "total_leverage");
        }
        other => panic!("Expected InvalidCapitalStructure, got: {other:?}"),
    }
}

#[test]
fn test_invalid_solver_config() {
    let structure = build_capital_structure(&config(None)).unwrap().result;
    let mut a = assumptions(InterestMode::AverageBalance);
    a.solver.max_iterations = 0;
    assert!(matches!(
        build_debt_schedule(&structure, &projection(), &a),
        Err(LboError::InvalidInput { .. })
    ));
}

#[test]
fn test_schedule_input_from_json_defaults() {
    let json = r#"{
        "capital_structure": {
            "close_date": "2020-01-01",
            "entry_ebitda": "100",
            "tranches": [
                {"name": "TLB", "principal": "400", "interest_rate": "0.07",
                 "amortisation_rate": "0.01", "sweep_pct": "0.5", "seniority": 1, "kind": "Term"}
            ],
            "equity": [
                {"name": "Fund", "holder": "LP", "amount": "600", "date": "2020-01-01"}
            ],
            "uses": {"purchase_enterprise_value": "1000"}
        },
        "projection": [
            {"ebitda": "100", "fcf_before_debt_service": "60"},
            {"ebitda": "110", "fcf_before_debt_service": "70"}
        ]
    }"#;
    let input: DebtScheduleInput = serde_json::from_str(json).unwrap();
    let out = run_debt_schedule(&input).unwrap();

    assert_eq!(out.result.interest_mode, InterestMode::AverageBalance);
    assert_eq!(out.result.periods.len(), 2);
    // No revolver configured
    assert!(out.warnings.iter().any(|w| w.contains("No revolver")));
}
