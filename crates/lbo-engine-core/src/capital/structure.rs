//! Capital structure registry.
//!
//! Validates debt and equity tranches once, at construction, and exposes an
//! immutable [`CapitalStructure`] whose tranches are stored in sweep priority
//! order: the revolver first, then the remaining tranches by ascending
//! seniority rank.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

use crate::error::LboError;
use crate::types::*;
use crate::LboResult;

use super::sources_uses::{self, SourcesUsesInput, SourcesUsesOutput};

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// Debt class of a tranche
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrancheKind {
    Revolver,
    Term,
    Subordinated,
}

/// Terms of a single debt tranche
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtTranche {
    pub name: String,
    /// Amount funded at close (drawn amount for a revolver)
    pub principal: Money,
    /// Annual cash interest rate
    pub interest_rate: Rate,
    /// Mandatory amortisation as a fraction of original principal per year
    #[serde(default)]
    pub amortisation_rate: Rate,
    /// Share of the cash still available for sweep that this tranche takes
    #[serde(default)]
    pub sweep_pct: Rate,
    /// Lower ranks are swept first
    pub seniority: u32,
    pub kind: TrancheKind,
    /// Revolver facility limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commitment: Option<Money>,
    /// Annual fee on undrawn revolver commitment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commitment_fee: Option<Rate>,
}

impl DebtTranche {
    pub fn is_revolver(&self) -> bool {
        self.kind == TrancheKind::Revolver
    }

    /// Facility limit; a revolver without an explicit commitment cannot be
    /// drawn above its closing balance.
    pub fn facility_limit(&self) -> Money {
        self.commitment.unwrap_or(self.principal)
    }

    /// Scheduled repayment per year before capping at the outstanding balance.
    pub fn scheduled_amortisation(&self) -> Money {
        if self.is_revolver() {
            Decimal::ZERO
        } else {
            self.principal * self.amortisation_rate
        }
    }
}

/// Equity contributed by one holder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityTranche {
    pub name: String,
    pub holder: HolderClass,
    pub amount: Money,
    pub date: NaiveDate,
}

/// Uses of funds at close
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsesOfFunds {
    /// Enterprise value paid for the target
    pub purchase_enterprise_value: Money,
    /// Transaction advisory fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_fees: Option<Money>,
    /// Debt financing/arrangement fees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financing_fees: Option<Money>,
    /// Cash funded onto the balance sheet; opening cash of period 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_to_balance_sheet: Option<Money>,
}

/// Leverage the debt package is expected to reconcile with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageTargets {
    /// Total debt / entry EBITDA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_leverage: Option<Multiple>,
    /// Revolver + term debt / entry EBITDA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub senior_leverage: Option<Multiple>,
    #[serde(default = "default_leverage_tolerance")]
    pub tolerance: Multiple,
}

fn default_leverage_tolerance() -> Multiple {
    dec!(0.05)
}

fn default_rounding_tolerance() -> Money {
    dec!(0.01)
}

/// Caller-supplied capital structure at close
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalStructureConfig {
    pub close_date: NaiveDate,
    /// LTM EBITDA at entry
    pub entry_ebitda: Money,
    pub tranches: Vec<DebtTranche>,
    pub equity: Vec<EquityTranche>,
    pub uses: UsesOfFunds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage_targets: Option<LeverageTargets>,
    /// Maximum |sources - uses| accepted as balanced
    #[serde(default = "default_rounding_tolerance")]
    pub rounding_tolerance: Money,
}

// ---------------------------------------------------------------------------
// Validated structure
// ---------------------------------------------------------------------------

/// Validated, immutable capital structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapitalStructure {
    close_date: NaiveDate,
    entry_ebitda: Money,
    tranches: Vec<DebtTranche>,
    equity: Vec<EquityTranche>,
    opening_cash: Money,
    total_leverage: Multiple,
    senior_leverage: Multiple,
    sources_uses: SourcesUsesOutput,
}

impl CapitalStructure {
    pub fn close_date(&self) -> NaiveDate {
        self.close_date
    }

    pub fn entry_ebitda(&self) -> Money {
        self.entry_ebitda
    }

    /// Tranches in sweep priority order
    pub fn tranches(&self) -> &[DebtTranche] {
        &self.tranches
    }

    pub fn revolver(&self) -> Option<&DebtTranche> {
        self.tranches.iter().find(|t| t.is_revolver())
    }

    pub fn equity(&self) -> &[EquityTranche] {
        &self.equity
    }

    /// Cash funded onto the balance sheet at close
    pub fn opening_cash(&self) -> Money {
        self.opening_cash
    }

    pub fn total_debt(&self) -> Money {
        self.tranches.iter().map(|t| t.principal).sum()
    }

    pub fn total_equity(&self) -> Money {
        self.equity.iter().map(|e| e.amount).sum()
    }

    pub fn total_leverage(&self) -> Multiple {
        self.total_leverage
    }

    pub fn senior_leverage(&self) -> Multiple {
        self.senior_leverage
    }

    pub fn sources_uses(&self) -> &SourcesUsesOutput {
        &self.sources_uses
    }

    /// Equity contributions as a dated ledger (negative amounts).
    pub fn contribution_events(&self) -> Vec<CashFlowEvent> {
        let mut events: Vec<CashFlowEvent> = self
            .equity
            .iter()
            .map(|e| CashFlowEvent {
                date: e.date,
                amount: -e.amount,
                holder: e.holder,
                label: Some(e.name.clone()),
            })
            .collect();
        events.sort_by_key(|e| e.date);
        events
    }
}

/// Validate a capital structure configuration and build the immutable
/// registry used by the schedule engine.
pub fn build_capital_structure(
    config: &CapitalStructureConfig,
) -> LboResult<ComputationOutput<CapitalStructure>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if config.entry_ebitda <= Decimal::ZERO {
        return Err(LboError::capital_structure(
            "structure",
            "entry_ebitda",
            "Entry EBITDA must be positive",
        ));
    }
    if config.tranches.is_empty() {
        return Err(LboError::capital_structure(
            "structure",
            "tranches",
            "At least one debt tranche is required",
        ));
    }
    if config.equity.is_empty() {
        return Err(LboError::capital_structure(
            "structure",
            "equity",
            "At least one equity tranche is required",
        ));
    }

    validate_tranches(&config.tranches)?;
    validate_equity(&config.equity)?;

    if !config
        .tranches
        .iter()
        .any(|t| t.is_revolver())
    {
        warnings.push(
            "No revolver: cash shortfalls below the minimum-cash floor cannot be funded".into(),
        );
    }
    if !config.equity.iter().any(|e| e.holder == HolderClass::LP) {
        warnings.push("No LP equity: the preferred return tier will allocate nothing".into());
    }

    // ─── Sources & Uses ──────────────────────────────────────────────
    let su_input = SourcesUsesInput {
        debt_tranches: config
            .tranches
            .iter()
            .map(|t| (t.name.clone(), t.principal))
            .collect(),
        equity_tranches: config
            .equity
            .iter()
            .map(|e| (e.name.clone(), e.amount))
            .collect(),
        uses: config.uses.clone(),
        tolerance: config.rounding_tolerance,
    };
    let su = sources_uses::build_sources_uses(&su_input)
        .map_err(|e| LboError::capital_structure("sources_uses", "uses", e.to_string()))?
        .result;
    if !su.balanced {
        return Err(LboError::capital_structure(
            "sources_uses",
            "total",
            format!(
                "Sources ({}) do not equal uses ({}); difference {} exceeds tolerance {}",
                su.total_sources, su.total_uses, su.difference, config.rounding_tolerance
            ),
        ));
    }

    // ─── Leverage ────────────────────────────────────────────────────
    let total_debt: Money = config.tranches.iter().map(|t| t.principal).sum();
    let senior_debt: Money = config
        .tranches
        .iter()
        .filter(|t| t.kind != TrancheKind::Subordinated)
        .map(|t| t.principal)
        .sum();
    let total_leverage = total_debt / config.entry_ebitda;
    let senior_leverage = senior_debt / config.entry_ebitda;

    if let Some(targets) = &config.leverage_targets {
        if targets.tolerance < Decimal::ZERO {
            return Err(LboError::capital_structure(
                "leverage_targets",
                "tolerance",
                "Leverage tolerance cannot be negative",
            ));
        }
        let checks = [
            ("total_leverage", targets.total_leverage, total_leverage),
            ("senior_leverage", targets.senior_leverage, senior_leverage),
        ];
        for (field, target, actual) in checks {
            if let Some(target) = target {
                if (actual - target).abs() > targets.tolerance {
                    return Err(LboError::capital_structure(
                        "leverage_targets",
                        field,
                        format!(
                            "Debt package implies {actual}x but target is {target}x (tolerance {}x)",
                            targets.tolerance
                        ),
                    ));
                }
            }
        }
    }

    // ─── Sweep priority ──────────────────────────────────────────────
    let mut tranches = config.tranches.clone();
    tranches.sort_by_key(|t| (!t.is_revolver(), t.seniority));

    let structure = CapitalStructure {
        close_date: config.close_date,
        entry_ebitda: config.entry_ebitda,
        tranches,
        equity: config.equity.clone(),
        opening_cash: config.uses.cash_to_balance_sheet.unwrap_or(Decimal::ZERO),
        total_leverage,
        senior_leverage,
        sources_uses: su,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "LBO Capital Structure Validation",
        &serde_json::json!({
            "entry_ebitda": config.entry_ebitda.to_string(),
            "num_tranches": config.tranches.len(),
            "num_equity_tranches": config.equity.len(),
            "rounding_tolerance": config.rounding_tolerance.to_string(),
        }),
        warnings,
        elapsed,
        structure,
    ))
}

fn in_unit_interval(value: Rate) -> bool {
    value >= Decimal::ZERO && value <= Decimal::ONE
}

fn validate_tranches(tranches: &[DebtTranche]) -> LboResult<()> {
    let mut names: HashSet<&str> = HashSet::new();
    let mut ranks: HashSet<u32> = HashSet::new();
    let mut revolvers = 0;

    for t in tranches {
        let subject = if t.name.is_empty() { "<unnamed>" } else { t.name.as_str() };
        if t.name.trim().is_empty() {
            return Err(LboError::capital_structure(subject, "name", "Tranche name is required"));
        }
        if !names.insert(t.name.as_str()) {
            return Err(LboError::capital_structure(subject, "name", "Duplicate tranche name"));
        }
        if t.principal < Decimal::ZERO {
            return Err(LboError::capital_structure(
                subject,
                "principal",
                "Principal cannot be negative",
            ));
        }
        if t.interest_rate < Decimal::ZERO {
            return Err(LboError::capital_structure(
                subject,
                "interest_rate",
                "Interest rate cannot be negative",
            ));
        }
        if !in_unit_interval(t.amortisation_rate) {
            return Err(LboError::capital_structure(
                subject,
                "amortisation_rate",
                "Amortisation rate must be between 0 and 1",
            ));
        }
        if !in_unit_interval(t.sweep_pct) {
            return Err(LboError::capital_structure(
                subject,
                "sweep_pct",
                "Sweep percentage must be between 0 and 1",
            ));
        }

        if t.is_revolver() {
            revolvers += 1;
            if revolvers > 1 {
                return Err(LboError::capital_structure(
                    subject,
                    "kind",
                    "At most one revolver is supported",
                ));
            }
            if !t.amortisation_rate.is_zero() {
                return Err(LboError::capital_structure(
                    subject,
                    "amortisation_rate",
                    "A revolver has no mandatory amortisation",
                ));
            }
            if let Some(commitment) = t.commitment {
                if commitment < t.principal {
                    return Err(LboError::capital_structure(
                        subject,
                        "commitment",
                        "Revolver commitment cannot be below the amount drawn at close",
                    ));
                }
            }
            if let Some(fee) = t.commitment_fee {
                if !in_unit_interval(fee) {
                    return Err(LboError::capital_structure(
                        subject,
                        "commitment_fee",
                        "Commitment fee must be between 0 and 1",
                    ));
                }
            }
        } else {
            if t.commitment.is_some() || t.commitment_fee.is_some() {
                return Err(LboError::capital_structure(
                    subject,
                    "commitment",
                    "Only a revolver carries a commitment",
                ));
            }
            if !ranks.insert(t.seniority) {
                return Err(LboError::capital_structure(
                    subject,
                    "seniority",
                    format!("Seniority rank {} is shared with another tranche", t.seniority),
                ));
            }
        }
    }
    Ok(())
}

fn validate_equity(equity: &[EquityTranche]) -> LboResult<()> {
    for e in equity {
        if e.amount <= Decimal::ZERO {
            return Err(LboError::capital_structure(
                e.name.as_str(),
                "amount",
                "Equity contribution must be positive",
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn tranche(name: &str, principal: Money, rank: u32, kind: TrancheKind) -> DebtTranche {
        DebtTranche {
            name: name.into(),
            principal,
            interest_rate: dec!(0.06),
            amortisation_rate: Decimal::ZERO,
            sweep_pct: Decimal::ZERO,
            seniority: rank,
            kind,
            commitment: None,
            commitment_fee: None,
        }
    }

    fn base_config() -> CapitalStructureConfig {
        CapitalStructureConfig {
            close_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            entry_ebitda: dec!(100),
            tranches: vec![
                tranche("Sub", dec!(100), 3, TrancheKind::Subordinated),
                tranche("TLA", dec!(200), 1, TrancheKind::Term),
                DebtTranche {
                    commitment: Some(dec!(50)),
                    commitment_fee: Some(dec!(0.005)),
                    ..tranche("Revolver", dec!(0), 0, TrancheKind::Revolver)
                },
                tranche("TLB", dec!(200), 2, TrancheKind::Term),
            ],
            equity: vec![EquityTranche {
                name: "Sponsor".into(),
                holder: HolderClass::LP,
                amount: dec!(500),
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            }],
            uses: UsesOfFunds {
                purchase_enterprise_value: dec!(980),
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

    #[test]
    fn test_sweep_priority_order() {
        let out = build_capital_structure(&base_config()).unwrap();
        let names: Vec<&str> = out
            .result
            .tranches()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["Revolver", "TLA", "TLB", "Sub"]);
    }

    #[test]
    fn test_leverage_and_opening_cash() {
        let s = build_capital_structure(&base_config()).unwrap().result;
        assert_eq!(s.total_leverage(), dec!(5));
        assert_eq!(s.senior_leverage(), dec!(4));
        assert_eq!(s.opening_cash(), dec!(20));
        assert!(s.sources_uses().balanced);
    }

    #[test]
    fn test_negative_principal_names_tranche() {
        let mut config = base_config();
        config.tranches[1].principal = dec!(-1);
        match build_capital_structure(&config).unwrap_err() {
            LboError::InvalidCapitalStructure { subject, field, .. } => {
                assert_eq!(subject, "TLA");
                assert_eq!(field, "principal");
            }
            other => panic!("Expected InvalidCapitalStructure, got: {other:?}"),
        }
    }

    #[test]
    fn test_seniority_tie_rejected() {
        let mut config = base_config();
        config.tranches[3].seniority = 1;
        assert!(matches!(
            build_capital_structure(&config),
            Err(LboError::InvalidCapitalStructure { field, .. }) if field == "seniority"
        ));
    }

    #[test]
    fn test_revolver_may_share_rank() {
        let mut config = base_config();
        config.tranches[2].seniority = 1;
        assert!(build_capital_structure(&config).is_ok());
    }

    #[test]
    fn test_sweep_pct_out_of_range() {
        let mut config = base_config();
        config.tranches[0].sweep_pct = dec!(1.5);
        assert!(matches!(
            build_capital_structure(&config),
            Err(LboError::InvalidCapitalStructure { field, .. }) if field == "sweep_pct"
        ));
    }

    #[test]
    fn test_sources_must_equal_uses() {
        let mut config = base_config();
        config.uses.purchase_enterprise_value = dec!(1000);
        assert!(matches!(
            build_capital_structure(&config),
            Err(LboError::InvalidCapitalStructure { subject, .. }) if subject == "sources_uses"
        ));
    }

    #[test]
    fn test_leverage_target_mismatch() {
        let mut config = base_config();
        config.leverage_targets = Some(LeverageTargets {
            total_leverage: Some(dec!(6.0)),
            senior_leverage: None,
            tolerance: dec!(0.05),
        });
        assert!(matches!(
            build_capital_structure(&config),
            Err(LboError::InvalidCapitalStructure { field, .. }) if field == "total_leverage"
        ));
    }

    #[test]
    fn test_second_revolver_rejected() {
        let mut config = base_config();
        config.tranches.push(tranche("RCF2", dec!(0), 9, TrancheKind::Revolver));
        assert!(build_capital_structure(&config).is_err());
    }

    #[test]
    fn test_revolver_drawn_above_commitment() {
        let mut config = base_config();
        config.tranches[2].principal = dec!(60);
        config.uses.purchase_enterprise_value = dec!(1040);
        assert!(matches!(
            build_capital_structure(&config),
            Err(LboError::InvalidCapitalStructure { field, .. }) if field == "commitment"
        ));
    }

    #[test]
    fn test_missing_revolver_warns() {
        let mut config = base_config();
        config.tranches.remove(2);
        let out = build_capital_structure(&config).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("No revolver")));
    }

    #[test]
    fn test_contribution_events_are_negative() {
        let s = build_capital_structure(&base_config()).unwrap().result;
        let events = s.contribution_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].amount, dec!(-500));
        assert_eq!(events[0].holder, HolderClass::LP);
    }
}
