use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::error::LboError;
use crate::time_value::{compound_factor, year_fraction};
use crate::types::*;
use crate::LboResult;

use super::returns::{summarise_returns, ReturnsSummary};

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// Economic terms of the distribution waterfall.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallConfig {
    /// Annual preferred return compounded from each LP contribution date
    pub hurdle_rate: Rate,
    /// GP share of catch-up tier distributions (1.0 = full catch-up)
    pub catch_up_pct: Rate,
    /// GP share of total profit targeted by catch-up and paid in the carry tier
    pub carry_pct: Rate,
    /// Round allocations to this many decimal places
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rounding_dp: Option<u32>,
}

/// Gross proceeds distributed on a date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProceedsEvent {
    pub date: NaiveDate,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallInput {
    /// Equity contributions (negative amounts)
    pub contributions: Vec<CashFlowEvent>,
    pub distributions: Vec<ProceedsEvent>,
    pub config: WaterfallConfig,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaterfallTier {
    ReturnOfCapital,
    PreferredReturn,
    CatchUp,
    CarriedInterest,
}

impl WaterfallTier {
    pub const ALL: [WaterfallTier; 4] = [
        WaterfallTier::ReturnOfCapital,
        WaterfallTier::PreferredReturn,
        WaterfallTier::CatchUp,
        WaterfallTier::CarriedInterest,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            WaterfallTier::ReturnOfCapital => "Return of Capital",
            WaterfallTier::PreferredReturn => "Preferred Return",
            WaterfallTier::CatchUp => "GP Catch-Up",
            WaterfallTier::CarriedInterest => "Carried Interest",
        }
    }
}

impl std::fmt::Display for WaterfallTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Amount one tier allocated, split by holder class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierAllocation {
    pub tier: WaterfallTier,
    pub amount: Money,
    pub to_lp: Money,
    pub to_gp: Money,
}

impl TierAllocation {
    fn empty(tier: WaterfallTier) -> Self {
        Self {
            tier,
            amount: Decimal::ZERO,
            to_lp: Decimal::ZERO,
            to_gp: Decimal::ZERO,
        }
    }

    fn set(&mut self, to_lp: Money, to_gp: Money) {
        self.to_lp = to_lp;
        self.to_gp = to_gp;
        self.amount = to_lp + to_gp;
    }
}

/// Allocation of a single proceeds event through the tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAllocation {
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub proceeds: Money,
    pub tiers: Vec<TierAllocation>,
    pub to_lp: Money,
    pub to_gp: Money,
    /// First tier whose entitlement the proceeds could not cover
    pub exhausted_in: Option<WaterfallTier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallBreakdown {
    pub events: Vec<EventAllocation>,
    /// Tier totals across all events
    pub tiers: Vec<TierAllocation>,
    pub total_proceeds: Money,
    pub total_to_lp: Money,
    pub total_to_gp: Money,
    /// GP distributions from catch-up and carry
    pub gp_carry: Money,
    /// Tier exhausted by the final event, if any
    pub exhausted_in: Option<WaterfallTier>,
    /// Contributions followed by per-holder distributions, by date
    pub ledger: Vec<CashFlowEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallResult {
    pub breakdown: WaterfallBreakdown,
    pub returns: ReturnsSummary,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Running totals carried from one proceeds event to the next.
#[derive(Debug, Default)]
struct DistributionState {
    lp_capital_returned: Money,
    gp_capital_returned: Money,
    lp_distributed: Money,
    gp_distributed: Money,
}

impl DistributionState {
    /// Distributions in excess of returned capital, (total, GP)
    fn profit(&self) -> (Money, Money) {
        let gp = self.gp_distributed - self.gp_capital_returned;
        let lp = self.lp_distributed - self.lp_capital_returned;
        (lp + gp, gp)
    }

    fn record(&mut self, alloc: &TierAllocation) {
        if alloc.tier == WaterfallTier::ReturnOfCapital {
            self.lp_capital_returned += alloc.to_lp;
            self.gp_capital_returned += alloc.to_gp;
        }
        self.lp_distributed += alloc.to_lp;
        self.gp_distributed += alloc.to_gp;
    }
}

fn validate(
    contributions: &[CashFlowEvent],
    distributions: &[ProceedsEvent],
    config: &WaterfallConfig,
) -> LboResult<()> {
    let rates = [
        ("hurdle_rate", config.hurdle_rate),
        ("catch_up_pct", config.catch_up_pct),
        ("carry_pct", config.carry_pct),
    ];
    for (field, value) in rates {
        if value < Decimal::ZERO || value > Decimal::ONE {
            return Err(LboError::InvalidInput {
                field: field.into(),
                reason: "Must be between 0 and 1".into(),
            });
        }
    }
    if let Some(dp) = config.rounding_dp {
        if dp > 12 {
            return Err(LboError::InvalidInput {
                field: "rounding_dp".into(),
                reason: "At most 12 decimal places are supported".into(),
            });
        }
    }
    if contributions.is_empty() {
        return Err(LboError::InsufficientData(
            "Waterfall requires at least one contribution".into(),
        ));
    }
    if let Some(c) = contributions.iter().find(|c| c.amount >= Decimal::ZERO) {
        return Err(LboError::InvalidInput {
            field: "contributions".into(),
            reason: format!("Contribution on {} must be negative, got {}", c.date, c.amount),
        });
    }
    if let Some(d) = distributions.iter().find(|d| d.amount < Decimal::ZERO) {
        return Err(LboError::InvalidInput {
            field: "distributions".into(),
            reason: format!("Distribution on {} cannot be negative", d.date),
        });
    }
    if contributions.windows(2).any(|w| w[1].date < w[0].date) {
        return Err(LboError::InvalidInput {
            field: "contributions".into(),
            reason: "Contributions must be in non-decreasing date order".into(),
        });
    }
    if distributions.windows(2).any(|w| w[1].date < w[0].date) {
        return Err(LboError::InvalidInput {
            field: "distributions".into(),
            reason: "Distributions must be in non-decreasing date order".into(),
        });
    }
    Ok(())
}

/// Assign rounding residue to the last recipient of the last tier that
/// allocated anything, so the event still sums to its proceeds.
fn apply_rounding(tiers: &mut [TierAllocation], proceeds: Money, dp: u32, carry_pct: Rate) {
    for t in tiers.iter_mut() {
        let (lp, gp) = (t.to_lp.round_dp(dp), t.to_gp.round_dp(dp));
        t.set(lp, gp);
    }
    let residue = proceeds - tiers.iter().map(|t| t.amount).sum::<Money>();
    if residue.is_zero() {
        return;
    }
    let active = tiers.iter().rposition(|t| !t.amount.is_zero());
    let Some(idx) = active.or(tiers.len().checked_sub(1)) else {
        return;
    };
    let t = &mut tiers[idx];
    let to_gp = if active.is_some() {
        !t.to_gp.is_zero()
    } else {
        !carry_pct.is_zero()
    };
    if to_gp {
        t.set(t.to_lp, t.to_gp + residue);
    } else {
        t.set(t.to_lp + residue, t.to_gp);
    }
}

/// Run each proceeds event through return of capital, preferred return,
/// GP catch-up and carried interest, carrying cumulative state across
/// events, then compute per-holder returns from the resulting ledger.
pub fn run_waterfall(
    contributions: &[CashFlowEvent],
    distributions: &[ProceedsEvent],
    config: &WaterfallConfig,
) -> LboResult<ComputationOutput<WaterfallResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate(contributions, distributions, config)?;

    let k = config.catch_up_pct;
    let c = config.carry_pct;
    let catch_up_active = !k.is_zero() && k > c;
    if !k.is_zero() && k <= c {
        warnings.push(format!(
            "Catch-up share {k} does not exceed carry {c}; catch-up tier skipped"
        ));
    }

    let mut state = DistributionState::default();
    let mut events: Vec<EventAllocation> = Vec::with_capacity(distributions.len());

    for dist in distributions {
        let mut pool = dist.amount;
        let mut tiers: Vec<TierAllocation> =
            WaterfallTier::ALL.iter().map(|t| TierAllocation::empty(*t)).collect();
        let mut exhausted_in: Option<WaterfallTier> = None;
        let mut note_shortfall = |tier: WaterfallTier, demand: Money, paid: Money| {
            if paid < demand && exhausted_in.is_none() {
                exhausted_in = Some(tier);
            }
        };

        // ─── Return of Capital ───────────────────────────────────────
        let (lp_called, gp_called) = contributions
            .iter()
            .filter(|e| e.date <= dist.date)
            .fold((Decimal::ZERO, Decimal::ZERO), |(lp, gp), e| match e.holder {
                HolderClass::LP => (lp - e.amount, gp),
                HolderClass::GP => (lp, gp - e.amount),
            });
        let lp_outstanding = (lp_called - state.lp_capital_returned).max(Decimal::ZERO);
        let gp_outstanding = (gp_called - state.gp_capital_returned).max(Decimal::ZERO);
        let outstanding = lp_outstanding + gp_outstanding;
        let paid = pool.min(outstanding);
        if paid > Decimal::ZERO {
            let to_lp = paid * lp_outstanding / outstanding;
            tiers[0].set(to_lp, paid - to_lp);
            pool -= paid;
        }
        note_shortfall(WaterfallTier::ReturnOfCapital, outstanding, paid);
        state.record(&tiers[0]);

        // ─── Preferred Return ────────────────────────────────────────
        let mut lp_hurdle = Decimal::ZERO;
        for e in contributions
            .iter()
            .filter(|e| e.holder == HolderClass::LP && e.date <= dist.date)
        {
            let growth = compound_factor(config.hurdle_rate, year_fraction(e.date, dist.date))?;
            lp_hurdle += -e.amount * growth;
        }
        // Prior LP receipts carry the hurdle forward from their own dates
        let mut lp_received = tiers[0].to_lp;
        for prior in &events {
            let growth = compound_factor(config.hurdle_rate, year_fraction(prior.date, dist.date))?;
            lp_received += prior.to_lp * growth;
        }
        let pref_due = (lp_hurdle - lp_received).max(Decimal::ZERO);
        let paid = pool.min(pref_due);
        tiers[1].set(paid, Decimal::ZERO);
        pool -= paid;
        note_shortfall(WaterfallTier::PreferredReturn, pref_due, paid);
        state.record(&tiers[1]);

        // ─── GP Catch-Up ─────────────────────────────────────────────
        if catch_up_active {
            let (profit, gp_profit) = state.profit();
            let target = ((c * profit - gp_profit) / (k - c)).max(Decimal::ZERO);
            let paid = pool.min(target);
            let to_gp = paid * k;
            tiers[2].set(paid - to_gp, to_gp);
            pool -= paid;
            note_shortfall(WaterfallTier::CatchUp, target, paid);
            state.record(&tiers[2]);
        }

        // ─── Carried Interest ────────────────────────────────────────
        let to_gp = pool * c;
        tiers[3].set(pool - to_gp, to_gp);
        state.record(&tiers[3]);

        if let Some(dp) = config.rounding_dp {
            // Re-derive state from the rounded allocations
            for t in &tiers {
                state.lp_distributed -= t.to_lp;
                state.gp_distributed -= t.to_gp;
                if t.tier == WaterfallTier::ReturnOfCapital {
                    state.lp_capital_returned -= t.to_lp;
                    state.gp_capital_returned -= t.to_gp;
                }
            }
            apply_rounding(&mut tiers, dist.amount, dp, c);
            for t in &tiers {
                state.record(t);
            }
        }

        let to_lp: Money = tiers.iter().map(|t| t.to_lp).sum();
        let to_gp: Money = tiers.iter().map(|t| t.to_gp).sum();
        debug!(
            date = %dist.date,
            proceeds = %dist.amount,
            %to_lp,
            %to_gp,
            ?exhausted_in,
            "proceeds allocated"
        );

        events.push(EventAllocation {
            date: dist.date,
            label: dist.label.clone(),
            proceeds: dist.amount,
            tiers,
            to_lp,
            to_gp,
            exhausted_in,
        });
    }

    // ─── Aggregation ─────────────────────────────────────────────────
    let mut tier_totals: Vec<TierAllocation> =
        WaterfallTier::ALL.iter().map(|t| TierAllocation::empty(*t)).collect();
    for event in &events {
        for (total, t) in tier_totals.iter_mut().zip(&event.tiers) {
            total.set(total.to_lp + t.to_lp, total.to_gp + t.to_gp);
        }
    }
    let gp_carry = tier_totals[2].to_gp + tier_totals[3].to_gp;

    let mut ledger: Vec<CashFlowEvent> = contributions.to_vec();
    for event in &events {
        for (holder, amount) in [(HolderClass::LP, event.to_lp), (HolderClass::GP, event.to_gp)] {
            if amount > Decimal::ZERO {
                ledger.push(CashFlowEvent {
                    date: event.date,
                    amount,
                    holder,
                    label: event.label.clone(),
                });
            }
        }
    }
    // Stable: contributions stay ahead of same-day distributions
    ledger.sort_by_key(|e| e.date);

    let returns = summarise_returns(&ledger, &mut warnings);
    let exhausted_in = events.last().and_then(|e| e.exhausted_in);
    if let Some(tier) = exhausted_in {
        warnings.push(format!("Proceeds exhausted in the {tier} tier"));
    }

    let breakdown = WaterfallBreakdown {
        total_proceeds: distributions.iter().map(|d| d.amount).sum(),
        total_to_lp: tier_totals.iter().map(|t| t.to_lp).sum(),
        total_to_gp: tier_totals.iter().map(|t| t.to_gp).sum(),
        gp_carry,
        exhausted_in,
        tiers: tier_totals,
        events,
        ledger,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "European distribution waterfall: return of capital, compounded preferred return, GP catch-up, carried interest",
        &serde_json::json!({
            "hurdle_rate": config.hurdle_rate.to_string(),
            "catch_up_pct": config.catch_up_pct.to_string(),
            "carry_pct": config.carry_pct.to_string(),
            "rounding_dp": config.rounding_dp,
            "num_contributions": contributions.len(),
            "num_distributions": distributions.len(),
        }),
        warnings,
        elapsed,
        WaterfallResult { breakdown, returns },
    ))
}

/// Convenience wrapper over [`run_waterfall`] for serialized requests.
pub fn run_waterfall_input(input: &WaterfallInput) -> LboResult<ComputationOutput<WaterfallResult>> {
    run_waterfall(&input.contributions, &input.distributions, &input.config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
