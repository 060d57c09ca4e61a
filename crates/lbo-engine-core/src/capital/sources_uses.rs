use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::LboError;
use crate::types::*;
use crate::LboResult;

use super::structure::UsesOfFunds;

/// Input for Sources & Uses calculation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesUsesInput {
    /// Debt tranches: (name, amount funded at close)
    pub debt_tranches: Vec<(String, Money)>,
    /// Equity tranches: (name, contribution)
    pub equity_tranches: Vec<(String, Money)>,
    /// Uses of funds at close
    pub uses: UsesOfFunds,
    /// Maximum absolute difference between sources and uses still treated as balanced
    pub tolerance: Money,
}

/// Output for Sources & Uses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesUsesOutput {
    /// All sources of funds
    pub sources: Vec<(String, Money)>,
    /// All uses of funds
    pub uses: Vec<(String, Money)>,
    /// Total debt funded at close
    pub total_debt: Money,
    /// Total equity contributed at close
    pub total_equity: Money,
    /// Total sources
    pub total_sources: Money,
    /// Total uses
    pub total_uses: Money,
    /// Sources minus uses
    pub difference: Money,
    /// Whether sources equal uses within tolerance
    pub balanced: bool,
}

/// Build the Sources & Uses table for a leveraged transaction.
pub fn build_sources_uses(
    input: &SourcesUsesInput,
) -> LboResult<ComputationOutput<SourcesUsesOutput>> {
    let start = Instant::now();
    let warnings: Vec<String> = Vec::new();

    if input.uses.purchase_enterprise_value <= Decimal::ZERO {
        return Err(LboError::InvalidInput {
            field: "purchase_enterprise_value".into(),
            reason: "Purchase enterprise value must be positive".into(),
        });
    }
    if input.tolerance < Decimal::ZERO {
        return Err(LboError::InvalidInput {
            field: "tolerance".into(),
            reason: "Rounding tolerance cannot be negative".into(),
        });
    }

    // Build sources
    let mut sources: Vec<(String, Money)> = Vec::new();
    for (name, amount) in &input.debt_tranches {
        if *amount < Decimal::ZERO {
            return Err(LboError::InvalidInput {
                field: format!("debt_tranche:{name}"),
                reason: "Debt tranche amount cannot be negative".into(),
            });
        }
        sources.push((name.clone(), *amount));
    }
    for (name, amount) in &input.equity_tranches {
        if *amount < Decimal::ZERO {
            return Err(LboError::InvalidInput {
                field: format!("equity_tranche:{name}"),
                reason: "Equity contribution cannot be negative".into(),
            });
        }
        sources.push((name.clone(), *amount));
    }

    // Build uses
    let mut uses: Vec<(String, Money)> = Vec::new();
    uses.push((
        "Enterprise Value".into(),
        input.uses.purchase_enterprise_value,
    ));

    let optional_uses = [
        ("Transaction Fees", input.uses.transaction_fees),
        ("Financing Fees", input.uses.financing_fees),
        ("Cash to Balance Sheet", input.uses.cash_to_balance_sheet),
    ];
    for (label, amount) in optional_uses {
        if let Some(value) = amount {
            if value < Decimal::ZERO {
                return Err(LboError::InvalidInput {
                    field: label.to_lowercase().replace(' ', "_"),
                    reason: "Uses of funds cannot be negative".into(),
                });
            }
            if value > Decimal::ZERO {
                uses.push((label.into(), value));
            }
        }
    }

    let total_debt: Money = input.debt_tranches.iter().map(|(_, v)| *v).sum();
    let total_equity: Money = input.equity_tranches.iter().map(|(_, v)| *v).sum();
    let total_sources = total_debt + total_equity;
    let total_uses: Money = uses.iter().map(|(_, v)| *v).sum();
    let difference = total_sources - total_uses;
    let balanced = difference.abs() <= input.tolerance;

    let output = SourcesUsesOutput {
        sources,
        uses,
        total_debt,
        total_equity,
        total_sources,
        total_uses,
        difference,
        balanced,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Sources & Uses of Funds",
        &serde_json::json!({
            "enterprise_value": input.uses.purchase_enterprise_value.to_string(),
            "tolerance": input.tolerance.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}
