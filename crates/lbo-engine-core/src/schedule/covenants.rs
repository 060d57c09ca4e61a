use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::engine::PeriodRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CovenantMetric {
    /// Total debt / EBITDA
    TotalLeverage,
    /// (Total debt - cash) / EBITDA
    NetLeverage,
    /// EBITDA / (interest + commitment fees)
    InterestCoverage,
    /// Ending cash balance
    MinimumCash,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CovenantDirection {
    /// Actual must not exceed threshold.
    MaxOf,
    /// Actual must not fall below threshold.
    MinOf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Covenant {
    pub name: String,
    pub metric: CovenantMetric,
    pub threshold: Decimal,
    pub direction: CovenantDirection,
}

/// A covenant test that failed in one period. Reported, never fatal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CovenantBreach {
    pub covenant: String,
    pub metric: CovenantMetric,
    pub threshold: Decimal,
    /// `None` when the metric is undefined (e.g. leverage on non-positive EBITDA)
    pub actual: Option<Decimal>,
}

fn extract_metric(record: &PeriodRecord, metric: CovenantMetric) -> Option<Decimal> {
    match metric {
        CovenantMetric::TotalLeverage => record.leverage,
        CovenantMetric::NetLeverage => record.net_leverage,
        CovenantMetric::InterestCoverage => record.interest_coverage,
        CovenantMetric::MinimumCash => Some(record.ending_cash),
    }
}

/// Test every covenant against a solved period.
pub(crate) fn find_breaches(covenants: &[Covenant], record: &PeriodRecord) -> Vec<CovenantBreach> {
    covenants
        .iter()
        .filter_map(|cov| {
            let actual = extract_metric(record, cov.metric);
            let passing = match actual {
                Some(v) => match cov.direction {
                    CovenantDirection::MaxOf => v <= cov.threshold,
                    CovenantDirection::MinOf => v >= cov.threshold,
                },
                // No interest expense means unlimited coverage; undefined
                // leverage means EBITDA is not positive.
                None => cov.metric == CovenantMetric::InterestCoverage,
            };
            (!passing).then(|| CovenantBreach {
                covenant: cov.name.clone(),
                metric: cov.metric,
                threshold: cov.threshold,
                actual,
            })
        })
        .collect()
}
