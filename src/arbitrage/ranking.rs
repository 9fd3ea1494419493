//! Sorting opportunities by cached return.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::opportunity::Opportunity;

/// Scalar an opportunity list can be sorted by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum SortKey {
    /// Sum of both absolute return cases.
    #[serde(rename = "parity_return")]
    #[strum(serialize = "parity_return")]
    AbsoluteReturn,
    /// Sum of both annualized return cases.
    #[default]
    #[serde(rename = "parity_return_annualized")]
    #[strum(serialize = "parity_return_annualized")]
    AnnualizedReturn,
}

impl SortKey {
    /// Ranking value; undefined figures rank below any real return.
    pub fn score(&self, opportunity: &Opportunity) -> f64 {
        match self {
            SortKey::AbsoluteReturn => opportunity.absolute_return().iter().sum(),
            SortKey::AnnualizedReturn => opportunity
                .annualized_return()
                .total()
                .unwrap_or(f64::NEG_INFINITY),
        }
    }
}

/// Descending comparison of two scores, NaN treated as lowest.
fn descending(a: f64, b: f64) -> Ordering {
    let a = if a.is_nan() { f64::NEG_INFINITY } else { a };
    let b = if b.is_nan() { f64::NEG_INFINITY } else { b };
    b.total_cmp(&a)
}

/// Sort in place, best first. Ties keep their input order.
pub fn sort_opportunities(opportunities: &mut [Opportunity], key: SortKey) {
    opportunities.sort_by(|a, b| descending(key.score(a), key.score(b)));
}

/// Sort a list by an optional score, best first, with `None` last.
pub fn sort_by_optional_score<T>(items: &mut [(T, Option<f64>)]) {
    items.sort_by(|(_, a), (_, b)| match (a, b) {
        (Some(a), Some(b)) => descending(*a, *b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}
