//! Absolute, annualized and depth-aware return calculations.
//!
//! All functions here are pure. Prices are carried as `Decimal` until the
//! final division; returns are reported as `f64` because annualization
//! needs fractional powers.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

use crate::error::ReturnError;
use crate::market::Quote;
use crate::orderbook::{BookSide, LegBooks, OrderBook};

/// Seconds in a 365-day year.
pub const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;

/// Annualized return for both resolution cases, or undefined.
///
/// Serialized as `[yes, no]` with `[null, null]` for undefined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[Option<f64>; 2]", into = "[Option<f64>; 2]")]
pub enum Annualized {
    /// Return if the market resolves yes and if it resolves no.
    Defined([f64; 2]),
    /// Overflow, a non-real result or an unusable horizon.
    Undefined,
}

impl Annualized {
    /// Sum of both cases, if defined.
    pub fn total(&self) -> Option<f64> {
        match self {
            Annualized::Defined([yes, no]) => Some(yes + no),
            Annualized::Undefined => None,
        }
    }

    /// Both cases, if defined.
    pub fn values(&self) -> Option<[f64; 2]> {
        match self {
            Annualized::Defined(values) => Some(*values),
            Annualized::Undefined => None,
        }
    }

    /// Check whether the figure is usable for ranking.
    pub fn is_defined(&self) -> bool {
        matches!(self, Annualized::Defined(_))
    }
}

impl From<[Option<f64>; 2]> for Annualized {
    fn from(values: [Option<f64>; 2]) -> Self {
        match values {
            [Some(yes), Some(no)] => Annualized::Defined([yes, no]),
            _ => Annualized::Undefined,
        }
    }
}

impl From<Annualized> for [Option<f64>; 2] {
    fn from(value: Annualized) -> Self {
        match value {
            Annualized::Defined([yes, no]) => [Some(yes), Some(no)],
            Annualized::Undefined => [None, None],
        }
    }
}

/// Which leg's resolution time sets the annualization horizon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum HorizonPolicy {
    /// The earlier resolution time.
    #[default]
    Earliest,
    /// The later resolution time; the position is locked until both resolve.
    Latest,
}

impl HorizonPolicy {
    /// Pick a horizon from two resolution times; both must be known.
    pub fn select(
        &self,
        a: Option<OffsetDateTime>,
        b: Option<OffsetDateTime>,
    ) -> Option<OffsetDateTime> {
        let (a, b) = (a?, b?);
        Some(match self {
            HorizonPolicy::Earliest => a.min(b),
            HorizonPolicy::Latest => a.max(b),
        })
    }
}

/// Contract quantities and horizon policy used for cached returns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnSettings {
    /// Yes contracts bought.
    pub yes_contracts: Decimal,
    /// No contracts bought.
    pub no_contracts: Decimal,
    /// Horizon selection for annualization.
    pub horizon: HorizonPolicy,
}

impl Default for ReturnSettings {
    fn default() -> Self {
        Self {
            yes_contracts: Decimal::ONE,
            no_contracts: Decimal::ONE,
            horizon: HorizonPolicy::Earliest,
        }
    }
}

/// Return of buying the cheapest yes and cheapest no across two legs.
///
/// Yields `[yes_qty / investment - 1, no_qty / investment - 1]`.
pub fn absolute_return(
    leg_a: &Quote,
    leg_b: &Quote,
    yes_qty: Decimal,
    no_qty: Decimal,
) -> Result<[f64; 2], ReturnError> {
    let best_yes = min_price(leg_a.yes_ask, leg_b.yes_ask).ok_or(ReturnError::MissingData("yes ask"))?;
    let best_no = min_price(leg_a.no_ask, leg_b.no_ask).ok_or(ReturnError::MissingData("no ask"))?;

    let investment = best_yes * yes_qty + best_no * no_qty;
    if investment <= Decimal::ZERO {
        return Err(ReturnError::ZeroInvestment);
    }

    let ratio = |payout: Decimal| {
        (payout / investment - Decimal::ONE)
            .to_f64()
            .ok_or(ReturnError::MissingData("return out of range"))
    };
    Ok([ratio(yes_qty)?, ratio(no_qty)?])
}

fn min_price(a: Option<Decimal>, b: Option<Decimal>) -> Option<Decimal> {
    Some(a?.min(b?))
}

/// Years from `now` until `resolves_at`.
pub fn years_until(resolves_at: OffsetDateTime, now: OffsetDateTime) -> f64 {
    (resolves_at - now).as_seconds_f64() / SECONDS_PER_YEAR
}

/// Compound a point return over `years` into an annual rate.
///
/// Returns `Ok(None)` when the result overflows or is not real.
pub fn annualize(r: f64, years: f64) -> Result<Option<f64>, ReturnError> {
    if !years.is_finite() || years <= 0.0 {
        return Err(ReturnError::NonPositiveHorizon { years });
    }

    // A negative base with a fractional exponent yields NaN.
    let value = (1.0 + r).powf(1.0 / years) - 1.0;
    Ok(value.is_finite().then_some(value))
}

/// Annualize both cases of an absolute return.
///
/// Either case overflowing makes the whole figure undefined.
pub fn annualized_return(
    absolute: [f64; 2],
    resolves_at: OffsetDateTime,
    now: OffsetDateTime,
) -> Result<Annualized, ReturnError> {
    let years = years_until(resolves_at, now);
    let yes = annualize(absolute[0], years)?;
    let no = annualize(absolute[1], years)?;
    Ok(Annualized::from([yes, no]))
}

/// Best return over the two cross-leg trades, priced by walking ask depth.
///
/// The candidates are yes on A with no on B, and yes on B with no on A.
/// `None` means neither candidate can be filled at the requested size.
pub fn size_aware_return(
    yes_qty: Decimal,
    no_qty: Decimal,
    leg_a: &LegBooks,
    leg_b: &LegBooks,
) -> Option<f64> {
    let candidate = |yes_book: &OrderBook, no_book: &OrderBook| -> Option<f64> {
        let yes_price = yes_book.effective_price(BookSide::Ask, yes_qty)?;
        let no_price = no_book.effective_price(BookSide::Ask, no_qty)?;
        let cost = yes_price + no_price;
        if cost <= Decimal::ZERO {
            return None;
        }
        (Decimal::ONE / cost - Decimal::ONE).to_f64()
    };

    let first = candidate(&leg_a.yes, &leg_b.no);
    let second = candidate(&leg_b.yes, &leg_a.no);

    match (first, second) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, y) => x.or(y),
    }
}
