//! Cross-venue opportunity entity with cached return figures.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::returns::{absolute_return, annualized_return, Annualized, ReturnSettings};
use crate::error::ReturnError;
use crate::market::{MarketKey, Quote};

/// Two equivalent markets on different venues, priced together.
///
/// Legs are unordered but fixed at creation. Refresh replaces both quotes
/// and recomputes the cached returns in one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Opportunity id.
    pub id: Uuid,
    /// Shared normalized question.
    pub question: String,
    /// First leg.
    #[serde(rename = "market_1")]
    leg_a: Arc<Quote>,
    /// Second leg.
    #[serde(rename = "market_2")]
    leg_b: Arc<Quote>,
    /// When the quotes were last replaced.
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
    /// Return if the market resolves yes and if it resolves no.
    absolute_return: [f64; 2],
    /// Annualized counterpart of `absolute_return`.
    annualized_return: Annualized,
}

impl Opportunity {
    /// Pair two quotes under a fresh id and compute cached returns.
    pub fn new(
        question: impl Into<String>,
        leg_a: Arc<Quote>,
        leg_b: Arc<Quote>,
        settings: &ReturnSettings,
        now: OffsetDateTime,
    ) -> Result<Self, ReturnError> {
        let (absolute_return, annualized_return) = compute_returns(&leg_a, &leg_b, settings, now)?;

        Ok(Self {
            id: Uuid::new_v4(),
            question: question.into(),
            leg_a,
            leg_b,
            last_update: now,
            absolute_return,
            annualized_return,
        })
    }

    /// First leg quote.
    pub fn leg_a(&self) -> &Arc<Quote> {
        &self.leg_a
    }

    /// Second leg quote.
    pub fn leg_b(&self) -> &Arc<Quote> {
        &self.leg_b
    }

    /// Keys of both legs.
    pub fn leg_keys(&self) -> [MarketKey; 2] {
        [self.leg_a.key(), self.leg_b.key()]
    }

    /// Cached absolute return.
    pub fn absolute_return(&self) -> [f64; 2] {
        self.absolute_return
    }

    /// Cached annualized return.
    pub fn annualized_return(&self) -> Annualized {
        self.annualized_return
    }

    /// Replace both legs and recompute cached returns.
    ///
    /// On error the opportunity is left untouched.
    pub fn refresh_with(
        &mut self,
        leg_a: Arc<Quote>,
        leg_b: Arc<Quote>,
        settings: &ReturnSettings,
        now: OffsetDateTime,
    ) -> Result<(), ReturnError> {
        let (absolute, annualized) = compute_returns(&leg_a, &leg_b, settings, now)?;

        self.leg_a = leg_a;
        self.leg_b = leg_b;
        self.absolute_return = absolute;
        self.annualized_return = annualized;
        self.last_update = now;
        Ok(())
    }
}

fn compute_returns(
    leg_a: &Quote,
    leg_b: &Quote,
    settings: &ReturnSettings,
    now: OffsetDateTime,
) -> Result<([f64; 2], Annualized), ReturnError> {
    let absolute = absolute_return(leg_a, leg_b, settings.yes_contracts, settings.no_contracts)?;

    let annualized = settings
        .horizon
        .select(leg_a.resolves_at(), leg_b.resolves_at())
        .ok_or(ReturnError::MissingResolutionTime)
        .and_then(|horizon| annualized_return(absolute, horizon, now));

    let annualized = match annualized {
        Ok(value) => value,
        Err(e) => {
            debug!(
                leg_a = %leg_a.key(),
                leg_b = %leg_b.key(),
                error = %e,
                "Annualized return undefined"
            );
            Annualized::Undefined
        }
    };

    Ok((absolute, annualized))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{MarketRef, Venue};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2030-01-01 00:00 UTC);

    fn quote(venue: Venue, id: &str, yes_ask: Decimal, no_ask: Decimal, resolves_at: OffsetDateTime) -> Arc<Quote> {
        let market = MarketRef::new(venue, id, "Will it rain?").with_resolution(resolves_at);
        Arc::new(Quote::new(market, yes_ask, no_ask, Decimal::ONE - no_ask, Decimal::ONE - yes_ask))
    }

    #[test]
    fn new_caches_returns() {
        let a = quote(Venue::Kalshi, "K", dec!(0.4), dec!(0.55), datetime!(2031-01-01 00:00 UTC));
        let b = quote(Venue::Polymarket, "P", dec!(0.5), dec!(0.45), datetime!(2032-01-01 00:00 UTC));

        let opp = Opportunity::new("will it rain", a, b, &ReturnSettings::default(), NOW).unwrap();

        let expected = 1.0 / 0.85 - 1.0;
        assert!((opp.absolute_return()[0] - expected).abs() < 1e-9);
        // Earliest horizon is exactly one 365-day year away.
        let annual = opp.annualized_return().values().unwrap();
        assert!((annual[0] - expected).abs() < 1e-9);
        assert_eq!(opp.last_update, NOW);
    }

    #[test]
    fn missing_resolution_time_is_undefined() {
        let a = quote(Venue::Kalshi, "K", dec!(0.4), dec!(0.55), datetime!(2031-01-01 00:00 UTC));
        let market = MarketRef::new(Venue::Polymarket, "P", "Will it rain?");
        let b = Arc::new(Quote::new(market, dec!(0.5), dec!(0.45), dec!(0.55), dec!(0.5)));

        let opp = Opportunity::new("q", a, b, &ReturnSettings::default(), NOW).unwrap();

        assert_eq!(opp.annualized_return(), Annualized::Undefined);
    }

    #[test]
    fn resolved_market_is_undefined() {
        let a = quote(Venue::Kalshi, "K", dec!(0.4), dec!(0.55), datetime!(2029-01-01 00:00 UTC));
        let b = quote(Venue::Polymarket, "P", dec!(0.5), dec!(0.45), datetime!(2031-01-01 00:00 UTC));

        let opp = Opportunity::new("q", a, b, &ReturnSettings::default(), NOW).unwrap();

        assert!(!opp.annualized_return().is_defined());
    }

    #[test]
    fn refresh_replaces_legs_and_returns() {
        let resolves = datetime!(2031-01-01 00:00 UTC);
        let a = quote(Venue::Kalshi, "K", dec!(0.4), dec!(0.55), resolves);
        let b = quote(Venue::Polymarket, "P", dec!(0.5), dec!(0.45), resolves);
        let mut opp = Opportunity::new("q", a, b, &ReturnSettings::default(), NOW).unwrap();
        let id = opp.id;

        let later = datetime!(2030-02-01 00:00 UTC);
        let a = quote(Venue::Kalshi, "K", dec!(0.5), dec!(0.5), resolves);
        let b = quote(Venue::Polymarket, "P", dec!(0.5), dec!(0.5), resolves);
        opp.refresh_with(a, b, &ReturnSettings::default(), later).unwrap();

        assert_eq!(opp.id, id);
        assert_eq!(opp.absolute_return(), [0.0, 0.0]);
        assert_eq!(opp.annualized_return().values(), Some([0.0, 0.0]));
        assert_eq!(opp.last_update, later);
    }

    #[test]
    fn serializes_with_null_annualized() {
        let a = quote(Venue::Kalshi, "K", dec!(0.4), dec!(0.55), datetime!(2029-01-01 00:00 UTC));
        let b = quote(Venue::Polymarket, "P", dec!(0.5), dec!(0.45), datetime!(2031-01-01 00:00 UTC));
        let opp = Opportunity::new("q", a, b, &ReturnSettings::default(), NOW).unwrap();

        let value = serde_json::to_value(&opp).unwrap();

        assert_eq!(value["annualized_return"], serde_json::json!([null, null]));
        assert_eq!(value["market_1"]["venue"], "kalshi");
        assert_eq!(value["market_2"]["yes_ask"], 0.5);
        assert_eq!(value["last_update"], "2030-01-01T00:00:00Z");

        let back: Opportunity = serde_json::from_value(value).unwrap();
        assert_eq!(back, opp);
    }
}
