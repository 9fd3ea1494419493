//! Strategies receive the re-ranked candidates at the end of each scan cycle.

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use super::top::RankedOpportunity;
use crate::arbitrage::{annualize, years_until, HorizonPolicy};
use crate::config::Config;
use crate::metrics;

/// Candidate picked by a strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    /// Opportunity id.
    pub id: Uuid,
    /// Annualized depth-aware return.
    pub annualized_return: f64,
}

/// Callback invoked with depth-ranked candidates, best first.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Act on this cycle's candidates and report what was selected.
    async fn on_candidates(&self, candidates: &[RankedOpportunity], now: OffsetDateTime) -> Vec<Selection>;
}

/// Selects candidates whose annualized depth-aware return clears a threshold.
#[derive(Debug, Clone)]
pub struct ThresholdStrategy {
    min_annualized_return: f64,
    horizon: HorizonPolicy,
}

impl ThresholdStrategy {
    /// Create a strategy with an explicit threshold and horizon policy.
    pub fn new(min_annualized_return: f64, horizon: HorizonPolicy) -> Self {
        Self {
            min_annualized_return,
            horizon,
        }
    }

    /// Create a strategy from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.min_annualized_return, config.strategy_horizon_policy)
    }

    /// Annualized depth-aware return of a candidate, if it can be computed.
    pub fn annualized(&self, candidate: &RankedOpportunity, now: OffsetDateTime) -> Option<f64> {
        let r = candidate.size_aware_return?;
        let opportunity = &candidate.opportunity;
        let horizon = self
            .horizon
            .select(opportunity.leg_a().resolves_at(), opportunity.leg_b().resolves_at())?;
        annualize(r, years_until(horizon, now)).ok().flatten()
    }

    /// Candidates above the threshold, in input order.
    pub fn select(&self, candidates: &[RankedOpportunity], now: OffsetDateTime) -> Vec<Selection> {
        candidates
            .iter()
            .filter_map(|candidate| {
                let annualized = self.annualized(candidate, now)?;
                (annualized > self.min_annualized_return).then(|| Selection {
                    id: candidate.opportunity.id,
                    annualized_return: annualized,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Strategy for ThresholdStrategy {
    async fn on_candidates(&self, candidates: &[RankedOpportunity], now: OffsetDateTime) -> Vec<Selection> {
        let selected = self.select(candidates, now);

        for selection in &selected {
            let Some(candidate) = candidates.iter().find(|c| c.opportunity.id == selection.id) else {
                continue;
            };
            let (leg_a, leg_b) = (candidate.opportunity.leg_a(), candidate.opportunity.leg_b());
            info!(
                id = %selection.id,
                annualized = format!("{:.2}%", selection.annualized_return * 100.0),
                venue_a = %leg_a.venue(),
                question_a = leg_a.question(),
                venue_b = %leg_b.venue(),
                question_b = leg_b.question(),
                "Arbitrage candidate above threshold"
            );
        }

        debug!(
            candidates = candidates.len(),
            selected = selected.len(),
            threshold = self.min_annualized_return,
            "Strategy evaluated"
        );
        metrics::inc_strategy_selected(selected.len());
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::{Opportunity, ReturnSettings};
    use crate::market::{MarketRef, Quote, Venue};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2030-01-01 00:00 UTC);

    fn candidate(resolve_a: OffsetDateTime, resolve_b: OffsetDateTime, r: Option<f64>) -> RankedOpportunity {
        let quote = |venue: Venue, id: &str, at: OffsetDateTime| {
            let market = MarketRef::new(venue, id, "q").with_resolution(at);
            Arc::new(Quote::new(market, dec!(0.4), dec!(0.5), dec!(0.5), dec!(0.6)))
        };
        let opportunity = Opportunity::new(
            "q",
            quote(Venue::Kalshi, "K", resolve_a),
            quote(Venue::Polymarket, "P", resolve_b),
            &ReturnSettings::default(),
            NOW,
        )
        .unwrap();
        RankedOpportunity {
            opportunity,
            size_aware_return: r,
        }
    }

    #[test]
    fn later_horizon_lowers_annualized_return() {
        let c = candidate(datetime!(2031-01-01 00:00 UTC), datetime!(2032-01-01 00:00 UTC), Some(0.1));

        let latest = ThresholdStrategy::new(0.0, HorizonPolicy::Latest).annualized(&c, NOW).unwrap();
        let earliest = ThresholdStrategy::new(0.0, HorizonPolicy::Earliest).annualized(&c, NOW).unwrap();

        assert!((earliest - 0.1).abs() < 1e-12);
        assert!(latest < earliest);
    }

    #[test]
    fn selects_only_above_threshold() {
        let year = datetime!(2031-01-01 00:00 UTC);
        let candidates = vec![
            candidate(year, year, Some(0.12)),
            candidate(year, year, Some(0.05)),
            candidate(year, year, None),
        ];
        let strategy = ThresholdStrategy::new(0.07, HorizonPolicy::Latest);

        let selected = strategy.select(&candidates, NOW);

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, candidates[0].opportunity.id);
    }

    #[test]
    fn past_horizon_is_never_selected() {
        let past = datetime!(2029-06-01 00:00 UTC);
        let candidates = vec![candidate(past, past, Some(0.5))];

        assert!(ThresholdStrategy::new(0.0, HorizonPolicy::Latest)
            .select(&candidates, NOW)
            .is_empty());
    }

    #[tokio::test]
    async fn on_candidates_returns_selection() {
        let year = datetime!(2031-01-01 00:00 UTC);
        let candidates = vec![candidate(year, year, Some(0.2))];

        let selected = ThresholdStrategy::new(0.07, HorizonPolicy::Latest)
            .on_candidates(&candidates, NOW)
            .await;

        assert_eq!(selected.len(), 1);
    }
}
