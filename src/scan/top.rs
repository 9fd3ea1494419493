//! Two-stage ranking: cheap quote-based sort, then depth-aware pricing of the head.

use rust_decimal::Decimal;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::arbitrage::{size_aware_return, sort_by_optional_score, sort_opportunities, Opportunity, SortKey};
use crate::market::OrderBookFetcher;
use crate::store::fetch_leg_books;

/// An opportunity with its depth-aware return at the requested size.
#[derive(Debug, Clone, Serialize)]
pub struct RankedOpportunity {
    /// The priced opportunity.
    #[serde(flatten)]
    pub opportunity: Opportunity,
    /// Best cross-leg return when filling `bet_size` on each side.
    ///
    /// `None` when books are unavailable or too thin.
    pub size_aware_return: Option<f64>,
}

/// Rank by annualized quote return, then price only the best `n` against order books.
///
/// The result is sorted by depth-aware return, best first, unpriceable entries last.
/// Cancellation stops issuing book requests and returns what was priced so far.
#[instrument(skip(opportunities, fetcher, cancel), fields(total = opportunities.len()))]
pub async fn top_n_opportunities(
    mut opportunities: Vec<Opportunity>,
    fetcher: &dyn OrderBookFetcher,
    n: usize,
    bet_size: Decimal,
    cancel: &CancellationToken,
) -> Vec<RankedOpportunity> {
    sort_opportunities(&mut opportunities, SortKey::AnnualizedReturn);
    opportunities.truncate(n);

    let mut priced = Vec::with_capacity(opportunities.len());
    for opportunity in opportunities {
        if cancel.is_cancelled() {
            debug!(priced = priced.len(), "Cancelled while pricing order books");
            break;
        }

        let score = match fetch_leg_books(&opportunity, fetcher).await {
            Ok([leg_a, leg_b]) => size_aware_return(bet_size, bet_size, &leg_a, &leg_b),
            Err(e) => {
                warn!(id = %opportunity.id, error = %e, "Order books unavailable");
                None
            }
        };
        priced.push((opportunity, score));
    }

    sort_by_optional_score(&mut priced);
    priced
        .into_iter()
        .map(|(opportunity, size_aware_return)| RankedOpportunity {
            opportunity,
            size_aware_return,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::ReturnSettings;
    use crate::market::{MarketRef, MockConfig, MockMarket, MockVenueClient, Quote, Venue, VenueClient, VenueRegistry};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use time::macros::datetime;
    use time::OffsetDateTime;

    const NOW: OffsetDateTime = datetime!(2030-01-01 00:00 UTC);

    fn market(venue: Venue, id: &str) -> MarketRef {
        MarketRef::new(venue, id, "same question").with_resolution(datetime!(2031-01-01 00:00 UTC))
    }

    fn opportunity(kalshi: &str, poly: &str, yes: Decimal, no: Decimal) -> Opportunity {
        let quote = |m: MarketRef, yes_ask: Decimal, no_ask: Decimal| {
            Arc::new(Quote::new(m, yes_ask, no_ask, Decimal::ONE - no_ask, Decimal::ONE - yes_ask))
        };
        Opportunity::new(
            "same question",
            quote(market(Venue::Kalshi, kalshi), yes, dec!(0.9)),
            quote(market(Venue::Polymarket, poly), dec!(0.9), no),
            &ReturnSettings::default(),
            NOW,
        )
        .unwrap()
    }

    fn deep(price: Decimal) -> Vec<(Decimal, Decimal)> {
        vec![(price, dec!(100))]
    }

    #[tokio::test]
    async fn only_the_head_is_priced() {
        let kalshi = MockVenueClient::new(Venue::Kalshi);
        let polymarket = MockVenueClient::new(Venue::Polymarket);
        for id in ["K1", "K2", "K3"] {
            kalshi.add_market(
                MockMarket::priced(market(Venue::Kalshi, id), dec!(0.4), dec!(0.9))
                    .with_asks(&deep(dec!(0.4)), &deep(dec!(0.9))),
            );
        }
        for id in ["P1", "P2", "P3"] {
            polymarket.add_market(
                MockMarket::priced(market(Venue::Polymarket, id), dec!(0.9), dec!(0.5))
                    .with_asks(&deep(dec!(0.9)), &deep(dec!(0.5))),
            );
        }
        let registry = VenueRegistry::new()
            .with_client(VenueClient::Mock(kalshi.clone()))
            .with_client(VenueClient::Mock(polymarket.clone()));
        let opportunities = vec![
            opportunity("K1", "P1", dec!(0.45), dec!(0.5)),
            opportunity("K2", "P2", dec!(0.40), dec!(0.5)),
            opportunity("K3", "P3", dec!(0.48), dec!(0.5)),
        ];

        let ranked =
            top_n_opportunities(opportunities, &registry, 2, dec!(10), &CancellationToken::new()).await;

        assert_eq!(ranked.len(), 2);
        assert_eq!(kalshi.book_requests(), 2);
        assert_eq!(ranked[0].opportunity.leg_a().market_id(), "K2");
        assert_eq!(ranked[1].opportunity.leg_a().market_id(), "K1");
        // yes 0.4 on K, no 0.5 on P
        let expected = 1.0 / 0.9 - 1.0;
        assert!((ranked[0].size_aware_return.unwrap() - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn thin_or_missing_books_sink_last() {
        let kalshi = MockVenueClient::new(Venue::Kalshi);
        kalshi.add_market(
            MockMarket::priced(market(Venue::Kalshi, "K1"), dec!(0.4), dec!(0.9))
                .with_asks(&[(dec!(0.4), dec!(1))], &[(dec!(0.9), dec!(1))]),
        );
        kalshi.add_market(
            MockMarket::priced(market(Venue::Kalshi, "K2"), dec!(0.45), dec!(0.9))
                .with_asks(&deep(dec!(0.45)), &deep(dec!(0.9))),
        );
        let polymarket = MockVenueClient::new(Venue::Polymarket);
        for id in ["P1", "P2"] {
            polymarket.add_market(
                MockMarket::priced(market(Venue::Polymarket, id), dec!(0.9), dec!(0.5))
                    .with_asks(&deep(dec!(0.9)), &deep(dec!(0.5))),
            );
        }
        let registry = VenueRegistry::new()
            .with_client(VenueClient::Mock(kalshi))
            .with_client(VenueClient::Mock(polymarket));
        let opportunities = vec![
            opportunity("K1", "P1", dec!(0.4), dec!(0.5)),
            opportunity("K2", "P2", dec!(0.45), dec!(0.5)),
        ];

        let ranked =
            top_n_opportunities(opportunities, &registry, 10, dec!(20), &CancellationToken::new()).await;

        assert_eq!(ranked[0].opportunity.leg_a().market_id(), "K2");
        assert!(ranked[0].size_aware_return.is_some());
        assert_eq!(ranked[1].size_aware_return, None);
    }

    #[tokio::test]
    async fn failing_book_fetch_is_unpriced() {
        let kalshi = MockVenueClient::with_config(
            Venue::Kalshi,
            MockConfig {
                fail_order_books: true,
                ..MockConfig::default()
            },
        );
        let registry = VenueRegistry::new().with_client(VenueClient::Mock(kalshi));

        let ranked = top_n_opportunities(
            vec![opportunity("K1", "P1", dec!(0.4), dec!(0.5))],
            &registry,
            5,
            dec!(1),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].size_aware_return, None);
    }

    #[tokio::test]
    async fn cancelled_token_prices_nothing() {
        let kalshi = MockVenueClient::new(Venue::Kalshi);
        let registry = VenueRegistry::new().with_client(VenueClient::Mock(kalshi.clone()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let ranked = top_n_opportunities(
            vec![opportunity("K1", "P1", dec!(0.4), dec!(0.5))],
            &registry,
            5,
            dec!(1),
            &cancel,
        )
        .await;

        assert!(ranked.is_empty());
        assert_eq!(kalshi.book_requests(), 0);
    }
}
