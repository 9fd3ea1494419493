//! Opportunity lifecycle: build, refresh, delete, sort.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::arbitrage::{sort_opportunities, Opportunity, ReturnSettings, SortKey};
use crate::equivalence::EquivalenceClasses;
use crate::error::{MarketError, StoreError};
use crate::market::{MarketKey, MarketRef, OrderBookFetcher, Quote, QuoteFetcher, Venue};
use crate::metrics;
use crate::orderbook::LegBooks;

/// Fresh quotes keyed by venue and market id.
pub type QuoteMap = HashMap<MarketKey, Arc<Quote>>;

/// Fetch quotes for the given markets, grouped per venue and chunked to the
/// venue's batch limit.
///
/// A failed batch is logged and its markets are simply missing from the
/// result. Once `cancel` fires no further batch is requested.
#[instrument(skip_all)]
pub async fn fetch_quotes_by_venue<'a, I>(
    fetcher: &dyn QuoteFetcher,
    markets: I,
    cancel: Option<&CancellationToken>,
) -> QuoteMap
where
    I: IntoIterator<Item = &'a MarketRef>,
{
    let mut by_venue: BTreeMap<Venue, Vec<MarketRef>> = BTreeMap::new();
    let mut seen: HashSet<MarketKey> = HashSet::new();
    for market in markets {
        if seen.insert(market.key()) {
            by_venue.entry(market.venue).or_default().push(market.clone());
        }
    }

    let mut quotes = QuoteMap::new();
    'venues: for (venue, markets) in by_venue {
        let batch_size = fetcher.batch_size(venue).max(1);
        for (n, batch) in markets.chunks(batch_size).enumerate() {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                debug!(venue = %venue, batch = n, "Quote fetch cancelled");
                break 'venues;
            }
            match fetcher.fetch_quotes(venue, batch).await {
                Ok(fetched) => {
                    for quote in fetched {
                        quotes.insert(quote.key(), Arc::new(quote));
                    }
                }
                Err(e) => {
                    metrics::inc_quote_batches_failed(venue);
                    warn!(venue = %venue, batch = n, size = batch.len(), error = %e, "Quote batch failed");
                }
            }
        }
    }

    debug!(quotes = quotes.len(), "Fetched quotes");
    quotes
}

/// Pair every two markets on different venues within each class.
#[instrument(skip_all, fields(classes = classes.len()))]
pub async fn build_opportunities(
    classes: &EquivalenceClasses,
    fetcher: &dyn QuoteFetcher,
    settings: &ReturnSettings,
    now: OffsetDateTime,
) -> Vec<Opportunity> {
    let candidates: Vec<_> = classes.cross_venue().collect();
    let quotes = fetch_quotes_by_venue(
        fetcher,
        candidates.iter().flat_map(|class| class.markets.iter()),
        None,
    )
    .await;

    let mut built = Vec::new();
    for class in candidates {
        for (i, first) in class.markets.iter().enumerate() {
            for second in &class.markets[i + 1..] {
                if first.venue == second.venue {
                    continue;
                }

                let (Some(leg_a), Some(leg_b)) = (quotes.get(&first.key()), quotes.get(&second.key())) else {
                    debug!(
                        question = %class.question,
                        leg_a = %first.key(),
                        leg_b = %second.key(),
                        "No quote for a leg; skipping pair"
                    );
                    continue;
                };

                match Opportunity::new(class.question.clone(), Arc::clone(leg_a), Arc::clone(leg_b), settings, now) {
                    Ok(opportunity) => built.push(opportunity),
                    Err(e) => debug!(question = %class.question, error = %e, "Cannot price pair"),
                }
            }
        }
    }

    metrics::inc_opportunities_built(built.len());
    info!(built = built.len(), "Built opportunities");
    built
}

/// Outcome of a refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Opportunities updated with fresh quotes.
    pub refreshed: usize,
    /// Opportunities dropped for a missing or unpriceable leg.
    pub dropped: usize,
}

/// Replace every opportunity's legs with fresh quotes.
///
/// An opportunity is dropped when either leg has no fresh quote. If `cancel`
/// fires during the quote fetch, `existing` comes back unchanged with an
/// empty report.
#[instrument(skip_all, fields(count = existing.len()))]
pub async fn refresh_opportunities(
    existing: Vec<Opportunity>,
    fetcher: &dyn QuoteFetcher,
    settings: &ReturnSettings,
    now: OffsetDateTime,
    cancel: Option<&CancellationToken>,
) -> (Vec<Opportunity>, RefreshReport) {
    let quotes = fetch_quotes_by_venue(
        fetcher,
        existing
            .iter()
            .flat_map(|o| [&o.leg_a().market, &o.leg_b().market]),
        cancel,
    )
    .await;

    if cancel.is_some_and(CancellationToken::is_cancelled) {
        debug!("Refresh cancelled; opportunities unchanged");
        return (existing, RefreshReport::default());
    }

    let mut report = RefreshReport::default();
    let mut kept = Vec::with_capacity(existing.len());

    for mut opportunity in existing {
        let [key_a, key_b] = opportunity.leg_keys();
        let fresh_a = quotes.get(&key_a);
        let fresh_b = quotes.get(&key_b);

        let (Some(fresh_a), Some(fresh_b)) = (fresh_a, fresh_b) else {
            for (leg, key, found) in [("a", &key_a, fresh_a.is_some()), ("b", &key_b, fresh_b.is_some())] {
                if !found {
                    warn!(
                        id = %opportunity.id,
                        leg,
                        venue = %key.venue,
                        market_id = %key.market_id,
                        "No fresh quote for leg; dropping opportunity"
                    );
                }
            }
            report.dropped += 1;
            continue;
        };

        match opportunity.refresh_with(Arc::clone(fresh_a), Arc::clone(fresh_b), settings, now) {
            Ok(()) => {
                report.refreshed += 1;
                kept.push(opportunity);
            }
            Err(e) => {
                warn!(id = %opportunity.id, error = %e, "Cannot price refreshed legs; dropping opportunity");
                report.dropped += 1;
            }
        }
    }

    metrics::inc_opportunities_refreshed(report.refreshed);
    metrics::inc_opportunities_dropped(report.dropped);
    info!(refreshed = report.refreshed, dropped = report.dropped, "Refreshed opportunities");
    (kept, report)
}

/// Fetch current books for both legs of an opportunity.
pub async fn fetch_leg_books(
    opportunity: &Opportunity,
    fetcher: &dyn OrderBookFetcher,
) -> Result<[LegBooks; 2], MarketError> {
    let leg_a = fetcher.fetch_order_books(&opportunity.leg_a().market).await?;
    let leg_b = fetcher.fetch_order_books(&opportunity.leg_b().market).await?;
    Ok([leg_a, leg_b])
}

/// In-memory opportunity set.
#[derive(Debug, Clone, Default)]
pub struct OpportunityStore {
    opportunities: Vec<Opportunity>,
}

impl OpportunityStore {
    /// Create a store holding `opportunities`.
    pub fn new(opportunities: Vec<Opportunity>) -> Self {
        Self { opportunities }
    }

    /// Number of stored opportunities.
    pub fn len(&self) -> usize {
        self.opportunities.len()
    }

    /// Check for an empty store.
    pub fn is_empty(&self) -> bool {
        self.opportunities.is_empty()
    }

    /// All opportunities in storage order.
    pub fn all(&self) -> &[Opportunity] {
        &self.opportunities
    }

    /// Swap in refreshed copies of the stored opportunities.
    ///
    /// Only ids still present are kept, so an opportunity deleted while the
    /// refresh was in flight stays deleted. Returns the new set.
    pub fn retain_refreshed(&mut self, refreshed: Vec<Opportunity>) -> Vec<Opportunity> {
        let present: HashSet<Uuid> = self.opportunities.iter().map(|o| o.id).collect();
        let stale = refreshed.iter().filter(|o| !present.contains(&o.id)).count();
        if stale > 0 {
            debug!(stale, "Skipping refreshed opportunities deleted mid-refresh");
        }
        self.opportunities = refreshed.into_iter().filter(|o| present.contains(&o.id)).collect();
        self.opportunities.clone()
    }

    /// Look up an opportunity by id.
    pub fn get(&self, id: Uuid) -> Option<&Opportunity> {
        self.opportunities.iter().find(|o| o.id == id)
    }

    /// Look up an opportunity by id or fail with `NotFound`.
    pub fn require(&self, id: Uuid) -> Result<&Opportunity, StoreError> {
        self.get(id).ok_or(StoreError::NotFound(id))
    }

    /// Remove an opportunity; returns whether it was present.
    pub fn delete(&mut self, id: Uuid) -> bool {
        let before = self.opportunities.len();
        self.opportunities.retain(|o| o.id != id);
        self.opportunities.len() != before
    }

    /// Copy of the set, sorted best first when a key is given.
    pub fn list(&self, sort: Option<SortKey>) -> Vec<Opportunity> {
        let mut list = self.opportunities.clone();
        if let Some(key) = sort {
            sort_opportunities(&mut list, key);
        }
        list
    }
}
