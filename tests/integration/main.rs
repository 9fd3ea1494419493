//! End-to-end tests for the arbitrage scanner.
//!
//! The pipeline tests run against in-memory venues and the lexical oracle.
//! Tests marked `#[ignore]` call the public venue APIs.
//! Run with: cargo test --test integration -- --ignored

use std::sync::Arc;
use std::time::Duration;

use crossmarket_arb::arbitrage::{HorizonPolicy, ReturnSettings, SortKey};
use crossmarket_arb::config::Config;
use crossmarket_arb::equivalence::{LexicalOracle, QuestionEquivalenceResolver, ResolverStage};
use crossmarket_arb::market::{
    KalshiClient, MarketRef, MockMarket, MockVenueClient, PolymarketClient, Venue, VenueClient,
    VenueRegistry,
};
use crossmarket_arb::scan::{ScanLoop, ScanSettings, ThresholdStrategy};
use crossmarket_arb::store::{
    build_opportunities, refresh_opportunities, JsonRepository, OpportunityStore,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

const FED: &str = "Will the Fed cut rates in March?";
const BTC: &str = "Will BTC close above $100k?";

struct Venues {
    kalshi: MockVenueClient,
    polymarket: MockVenueClient,
    registry: VenueRegistry,
}

fn market(venue: Venue, id: &str, question: &str) -> MarketRef {
    MarketRef::new(venue, id, question).with_resolution(OffsetDateTime::now_utc() + time::Duration::days(180))
}

fn listed(venue: Venue, id: &str, question: &str, yes: Decimal, no: Decimal) -> MockMarket {
    MockMarket::priced(market(venue, id, question), yes, no)
        .with_asks(&[(yes, dec!(500))], &[(no, dec!(500))])
}

fn venues() -> Venues {
    let kalshi = MockVenueClient::new(Venue::Kalshi);
    kalshi.add_market(listed(Venue::Kalshi, "FED-MAR", FED, dec!(0.40), dec!(0.62)));
    kalshi.add_market(listed(Venue::Kalshi, "BTC-100K", BTC, dec!(0.50), dec!(0.52)));
    kalshi.add_market(listed(Venue::Kalshi, "SNOW-MIA", "Will it snow in Miami?", dec!(0.02), dec!(0.99)));

    let polymarket = MockVenueClient::new(Venue::Polymarket);
    polymarket.add_market(listed(Venue::Polymarket, "0xfed", FED, dec!(0.55), dec!(0.45)));
    polymarket.add_market(listed(
        Venue::Polymarket,
        "0xfed2030",
        "Will the Fed cut rates in March 2030?",
        dec!(0.50),
        dec!(0.50),
    ));
    polymarket.add_market(listed(Venue::Polymarket, "0xbtc", "Will BTC close above 100k?", dec!(0.49), dec!(0.50)));

    let registry = VenueRegistry::new()
        .with_client(VenueClient::Mock(kalshi.clone()))
        .with_client(VenueClient::Mock(polymarket.clone()));

    Venues {
        kalshi,
        polymarket,
        registry,
    }
}

async fn discover(registry: &VenueRegistry) -> Vec<(Venue, Vec<MarketRef>)> {
    let mut markets = Vec::new();
    for venue in [Venue::Kalshi, Venue::Polymarket] {
        let client = registry.client(venue).unwrap();
        markets.push((venue, client.fetch_active_markets(None).await.unwrap()));
    }
    markets
}

fn resolver() -> QuestionEquivalenceResolver {
    QuestionEquivalenceResolver::new(Arc::new(LexicalOracle), 0.6, 3)
}

#[tokio::test]
async fn resolve_pairs_equivalent_questions_across_venues() {
    let venues = venues();
    let markets = discover(&venues.registry).await;

    let classes = resolver().resolve(&markets).await.unwrap();

    assert_eq!(classes.stage, ResolverStage::Narrowed);
    assert_eq!(classes.cross_venue().count(), 2);
    for class in &classes.classes {
        for venue in class.venues() {
            let on_venue = class.markets.iter().filter(|m| m.venue == venue).count();
            assert_eq!(on_venue, 1, "class {:?} has {} markets on {}", class.question, on_venue, venue);
        }
    }

    let fed = classes.get("will the fed cut rates in march").unwrap();
    let ids: Vec<&str> = fed.markets.iter().map(|m| m.market_id.as_str()).collect();
    assert_eq!(ids, vec!["FED-MAR", "0xfed"]);
}

#[tokio::test]
async fn build_refresh_and_persist_pipeline() {
    let venues = venues();
    let dir = tempfile::tempdir().unwrap();
    let repository = JsonRepository::new(dir.path());
    let settings = ReturnSettings::default();

    let classes = resolver().resolve(&discover(&venues.registry).await).await.unwrap();
    repository.save_classes(&classes).await.unwrap();

    let built = build_opportunities(
        &repository.load_classes().await.unwrap(),
        &venues.registry,
        &settings,
        OffsetDateTime::now_utc(),
    )
    .await;
    assert_eq!(built.len(), 2);

    let store = OpportunityStore::new(built.clone());
    let best = store.list(Some(SortKey::AbsoluteReturn)).remove(0);
    assert_eq!(best.question, "will the fed cut rates in march");
    let expected = 1.0 / 0.85 - 1.0;
    assert!((best.absolute_return()[0] - expected).abs() < 1e-9);
    assert!(best.annualized_return().is_defined());

    repository.save_opportunities(&built).await.unwrap();

    // BTC disappears from Polymarket before the next refresh.
    venues.polymarket.remove_market("0xbtc");
    let (refreshed, report) = refresh_opportunities(
        repository.load_opportunities().await.unwrap(),
        &venues.registry,
        &settings,
        OffsetDateTime::now_utc(),
        None,
    )
    .await;

    assert_eq!(report.refreshed, 1);
    assert_eq!(report.dropped, 1);
    assert_eq!(refreshed.len(), 1);
    assert_eq!(refreshed[0].question, "will the fed cut rates in march");
    assert_eq!(refreshed[0].id, best.id);
}

#[tokio::test]
async fn scan_cycle_selects_only_profitable_depth() {
    let venues = venues();
    let classes = resolver().resolve(&discover(&venues.registry).await).await.unwrap();
    let built = build_opportunities(
        &classes,
        &venues.registry,
        &ReturnSettings::default(),
        OffsetDateTime::now_utc(),
    )
    .await;

    let store = Arc::new(RwLock::new(OpportunityStore::new(built)));
    let dir = tempfile::tempdir().unwrap();
    let repository = JsonRepository::new(dir.path());
    let scan = ScanLoop::new(
        Arc::clone(&store),
        Arc::new(venues.registry),
        Arc::new(ThresholdStrategy::new(0.07, HorizonPolicy::Latest)),
        ScanSettings {
            interval: Duration::from_millis(10),
            top_n: 1,
            bet_size: dec!(100),
            returns: ReturnSettings::default(),
        },
    )
    .with_repository(repository.clone());

    let report = scan.run_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.refresh.refreshed, 2);
    // only the head of the cheap ranking is priced against books
    assert_eq!(report.priced, 1);
    assert_eq!(venues.kalshi.book_requests(), 1);
    assert_eq!(report.selected.len(), 1);
    assert_eq!(repository.load_opportunities().await.unwrap().len(), 2);
}

#[tokio::test]
async fn thin_books_are_not_selected() {
    let venues = venues();
    venues.kalshi.add_market(
        MockMarket::priced(market(Venue::Kalshi, "FED-MAR", FED), dec!(0.40), dec!(0.62))
            .with_asks(&[(dec!(0.40), dec!(5))], &[(dec!(0.62), dec!(5))]),
    );
    let classes = resolver().resolve(&discover(&venues.registry).await).await.unwrap();
    let built = build_opportunities(
        &classes,
        &venues.registry,
        &ReturnSettings::default(),
        OffsetDateTime::now_utc(),
    )
    .await;

    let scan = ScanLoop::new(
        Arc::new(RwLock::new(OpportunityStore::new(built))),
        Arc::new(venues.registry),
        Arc::new(ThresholdStrategy::new(0.07, HorizonPolicy::Latest)),
        ScanSettings {
            interval: Duration::from_millis(10),
            top_n: 10,
            bet_size: dec!(100),
            returns: ReturnSettings::default(),
        },
    );

    let report = scan.run_cycle(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.priced, 2);
    assert!(report.selected.is_empty());
}

/// Live Kalshi market listing.
#[tokio::test]
#[ignore = "requires network access"]
async fn kalshi_lists_open_markets() {
    let client = KalshiClient::new(&Config::default()).unwrap();

    let markets = client.fetch_active_markets(Some(5)).await.unwrap();
    assert!(!markets.is_empty());

    let quotes = client.fetch_quotes(&markets).await.unwrap();
    println!("Fetched {} Kalshi quotes", quotes.len());
}

/// Live Polymarket market listing and books.
#[tokio::test]
#[ignore = "requires network access"]
async fn polymarket_lists_active_markets() {
    let client = PolymarketClient::new(&Config::default()).unwrap();

    let markets = client.fetch_active_markets(Some(5)).await.unwrap();
    assert!(!markets.is_empty());

    match client.fetch_order_books(&markets[0]).await {
        Ok(books) => println!(
            "Best yes ask: {:?}",
            books.yes.best_ask().ok().map(|level| level.price)
        ),
        Err(e) => println!("No book for {}: {}", markets[0].market_id, e),
    }
}
