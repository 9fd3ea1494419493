//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::arbitrage::{Opportunity, SortKey};
use crate::market::VenueRegistry;
use crate::orderbook::LegBooks;
use crate::scan::{top_n_opportunities, RankedOpportunity, ScanSettings, SharedStore};
use crate::store::{fetch_leg_books, refresh_opportunities, JsonRepository};

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether opportunities have been loaded.
    pub ready: Arc<AtomicBool>,
    /// Opportunity store shared with the scan loop.
    pub store: SharedStore,
    /// Venue clients.
    pub registry: Arc<VenueRegistry>,
    /// Where refreshed opportunities are saved.
    pub repository: Option<JsonRepository>,
    /// Defaults for refresh and top-N ranking.
    pub settings: Arc<ScanSettings>,
}

impl AppState {
    /// Create new app state.
    pub fn new(store: SharedStore, registry: Arc<VenueRegistry>, settings: ScanSettings) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            store,
            registry,
            repository: None,
            settings: Arc::new(settings),
        }
    }

    /// Persist refreshed opportunities through `repository`.
    pub fn with_repository(mut self, repository: JsonRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("ready", &self.is_ready())
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether service is ready.
    pub ready: bool,
    /// Stored opportunities.
    pub opportunities: usize,
}

/// Query parameters for the opportunity list.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// Sort key; storage order when absent.
    pub sort: Option<SortKey>,
    /// Offset of the first result.
    #[serde(default)]
    pub page_index: usize,
    /// Page size; everything when absent.
    pub results_per_page: Option<usize>,
}

/// One page of opportunities.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    /// Number of opportunities in this page.
    pub results: usize,
    /// The page.
    pub data: Vec<Opportunity>,
    /// Offset of the next page, null on the last page.
    pub next_page_index: Option<usize>,
}

/// Query parameters for top-N ranking.
#[derive(Debug, Default, Deserialize)]
pub struct TopParams {
    /// How many opportunities to price against books.
    pub n: Option<usize>,
    /// Contracts per leg.
    pub bet_size: Option<Decimal>,
}

/// Refresh result.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// Human readable outcome.
    pub message: &'static str,
    /// Opportunities kept after refresh.
    pub total_opportunities: usize,
    /// Opportunities dropped for missing legs.
    pub dropped: usize,
}

/// Current books for both legs.
#[derive(Debug, Serialize)]
pub struct OrderBooksResponse {
    /// Opportunity id.
    pub id: Uuid,
    /// Books of the first leg.
    pub market_1: LegBooks,
    /// Books of the second leg.
    pub market_2: LegBooks,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let response = ReadyResponse {
        ready: is_ready,
        opportunities: state.store.read().await.len(),
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Paginated opportunity list.
///
/// # Errors
/// Returns `StatusCode::BAD_REQUEST` for a zero page size.
pub async fn list_opportunities(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, StatusCode> {
    if params.results_per_page == Some(0) {
        return Err(StatusCode::BAD_REQUEST);
    }
    let all = state.store.read().await.list(params.sort);
    Ok(Json(paginate(all, params.page_index, params.results_per_page)))
}

fn paginate(all: Vec<Opportunity>, page_index: usize, per_page: Option<usize>) -> ListResponse {
    let total = all.len();
    let per_page = per_page.unwrap_or(total);
    let end = page_index.saturating_add(per_page);

    let data: Vec<Opportunity> = all.into_iter().skip(page_index).take(per_page).collect();
    ListResponse {
        results: data.len(),
        data,
        next_page_index: (per_page > 0 && end < total).then_some(end),
    }
}

/// Single opportunity by id.
///
/// # Errors
/// Returns `StatusCode::NOT_FOUND` if the id is unknown.
pub async fn get_opportunity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Opportunity>, StatusCode> {
    let opportunity = state.store.read().await.get(id).cloned();
    opportunity.map(Json).ok_or(StatusCode::NOT_FOUND)
}

/// Delete an opportunity.
///
/// # Errors
/// Returns `StatusCode::NOT_FOUND` if the id is unknown.
pub async fn delete_opportunity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    if state.store.write().await.delete(id) {
        info!(%id, "Deleted opportunity");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

/// Fetch current order books for both legs.
///
/// # Errors
/// Returns `StatusCode::NOT_FOUND` if the id is unknown, or
/// `StatusCode::BAD_GATEWAY` if a venue cannot supply books.
pub async fn get_order_books(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderBooksResponse>, StatusCode> {
    let opportunity = state
        .store
        .read()
        .await
        .get(id)
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)?;

    let [market_1, market_2] = fetch_leg_books(&opportunity, state.registry.as_ref())
        .await
        .map_err(|e| {
            warn!(%id, error = %e, "Order book fetch failed");
            StatusCode::BAD_GATEWAY
        })?;

    Ok(Json(OrderBooksResponse {
        id,
        market_1,
        market_2,
    }))
}

/// Depth-aware ranking of the best `n` opportunities.
pub async fn top_opportunities(
    State(state): State<AppState>,
    Query(params): Query<TopParams>,
) -> Json<Vec<RankedOpportunity>> {
    let n = params.n.unwrap_or(state.settings.top_n);
    let bet_size = params.bet_size.unwrap_or(state.settings.bet_size);
    let all = state.store.read().await.all().to_vec();

    let ranked = top_n_opportunities(all, state.registry.as_ref(), n, bet_size, &CancellationToken::new()).await;
    Json(ranked)
}

/// Refresh all opportunities with fresh quotes and persist them.
///
/// # Errors
/// Returns `StatusCode::INTERNAL_SERVER_ERROR` if persistence fails.
pub async fn refresh(State(state): State<AppState>) -> Result<(StatusCode, Json<RefreshResponse>), StatusCode> {
    let existing = state.store.read().await.all().to_vec();
    let (refreshed, report) = refresh_opportunities(
        existing,
        state.registry.as_ref(),
        &state.settings.returns,
        OffsetDateTime::now_utc(),
        None,
    )
    .await;

    let current = state.store.write().await.retain_refreshed(refreshed);

    if let Some(repository) = &state.repository {
        repository.save_opportunities(&current).await.map_err(|e| {
            warn!(error = %e, "Failed to persist refreshed opportunities");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    }

    let total = current.len();

    Ok((
        StatusCode::CREATED,
        Json(RefreshResponse {
            message: "Opportunities refreshed",
            total_opportunities: total,
            dropped: report.dropped,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::ReturnSettings;
    use crate::market::{MarketRef, MockConfig, MockMarket, MockVenueClient, Quote, Venue, VenueClient};
    use crate::store::OpportunityStore;
    use rust_decimal_macros::dec;
    use time::macros::datetime;
    use tokio::sync::RwLock;

    fn opportunities(count: usize) -> Vec<Opportunity> {
        (0..count)
            .map(|i| {
                let quote = |venue: Venue| {
                    let market = MarketRef::new(venue, format!("{venue}-{i}"), "q");
                    Arc::new(Quote::new(market, dec!(0.4), dec!(0.5), dec!(0.5), dec!(0.6)))
                };
                Opportunity::new(
                    "q",
                    quote(Venue::Kalshi),
                    quote(Venue::Polymarket),
                    &ReturnSettings::default(),
                    datetime!(2030-01-01 00:00 UTC),
                )
                .unwrap()
            })
            .collect()
    }

    fn state() -> AppState {
        AppState::new(
            Arc::new(RwLock::new(OpportunityStore::default())),
            Arc::new(VenueRegistry::new()),
            ScanSettings {
                interval: std::time::Duration::from_secs(1),
                top_n: 5,
                bet_size: dec!(10),
                returns: ReturnSettings::default(),
            },
        )
    }

    #[test]
    fn app_state_ready_toggle() {
        let state = state();
        assert!(!state.is_ready());

        state.set_ready(true);
        assert!(state.is_ready());

        state.set_ready(false);
        assert!(!state.is_ready());
    }

    #[test]
    fn paginate_reports_next_offset() {
        let page = paginate(opportunities(5), 0, Some(2));
        assert_eq!(page.results, 2);
        assert_eq!(page.next_page_index, Some(2));

        let last = paginate(opportunities(5), 4, Some(2));
        assert_eq!(last.results, 1);
        assert_eq!(last.next_page_index, None);
    }

    #[test]
    fn paginate_without_page_size_returns_everything() {
        let page = paginate(opportunities(3), 0, None);
        assert_eq!(page.results, 3);
        assert_eq!(page.next_page_index, None);
    }

    #[test]
    fn paginate_with_zero_page_size_has_no_next_page() {
        let page = paginate(opportunities(3), 1, Some(0));
        assert_eq!(page.results, 0);
        assert_eq!(page.next_page_index, None);
    }

    #[tokio::test]
    async fn list_rejects_zero_page_size() {
        let params = ListParams {
            results_per_page: Some(0),
            ..ListParams::default()
        };

        let result = list_opportunities(State(state()), Query(params)).await;

        assert!(matches!(result, Err(StatusCode::BAD_REQUEST)));
    }

    #[tokio::test]
    async fn delete_during_refresh_stays_deleted() {
        let slow = MockConfig {
            latency_ms: 200,
            ..MockConfig::default()
        };
        let kalshi = MockVenueClient::with_config(Venue::Kalshi, slow.clone());
        let polymarket = MockVenueClient::with_config(Venue::Polymarket, slow);
        let all = opportunities(2);
        for opportunity in &all {
            kalshi.add_market(MockMarket::priced(opportunity.leg_a().market.clone(), dec!(0.4), dec!(0.5)));
            polymarket.add_market(MockMarket::priced(opportunity.leg_b().market.clone(), dec!(0.4), dec!(0.5)));
        }
        let deleted = all[0].id;
        let state = AppState {
            store: Arc::new(RwLock::new(OpportunityStore::new(all))),
            registry: Arc::new(
                VenueRegistry::new()
                    .with_client(VenueClient::Mock(kalshi))
                    .with_client(VenueClient::Mock(polymarket)),
            ),
            ..state()
        };

        let refreshing = tokio::spawn(refresh(State(state.clone())));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let status = delete_opportunity(State(state.clone()), Path(deleted)).await;
        let (_, Json(body)) = refreshing.await.unwrap().unwrap();

        assert_eq!(status, Ok(StatusCode::NO_CONTENT));
        assert_eq!(body.total_opportunities, 1);
        assert!(state.store.read().await.get(deleted).is_none());
    }

    #[test]
    fn paginate_past_the_end_is_empty() {
        let page = paginate(opportunities(2), 10, Some(5));
        assert_eq!(page.results, 0);
        assert_eq!(page.next_page_index, None);
    }
}
