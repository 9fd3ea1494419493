//! Periodic scan loop over the opportunity store.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::strategy::{Selection, Strategy};
use super::top::top_n_opportunities;
use crate::arbitrage::ReturnSettings;
use crate::config::Config;
use crate::market::VenueRegistry;
use crate::metrics;
use crate::store::{refresh_opportunities, JsonRepository, OpportunityStore, RefreshReport};

/// Shared handle to the opportunity store.
pub type SharedStore = Arc<RwLock<OpportunityStore>>;

/// Scan loop parameters.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Pause before each cycle.
    pub interval: Duration,
    /// Opportunities priced against order books per cycle.
    pub top_n: usize,
    /// Contracts per leg for depth-aware pricing.
    pub bet_size: Decimal,
    /// Settings for cached returns on refresh.
    pub returns: ReturnSettings,
}

impl ScanSettings {
    /// Build scan settings from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.scan_interval(),
            top_n: config.scan_top_n,
            bet_size: config.scan_bet_size,
            returns: config.return_settings(),
        }
    }
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// Refresh outcome.
    pub refresh: RefreshReport,
    /// Opportunities priced against order books.
    pub priced: usize,
    /// Candidates picked by the strategy.
    pub selected: Vec<Selection>,
}

/// Sleep, refresh, persist, rank the head by depth and hand it to a strategy.
pub struct ScanLoop {
    store: SharedStore,
    registry: Arc<VenueRegistry>,
    repository: Option<JsonRepository>,
    strategy: Arc<dyn Strategy>,
    settings: ScanSettings,
}

impl ScanLoop {
    /// Create a scan loop.
    pub fn new(
        store: SharedStore,
        registry: Arc<VenueRegistry>,
        strategy: Arc<dyn Strategy>,
        settings: ScanSettings,
    ) -> Self {
        Self {
            store,
            registry,
            repository: None,
            strategy,
            settings,
        }
    }

    /// Persist the store after every refresh.
    pub fn with_repository(mut self, repository: JsonRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Run until `cancel` fires. Cycle failures are logged, never fatal.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            top_n = self.settings.top_n,
            bet_size = %self.settings.bet_size,
            "Scan loop started"
        );

        let mut cycles = 0u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }

            cycles += 1;
            match self.run_cycle(&cancel).await {
                Some(report) => info!(
                    cycle = cycles,
                    refreshed = report.refresh.refreshed,
                    dropped = report.refresh.dropped,
                    priced = report.priced,
                    selected = report.selected.len(),
                    "Scan cycle complete"
                ),
                None => break,
            }
        }

        info!(cycles, "Scan loop stopped");
    }

    /// Run a single cycle now. Returns `None` if cancelled part way.
    ///
    /// A cycle cancelled before the refresh completes leaves the store untouched.
    #[instrument(skip_all)]
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Option<CycleReport> {
        let _timer = metrics::timer_scan_cycle();

        if cancel.is_cancelled() {
            return None;
        }

        let existing = self.store.read().await.all().to_vec();
        let now = OffsetDateTime::now_utc();
        let (refreshed, refresh) =
            refresh_opportunities(existing, self.registry.as_ref(), &self.settings.returns, now, Some(cancel)).await;

        if cancel.is_cancelled() {
            debug!("Cancelled after refresh; store left unchanged");
            return None;
        }

        let current = self.store.write().await.retain_refreshed(refreshed);

        if let Some(repository) = &self.repository {
            if let Err(e) = repository.save_opportunities(&current).await {
                warn!(error = %e, "Failed to persist refreshed opportunities");
            }
        }

        let ranked = top_n_opportunities(
            current,
            self.registry.as_ref(),
            self.settings.top_n,
            self.settings.bet_size,
            cancel,
        )
        .await;

        if cancel.is_cancelled() {
            debug!("Cancelled while ranking; strategy skipped");
            return None;
        }

        let selected = self.strategy.on_candidates(&ranked, OffsetDateTime::now_utc()).await;

        Some(CycleReport {
            refresh,
            priced: ranked.len(),
            selected,
        })
    }
}
