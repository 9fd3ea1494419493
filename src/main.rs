//! Cross-venue prediction market arbitrage scanner entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crossmarket_arb::api::{create_router, AppState};
use crossmarket_arb::arbitrage::SortKey;
use crossmarket_arb::config::Config;
use crossmarket_arb::equivalence::{
    filter_equivalent, EmbeddingOracle, LexicalOracle, LlmEquivalenceOracle,
    QuestionEquivalenceResolver, SimilarityBackend, SimilarityOracle,
};
use crossmarket_arb::market::{KalshiClient, PolymarketClient, VenueClient, VenueRegistry};
use crossmarket_arb::metrics;
use crossmarket_arb::scan::{top_n_opportunities, ScanLoop, ScanSettings, ThresholdStrategy};
use crossmarket_arb::store::{
    build_opportunities, refresh_opportunities, JsonRepository, OpportunityStore,
};
use crossmarket_arb::utils::{cancel_on_shutdown, shutdown_signal};

const RULE: &str = "======================================================================";

/// Cross-venue arbitrage scanner for binary prediction markets.
#[derive(Parser, Debug)]
#[command(name = "crossmarket-arb")]
#[command(about = "Find and rank cross-venue arbitrage between Kalshi and Polymarket")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check configuration validity.
    CheckConfig,

    /// Save the active markets of every venue.
    Discover {
        /// Maximum markets per venue.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Group saved markets into cross-venue equivalence classes.
    Resolve,

    /// Build opportunities from saved equivalence classes.
    Build {
        /// Confirm pairs with the chat model before saving.
        #[arg(long)]
        llm_check: bool,
    },

    /// Refresh saved opportunities with fresh quotes.
    Refresh,

    /// List saved opportunities.
    List {
        /// Sort key: parity_return or parity_return_annualized.
        #[arg(long)]
        sort: Option<SortKey>,

        /// Maximum rows to print.
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Rank the best opportunities against live order books.
    Top {
        /// Opportunities to price against books.
        #[arg(short, long)]
        n: Option<usize>,

        /// Contracts per leg.
        #[arg(long)]
        bet_size: Option<Decimal>,
    },

    /// Run the periodic scan loop until interrupted.
    Scan,

    /// Serve the HTTP API alongside the scan loop.
    Serve {
        /// HTTP server port.
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("crossmarket_arb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Initialize metrics
    metrics::init_metrics();

    match args.command {
        Command::CheckConfig => cmd_check_config(),
        Command::Discover { limit } => cmd_discover(limit).await,
        Command::Resolve => cmd_resolve().await,
        Command::Build { llm_check } => cmd_build(llm_check).await,
        Command::Refresh => cmd_refresh().await,
        Command::List { sort, limit } => cmd_list(sort, limit).await,
        Command::Top { n, bet_size } => cmd_top(n, bet_size).await,
        Command::Scan => cmd_scan().await,
        Command::Serve { port } => cmd_serve(port).await,
    }
}

/// Load and validate configuration, installing the exporter when enabled.
fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    if config.metrics_enabled {
        metrics::install_exporter(config.metrics_port).map_err(|e| anyhow::anyhow!(e))?;
    }

    Ok(config)
}

fn build_registry(config: &Config) -> anyhow::Result<VenueRegistry> {
    Ok(VenueRegistry::new()
        .with_client(VenueClient::Polymarket(PolymarketClient::new(config)?))
        .with_client(VenueClient::Kalshi(KalshiClient::new(config)?)))
}

fn build_similarity_oracle(config: &Config) -> anyhow::Result<Arc<dyn SimilarityOracle>> {
    Ok(match config.similarity_backend {
        SimilarityBackend::Embedding => Arc::new(EmbeddingOracle::new(config)?),
        SimilarityBackend::Lexical => Arc::new(LexicalOracle),
    })
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("{RULE}");
    println!("CROSSMARKET ARB - CONFIGURATION CHECK");
    println!("{RULE}");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    if config.similarity_backend == SimilarityBackend::Embedding && config.embedding_api_key.is_none() {
        println!("  WARNING: EMBEDDING_API_KEY is not set; resolve will fail");
    }
    if config.llm_api_key.is_none() {
        println!("  WARNING: LLM_API_KEY is not set; build --llm-check is unavailable");
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Polymarket CLOB: {}", config.polymarket_clob_url);
    println!("  Kalshi API: {}", config.kalshi_api_url);
    println!("  Similarity: {} (cutoff {}, top-k {})", config.similarity_backend, config.similarity_cutoff, config.similarity_top_k);
    println!("  Contracts: {} yes / {} no", config.yes_contracts, config.no_contracts);
    println!("  Horizon: {} (strategy: {})", config.horizon_policy, config.strategy_horizon_policy);
    println!("  Scan: every {}s, top {} at {} contracts", config.scan_interval_seconds, config.scan_top_n, config.scan_bet_size);
    println!("  Threshold: {:.2}% annualized", config.min_annualized_return * 100.0);
    println!("  Data Dir: {}", config.data_dir.display());
    println!("{RULE}");
    println!("CONFIGURATION CHECK PASSED");
    println!("{RULE}");

    Ok(())
}

/// Save the active markets of every venue.
async fn cmd_discover(limit: Option<usize>) -> anyhow::Result<()> {
    let config = load_config()?;
    let registry = build_registry(&config)?;
    let repository = JsonRepository::new(&config.data_dir);

    for venue in registry.venues() {
        let client = registry.client(venue)?;
        match client.fetch_active_markets(limit).await {
            Ok(markets) => {
                repository.save_markets(venue, &markets).await?;
                info!(%venue, markets = markets.len(), "Saved active markets");
                println!("{:<12} {:>6} markets", venue, markets.len());
            }
            Err(e) => {
                warn!(%venue, error = %e, "Market discovery failed");
                println!("{:<12} FAILED: {}", venue, e);
            }
        }
    }

    Ok(())
}

/// Group saved markets into equivalence classes.
async fn cmd_resolve() -> anyhow::Result<()> {
    let config = load_config()?;
    let repository = JsonRepository::new(&config.data_dir);
    let registry = build_registry(&config)?;

    let mut markets_by_venue = Vec::new();
    for venue in registry.venues() {
        let markets = repository.load_markets(venue).await?;
        if markets.is_empty() {
            warn!(%venue, "No saved markets; run discover first");
        }
        markets_by_venue.push((venue, markets));
    }

    let resolver = QuestionEquivalenceResolver::new(
        build_similarity_oracle(&config)?,
        config.similarity_cutoff,
        config.similarity_top_k,
    );
    let classes = resolver.resolve(&markets_by_venue).await?;
    repository.save_classes(&classes).await?;

    println!(
        "Resolved {} classes ({} cross-venue)",
        classes.len(),
        classes.cross_venue().count()
    );
    Ok(())
}

/// Build opportunities from saved classes.
async fn cmd_build(llm_check: bool) -> anyhow::Result<()> {
    let config = load_config()?;
    let repository = JsonRepository::new(&config.data_dir);
    let registry = build_registry(&config)?;

    let classes = repository.load_classes().await?;
    let mut opportunities = build_opportunities(
        &classes,
        &registry,
        &config.return_settings(),
        OffsetDateTime::now_utc(),
    )
    .await;

    if llm_check {
        let oracle = LlmEquivalenceOracle::new(&config)?;
        let before = opportunities.len();
        let (kept, cost) = filter_equivalent(opportunities, &oracle, config.llm_batch_size).await;
        println!("Equivalence check kept {} of {} pairs (cost ${:.4})", kept.len(), before, cost);
        opportunities = kept;
    }

    repository.save_opportunities(&opportunities).await?;
    println!("Built {} opportunities", opportunities.len());
    Ok(())
}

/// Refresh saved opportunities.
async fn cmd_refresh() -> anyhow::Result<()> {
    let config = load_config()?;
    let repository = JsonRepository::new(&config.data_dir);
    let registry = build_registry(&config)?;

    let existing = repository.load_opportunities().await?;
    let (refreshed, report) = refresh_opportunities(
        existing,
        &registry,
        &config.return_settings(),
        OffsetDateTime::now_utc(),
        None,
    )
    .await;
    repository.save_opportunities(&refreshed).await?;

    println!("Refreshed {} opportunities, dropped {}", report.refreshed, report.dropped);
    Ok(())
}

/// Print saved opportunities.
async fn cmd_list(sort: Option<SortKey>, limit: usize) -> anyhow::Result<()> {
    let config = load_config()?;
    let repository = JsonRepository::new(&config.data_dir);
    let store = OpportunityStore::new(repository.load_opportunities().await?);

    println!("{RULE}");
    println!("{:<38} {:>10} {:>12}  QUESTION", "ID", "RETURN", "ANNUALIZED");
    println!("{RULE}");
    for opportunity in store.list(sort).iter().take(limit) {
        let absolute: f64 = opportunity.absolute_return().iter().sum();
        let annualized = opportunity
            .annualized_return()
            .total()
            .map(|a| format!("{:.2}%", a * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "{:<38} {:>9.2}% {:>12}  {}",
            opportunity.id,
            absolute * 100.0,
            annualized,
            opportunity.question
        );
    }
    println!("{RULE}");
    println!("{} opportunities", store.len());
    Ok(())
}

/// Rank the best opportunities against order books.
async fn cmd_top(n: Option<usize>, bet_size: Option<Decimal>) -> anyhow::Result<()> {
    let config = load_config()?;
    let repository = JsonRepository::new(&config.data_dir);
    let registry = build_registry(&config)?;

    let opportunities = repository.load_opportunities().await?;
    let ranked = top_n_opportunities(
        opportunities,
        &registry,
        n.unwrap_or(config.scan_top_n),
        bet_size.unwrap_or(config.scan_bet_size),
        &CancellationToken::new(),
    )
    .await;

    println!("{RULE}");
    for candidate in &ranked {
        let depth = candidate
            .size_aware_return
            .map(|r| format!("{:.2}%", r * 100.0))
            .unwrap_or_else(|| "no depth".to_string());
        let (a, b) = (candidate.opportunity.leg_a(), candidate.opportunity.leg_b());
        println!(
            "{:>10}  {}:{} / {}:{}  {}",
            depth,
            a.venue(),
            a.market_id(),
            b.venue(),
            b.market_id(),
            candidate.opportunity.question
        );
    }
    println!("{RULE}");
    Ok(())
}

async fn load_scan_loop(config: &Config) -> anyhow::Result<(ScanLoop, AppState)> {
    let repository = JsonRepository::new(&config.data_dir);
    let registry = Arc::new(build_registry(config)?);

    let opportunities = repository.load_opportunities().await?;
    info!(opportunities = opportunities.len(), "Loaded opportunities");
    let store = Arc::new(RwLock::new(OpportunityStore::new(opportunities)));
    let settings = ScanSettings::from_config(config);

    let scan = ScanLoop::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Arc::new(ThresholdStrategy::from_config(config)),
        settings.clone(),
    )
    .with_repository(repository.clone());
    let state = AppState::new(store, registry, settings).with_repository(repository);

    Ok((scan, state))
}

/// Run the scan loop until interrupted.
async fn cmd_scan() -> anyhow::Result<()> {
    let config = load_config()?;
    let (scan, _) = load_scan_loop(&config).await?;

    let cancel = cancel_on_shutdown();
    scan.run(cancel).await;
    Ok(())
}

/// Serve the HTTP API alongside the scan loop.
async fn cmd_serve(port: Option<u16>) -> anyhow::Result<()> {
    let config = load_config()?;
    let (scan, state) = load_scan_loop(&config).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(config.port)));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    state.set_ready(true);
    let router = create_router(state);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    let cancel = cancel_on_shutdown();
    scan.run(cancel).await;

    match server_handle.await {
        Ok(Ok(())) => info!("HTTP server stopped"),
        Ok(Err(e)) => error!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task failed: {}", e),
    }
    Ok(())
}
