//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::arbitrage::{HorizonPolicy, ReturnSettings};
use crate::equivalence::SimilarityBackend;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Venue Endpoints ===
    /// Polymarket CLOB API base URL.
    #[serde(default = "default_clob_url")]
    pub polymarket_clob_url: String,

    /// Kalshi trade API base URL.
    #[serde(default = "default_kalshi_url")]
    pub kalshi_api_url: String,

    /// Per-request timeout for venue calls.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    // === Question Resolution ===
    /// Similarity backend: embedding or lexical.
    #[serde(default)]
    pub similarity_backend: SimilarityBackend,

    /// A match must score strictly above this.
    #[serde(default = "default_similarity_cutoff")]
    pub similarity_cutoff: f64,

    /// Neighbours requested per similarity query.
    #[serde(default = "default_top_k")]
    pub similarity_top_k: usize,

    /// Embedding API base URL.
    #[serde(default = "default_openai_url")]
    pub embedding_api_url: String,

    /// Embedding model name.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding API key.
    #[serde(default)]
    pub embedding_api_key: Option<String>,

    // === Equivalence Filter ===
    /// Chat completion API base URL.
    #[serde(default = "default_openai_url")]
    pub llm_api_url: String,

    /// Chat model name.
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Chat API key.
    #[serde(default)]
    pub llm_api_key: Option<String>,

    /// Opportunities per equivalence request.
    #[serde(default = "default_llm_batch_size")]
    pub llm_batch_size: usize,

    /// Price per million prompt tokens.
    #[serde(default = "default_llm_input_cost")]
    pub llm_input_cost_per_1m: f64,

    /// Price per million completion tokens.
    #[serde(default = "default_llm_output_cost")]
    pub llm_output_cost_per_1m: f64,

    // === Returns ===
    /// Yes contracts assumed for cached returns.
    #[serde(default = "default_contracts")]
    pub yes_contracts: Decimal,

    /// No contracts assumed for cached returns.
    #[serde(default = "default_contracts")]
    pub no_contracts: Decimal,

    /// Horizon used for cached annualized returns.
    #[serde(default)]
    pub horizon_policy: HorizonPolicy,

    // === Scan Loop ===
    /// Seconds between scan cycles.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_seconds: u64,

    /// Opportunities priced against order books per cycle.
    #[serde(default = "default_scan_top_n")]
    pub scan_top_n: usize,

    /// Contracts per leg for depth-aware pricing.
    #[serde(default = "default_bet_size")]
    pub scan_bet_size: Decimal,

    /// Strategy threshold on annualized depth-aware return.
    #[serde(default = "default_min_annualized_return")]
    pub min_annualized_return: f64,

    /// Horizon used by the strategy threshold.
    #[serde(default = "default_strategy_horizon")]
    pub strategy_horizon_policy: HorizonPolicy,

    // === Persistence ===
    /// Directory for market, class and opportunity files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    // === Server Configuration ===
    /// HTTP server port for the API.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,

    /// Enable the Prometheus exporter.
    #[serde(default)]
    pub metrics_enabled: bool,

    /// Prometheus exporter port.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_kalshi_url() -> String {
    "https://api.elections.kalshi.com/trade-api/v2".to_string()
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_similarity_cutoff() -> f64 {
    0.85
}

fn default_top_k() -> usize {
    5
}

fn default_openai_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_batch_size() -> usize {
    50
}

fn default_llm_input_cost() -> f64 {
    0.15
}

fn default_llm_output_cost() -> f64 {
    0.60
}

fn default_contracts() -> Decimal {
    Decimal::ONE
}

fn default_scan_interval() -> u64 {
    300
}

fn default_scan_top_n() -> usize {
    200
}

fn default_bet_size() -> Decimal {
    Decimal::new(20, 0) // 20 contracts
}

fn default_min_annualized_return() -> f64 {
    0.07
}

fn default_strategy_horizon() -> HorizonPolicy {
    HorizonPolicy::Latest
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            polymarket_clob_url: default_clob_url(),
            kalshi_api_url: default_kalshi_url(),
            http_timeout_ms: default_http_timeout_ms(),
            similarity_backend: SimilarityBackend::default(),
            similarity_cutoff: default_similarity_cutoff(),
            similarity_top_k: default_top_k(),
            embedding_api_url: default_openai_url(),
            embedding_model: default_embedding_model(),
            embedding_api_key: None,
            llm_api_url: default_openai_url(),
            llm_model: default_llm_model(),
            llm_api_key: None,
            llm_batch_size: default_llm_batch_size(),
            llm_input_cost_per_1m: default_llm_input_cost(),
            llm_output_cost_per_1m: default_llm_output_cost(),
            yes_contracts: default_contracts(),
            no_contracts: default_contracts(),
            horizon_policy: HorizonPolicy::default(),
            scan_interval_seconds: default_scan_interval(),
            scan_top_n: default_scan_top_n(),
            scan_bet_size: default_bet_size(),
            min_annualized_return: default_min_annualized_return(),
            strategy_horizon_policy: default_strategy_horizon(),
            data_dir: default_data_dir(),
            port: default_port(),
            rust_log: default_log_level(),
            verbose: false,
            metrics_enabled: false,
            metrics_port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.similarity_cutoff > 0.0 && self.similarity_cutoff <= 1.0) {
            return Err("SIMILARITY_CUTOFF must be in (0, 1]".to_string());
        }

        if self.similarity_top_k == 0 {
            return Err("SIMILARITY_TOP_K must be at least 1".to_string());
        }

        if self.llm_batch_size == 0 {
            return Err("LLM_BATCH_SIZE must be at least 1".to_string());
        }

        if self.yes_contracts <= Decimal::ZERO || self.no_contracts <= Decimal::ZERO {
            return Err("YES_CONTRACTS and NO_CONTRACTS must be positive".to_string());
        }

        if self.scan_interval_seconds == 0 {
            return Err("SCAN_INTERVAL_SECONDS must be at least 1".to_string());
        }

        if self.scan_top_n == 0 {
            return Err("SCAN_TOP_N must be at least 1".to_string());
        }

        if self.scan_bet_size <= Decimal::ZERO {
            return Err("SCAN_BET_SIZE must be positive".to_string());
        }

        Ok(())
    }

    /// Settings for cached opportunity returns.
    pub fn return_settings(&self) -> ReturnSettings {
        ReturnSettings {
            yes_contracts: self.yes_contracts,
            no_contracts: self.no_contracts,
            horizon: self.horizon_policy,
        }
    }

    /// Interval between scan cycles.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_seconds)
    }
}
