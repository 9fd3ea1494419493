//! Similarity oracles used to cluster market questions.
//!
//! The resolver only sees the [`SimilarityOracle`] trait. Two
//! implementations are provided: an embedding-backed oracle that calls an
//! OpenAI-compatible `/embeddings` endpoint, and a lexical oracle scoring
//! word-set overlap for offline runs and tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::OracleError;
use crate::metrics;

/// Inputs per embedding request.
const EMBEDDING_BATCH: usize = 256;

/// One candidate returned by a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatch {
    /// Position of the candidate in the queried slice.
    pub index: usize,
    /// Candidate text.
    pub key: String,
    /// Similarity in `[-1, 1]`, higher is closer.
    pub score: f64,
}

/// Nearest-neighbour lookup over question strings.
#[async_trait]
pub trait SimilarityOracle: Send + Sync {
    /// Warm up for repeated queries against `candidates`.
    async fn prepare(&self, candidates: &[String]) -> Result<(), OracleError> {
        let _ = candidates;
        Ok(())
    }

    /// The `k` candidates closest to `query`, best first.
    async fn top_k(
        &self,
        query: &str,
        candidates: &[String],
        k: usize,
    ) -> Result<Vec<SimilarityMatch>, OracleError>;
}

/// Similarity backend selected by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SimilarityBackend {
    /// Remote embedding model.
    #[default]
    Embedding,
    /// Word-set overlap.
    Lexical,
}

/// Rank `scores` descending and keep the first `k`.
fn rank(candidates: &[String], scores: Vec<f64>, k: usize) -> Vec<SimilarityMatch> {
    let mut matches: Vec<SimilarityMatch> = scores
        .into_iter()
        .enumerate()
        .map(|(index, score)| SimilarityMatch {
            index,
            key: candidates[index].clone(),
            score,
        })
        .collect();
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches.truncate(k);
    matches
}

/// Cosine similarity of two vectors; zero for mismatched or null vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Jaccard overlap of whitespace-separated words.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalOracle;

impl LexicalOracle {
    fn words(text: &str) -> HashSet<&str> {
        text.split_whitespace().collect()
    }

    /// Word-set Jaccard similarity.
    pub fn similarity(a: &str, b: &str) -> f64 {
        let (a, b) = (Self::words(a), Self::words(b));
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        let shared = a.intersection(&b).count() as f64;
        let total = a.union(&b).count() as f64;
        shared / total
    }
}

#[async_trait]
impl SimilarityOracle for LexicalOracle {
    async fn top_k(
        &self,
        query: &str,
        candidates: &[String],
        k: usize,
    ) -> Result<Vec<SimilarityMatch>, OracleError> {
        let scores = candidates.iter().map(|c| Self::similarity(query, c)).collect();
        Ok(rank(candidates, scores, k))
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Embedding-backed oracle with an in-memory vector cache.
///
/// Each distinct text is embedded once per process.
#[derive(Debug, Clone)]
pub struct EmbeddingOracle {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    cache: Arc<DashMap<String, Arc<Vec<f32>>>>,
}

impl EmbeddingOracle {
    /// Create an oracle from config.
    pub fn new(config: &Config) -> Result<Self, OracleError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms.max(30_000)))
            .build()?;

        Ok(Self {
            http,
            api_url: config.embedding_api_url.trim_end_matches('/').to_string(),
            api_key: config.embedding_api_key.clone(),
            model: config.embedding_model.clone(),
            cache: Arc::new(DashMap::new()),
        })
    }

    /// Number of cached vectors.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    #[instrument(skip(self, inputs), fields(count = inputs.len()))]
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, OracleError> {
        metrics::inc_oracle_requests("embedding");

        let url = format!("{}/embeddings", self.api_url);
        let mut request = self.http.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: inputs,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            metrics::inc_oracle_failures("embedding");
            OracleError::Unavailable(e.to_string())
        })?;

        if !response.status().is_success() {
            metrics::inc_oracle_failures("embedding");
            return Err(OracleError::Unavailable(format!(
                "HTTP {} from embeddings endpoint",
                response.status()
            )));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            metrics::inc_oracle_failures("embedding");
            OracleError::Malformed(e.to_string())
        })?;

        let mut vectors = vec![Vec::new(); inputs.len()];
        for item in body.data {
            let slot = vectors.get_mut(item.index).ok_or_else(|| {
                OracleError::Malformed(format!("embedding index {} out of range", item.index))
            })?;
            *slot = item.embedding;
        }
        if vectors.iter().any(Vec::is_empty) {
            metrics::inc_oracle_failures("embedding");
            return Err(OracleError::Malformed("missing embeddings in response".to_string()));
        }

        Ok(vectors)
    }

    /// Embed every uncached text.
    async fn fill_cache(&self, texts: &[String]) -> Result<(), OracleError> {
        let mut missing: Vec<String> = texts
            .iter()
            .filter(|t| !self.cache.contains_key(t.as_str()))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();

        for chunk in missing.chunks(EMBEDDING_BATCH) {
            let vectors = self.embed(chunk).await?;
            for (text, vector) in chunk.iter().zip(vectors) {
                self.cache.insert(text.clone(), Arc::new(vector));
            }
        }

        if !missing.is_empty() {
            debug!(embedded = missing.len(), cached = self.cache.len(), "Embedded new texts");
        }
        Ok(())
    }

    fn vector(&self, text: &str) -> Result<Arc<Vec<f32>>, OracleError> {
        self.cache
            .get(text)
            .map(|v| Arc::clone(v.value()))
            .ok_or_else(|| OracleError::Malformed(format!("no embedding for {:?}", text)))
    }
}

#[async_trait]
impl SimilarityOracle for EmbeddingOracle {
    async fn prepare(&self, candidates: &[String]) -> Result<(), OracleError> {
        self.fill_cache(candidates).await
    }

    async fn top_k(
        &self,
        query: &str,
        candidates: &[String],
        k: usize,
    ) -> Result<Vec<SimilarityMatch>, OracleError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut texts = candidates.to_vec();
        texts.push(query.to_string());
        self.fill_cache(&texts).await?;

        let query_vector = self.vector(query)?;
        let scores = candidates
            .iter()
            .map(|c| Ok(cosine_similarity(&query_vector, &self.vector(c)?)))
            .collect::<Result<Vec<f64>, OracleError>>()?;

        Ok(rank(candidates, scores, k))
    }
}
