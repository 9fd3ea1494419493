//! Pairwise question equivalence checked by a chat-completion model.
//!
//! Applied after opportunities are paired. Opportunities are sent in
//! batches and only ids the model explicitly confirms are kept; a batch
//! that fails or returns garbage keeps none of its ids.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::arbitrage::Opportunity;
use crate::config::Config;
use crate::error::OracleError;
use crate::metrics;

const PROMPT_PREFIX: &str = "For the list below, return the ids where market_1_question is \
semantically equivalent to market_2_question, meaning they ask precisely the same thing. \
Respond with only a JSON list of id strings and no other text, for example [\"id1\", \"id2\"]. \
If no ids are valid, respond with [].\n";

/// One pair of questions to judge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCandidate {
    /// Opportunity id.
    pub id: String,
    /// Question of the first leg.
    pub market_1_question: String,
    /// Question of the second leg.
    pub market_2_question: String,
}

impl From<&Opportunity> for PairCandidate {
    fn from(opportunity: &Opportunity) -> Self {
        Self {
            id: opportunity.id.to_string(),
            market_1_question: opportunity.leg_a().question().to_string(),
            market_2_question: opportunity.leg_b().question().to_string(),
        }
    }
}

/// Oracle answer for one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OracleVerdict {
    /// Ids judged equivalent.
    pub equivalent: HashSet<String>,
    /// Cost of the call in currency units.
    pub cost: f64,
}

/// Judges which question pairs are truly equivalent.
#[async_trait]
pub trait PairwiseEquivalenceOracle: Send + Sync {
    /// Judge one batch.
    async fn judge(&self, batch: &[PairCandidate]) -> Result<OracleVerdict, OracleError>;
}

/// Parse a JSON list of ids, tolerating a Markdown code fence.
pub fn parse_equivalent_ids(content: &str) -> Result<HashSet<String>, OracleError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();

    let ids: Vec<String> = serde_json::from_str(body)
        .map_err(|e| OracleError::Malformed(format!("{}: {:?}", e, content)))?;
    Ok(ids.into_iter().collect())
}

/// Keep opportunities the oracle confirms, batch by batch.
///
/// Returns the kept opportunities in input order and the total cost.
#[instrument(skip_all, fields(count = opportunities.len(), batch_size = batch_size))]
pub async fn filter_equivalent(
    opportunities: Vec<Opportunity>,
    oracle: &dyn PairwiseEquivalenceOracle,
    batch_size: usize,
) -> (Vec<Opportunity>, f64) {
    let batch_size = batch_size.max(1);
    let mut confirmed: HashSet<String> = HashSet::new();
    let mut cost = 0.0;

    for (n, chunk) in opportunities.chunks(batch_size).enumerate() {
        let batch: Vec<PairCandidate> = chunk.iter().map(PairCandidate::from).collect();
        let sent: HashSet<&str> = batch.iter().map(|c| c.id.as_str()).collect();

        match oracle.judge(&batch).await {
            Ok(verdict) => {
                cost += verdict.cost;
                confirmed.extend(
                    verdict
                        .equivalent
                        .into_iter()
                        .filter(|id| sent.contains(id.as_str())),
                );
            }
            Err(e) => {
                error!(batch = n, size = batch.len(), error = %e, "Equivalence batch failed; excluding its ids");
            }
        }
    }

    let total = opportunities.len();
    let kept: Vec<Opportunity> = opportunities
        .into_iter()
        .filter(|o| confirmed.contains(&o.id.to_string()))
        .collect();

    info!(total, kept = kept.len(), cost, "Filtered opportunities by equivalence");
    (kept, cost)
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage; 1],
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// OpenAI-compatible chat-completion oracle.
#[derive(Debug, Clone)]
pub struct LlmEquivalenceOracle {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    input_cost_per_1m: f64,
    output_cost_per_1m: f64,
}

impl LlmEquivalenceOracle {
    /// Create an oracle from config.
    pub fn new(config: &Config) -> Result<Self, OracleError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            http,
            api_url: config.llm_api_url.trim_end_matches('/').to_string(),
            api_key: config.llm_api_key.clone(),
            model: config.llm_model.clone(),
            input_cost_per_1m: config.llm_input_cost_per_1m,
            output_cost_per_1m: config.llm_output_cost_per_1m,
        })
    }

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<OracleVerdict, OracleError> {
        let url = format!("{}/chat/completions", self.api_url);
        let mut builder = self.http.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| OracleError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(OracleError::Unavailable(format!(
                "HTTP {} from chat completions",
                response.status()
            )));
        }
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;

        let cost = body.usage.as_ref().map(|u| self.cost(u)).unwrap_or(0.0);
        if let Some(usage) = &body.usage {
            info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                cost,
                "Equivalence batch usage"
            );
        }

        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| OracleError::Malformed("no choices in reply".to_string()))?;

        Ok(OracleVerdict {
            equivalent: parse_equivalent_ids(content)?,
            cost,
        })
    }

    fn cost(&self, usage: &Usage) -> f64 {
        usage.prompt_tokens as f64 * self.input_cost_per_1m / 1e6
            + usage.completion_tokens as f64 * self.output_cost_per_1m / 1e6
    }
}

#[async_trait]
impl PairwiseEquivalenceOracle for LlmEquivalenceOracle {
    #[instrument(skip(self, batch), fields(size = batch.len(), model = %self.model))]
    async fn judge(&self, batch: &[PairCandidate]) -> Result<OracleVerdict, OracleError> {
        metrics::inc_oracle_requests("llm");

        let listing = serde_json::to_string_pretty(batch)
            .map_err(|e| OracleError::Malformed(e.to_string()))?;
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user".to_string(),
                content: format!("{}{}", PROMPT_PREFIX, listing),
            }],
        };

        let result = self.complete(&request).await;
        if result.is_err() {
            metrics::inc_oracle_failures("llm");
        }
        result
    }
}
