//! Clusters equivalent market questions across venues.
//!
//! Resolution runs in two passes over an [`EquivalenceClasses`] value:
//! clustering assigns every market to a class keyed by a normalized
//! question, and narrowing keeps at most one market per venue in every
//! class that spans several venues.
//!
//! Venues are processed in the order supplied. The first venue's phrasing
//! becomes the class key, and a market is only compared against keys that
//! existed when its venue's turn started.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{debug, info, instrument};

use super::oracle::SimilarityOracle;
use crate::error::OracleError;
use crate::market::{MarketRef, Venue};

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

/// Lowercase, drop punctuation and collapse whitespace.
pub fn normalize_question(question: &str) -> String {
    let lowered = question.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolution progress of a class set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResolverStage {
    /// No markets assigned yet.
    #[default]
    Unclustered,
    /// Markets assigned to classes, possibly several per venue.
    Clustered,
    /// At most one market per venue in every multi-venue class.
    Narrowed,
}

/// Markets judged to ask the same question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceClass {
    /// Normalized canonical question.
    pub question: String,
    /// Member markets in insertion order.
    pub markets: Vec<MarketRef>,
}

impl EquivalenceClass {
    fn new(question: String, market: MarketRef) -> Self {
        Self {
            question,
            markets: vec![market],
        }
    }

    /// Distinct venues in first-seen order.
    pub fn venues(&self) -> Vec<Venue> {
        let mut venues = Vec::new();
        for market in &self.markets {
            if !venues.contains(&market.venue) {
                venues.push(market.venue);
            }
        }
        venues
    }

    /// Check whether the class spans more than one venue.
    pub fn is_cross_venue(&self) -> bool {
        self.venues().len() > 1
    }
}

/// Ordered set of equivalence classes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceClasses {
    /// Resolution progress.
    pub stage: ResolverStage,
    /// Classes in creation order.
    pub classes: Vec<EquivalenceClass>,
}

impl EquivalenceClasses {
    /// Number of classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Check for an empty set.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Classes that can produce opportunities.
    pub fn cross_venue(&self) -> impl Iterator<Item = &EquivalenceClass> {
        self.classes.iter().filter(|c| c.is_cross_venue())
    }

    /// Find a class by its canonical question.
    pub fn get(&self, question: &str) -> Option<&EquivalenceClass> {
        self.classes.iter().find(|c| c.question == question)
    }
}

/// Clusters markets with a similarity oracle, then narrows each class.
#[derive(Clone)]
pub struct QuestionEquivalenceResolver {
    oracle: Arc<dyn SimilarityOracle>,
    cutoff: f64,
    top_k: usize,
}

impl std::fmt::Debug for QuestionEquivalenceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestionEquivalenceResolver")
            .field("cutoff", &self.cutoff)
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl QuestionEquivalenceResolver {
    /// Create a resolver; a match must score strictly above `cutoff`.
    pub fn new(oracle: Arc<dyn SimilarityOracle>, cutoff: f64, top_k: usize) -> Self {
        Self {
            oracle,
            cutoff,
            top_k: top_k.max(1),
        }
    }

    /// Cluster then narrow.
    pub async fn resolve(
        &self,
        markets_by_venue: &[(Venue, Vec<MarketRef>)],
    ) -> Result<EquivalenceClasses, OracleError> {
        let clustered = self.cluster(markets_by_venue).await?;
        self.narrow(clustered).await
    }

    /// Assign every market to a class.
    ///
    /// Any oracle failure aborts the pass with no partial result.
    #[instrument(skip_all, fields(venues = markets_by_venue.len()))]
    pub async fn cluster(
        &self,
        markets_by_venue: &[(Venue, Vec<MarketRef>)],
    ) -> Result<EquivalenceClasses, OracleError> {
        let mut classes: Vec<EquivalenceClass> = Vec::new();
        let mut by_key: HashMap<String, usize> = HashMap::new();

        for (venue, markets) in markets_by_venue {
            let keys: Vec<String> = classes.iter().map(|c| c.question.clone()).collect();
            self.oracle.prepare(&keys).await?;

            let mut matched = 0usize;
            for market in markets {
                let normalized = normalize_question(&market.question);

                let best = if normalized.is_empty() || keys.is_empty() {
                    None
                } else {
                    self.oracle
                        .top_k(&normalized, &keys, self.top_k)
                        .await?
                        .into_iter()
                        .next()
                        .filter(|m| m.score > self.cutoff)
                };

                if let Some(best) = best {
                    let index = *by_key.get(&best.key).ok_or_else(|| {
                        OracleError::Malformed(format!("unknown key {:?} in oracle reply", best.key))
                    })?;
                    classes[index].markets.push(market.clone());
                    matched += 1;
                } else if let Some(&index) = by_key.get(&normalized) {
                    classes[index].markets.push(market.clone());
                } else {
                    by_key.insert(normalized.clone(), classes.len());
                    classes.push(EquivalenceClass::new(normalized, market.clone()));
                }
            }

            info!(
                venue = %venue,
                markets = markets.len(),
                matched,
                classes = classes.len(),
                "Clustered venue markets"
            );
        }

        Ok(EquivalenceClasses {
            stage: ResolverStage::Clustered,
            classes,
        })
    }

    /// Keep the single closest market per venue in cross-venue classes.
    ///
    /// Single-venue classes pass through unchanged.
    #[instrument(skip_all, fields(classes = clustered.len()))]
    pub async fn narrow(&self, clustered: EquivalenceClasses) -> Result<EquivalenceClasses, OracleError> {
        let mut classes = Vec::with_capacity(clustered.classes.len());
        let mut discarded = 0usize;

        for class in clustered.classes {
            let venues = class.venues();
            if venues.len() < 2 {
                classes.push(class);
                continue;
            }

            let mut kept = Vec::with_capacity(venues.len());
            for venue in venues {
                let mut candidates: Vec<MarketRef> =
                    class.markets.iter().filter(|m| m.venue == venue).cloned().collect();

                if candidates.len() == 1 {
                    kept.append(&mut candidates);
                    continue;
                }

                let texts: Vec<String> = candidates.iter().map(|m| normalize_question(&m.question)).collect();
                let best = self
                    .oracle
                    .top_k(&class.question, &texts, 1)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| OracleError::Malformed("empty reply while narrowing".to_string()))?;

                if best.index >= candidates.len() {
                    return Err(OracleError::Malformed(format!(
                        "candidate index {} out of range",
                        best.index
                    )));
                }

                debug!(
                    question = %class.question,
                    venue = %venue,
                    kept = %candidates[best.index].market_id,
                    dropped = candidates.len() - 1,
                    "Narrowed venue candidates"
                );
                discarded += candidates.len() - 1;
                kept.push(candidates.swap_remove(best.index));
            }

            classes.push(EquivalenceClass {
                question: class.question,
                markets: kept,
            });
        }

        info!(classes = classes.len(), discarded, "Narrowed equivalence classes");

        Ok(EquivalenceClasses {
            stage: ResolverStage::Narrowed,
            classes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equivalence::oracle::{LexicalOracle, SimilarityMatch};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct FailingOracle;

    #[async_trait]
    impl SimilarityOracle for FailingOracle {
        async fn top_k(&self, _: &str, _: &[String], _: usize) -> Result<Vec<SimilarityMatch>, OracleError> {
            Err(OracleError::Unavailable("offline".to_string()))
        }
    }

    fn resolver() -> QuestionEquivalenceResolver {
        QuestionEquivalenceResolver::new(Arc::new(LexicalOracle), 0.5, 5)
    }

    fn market(venue: Venue, id: &str, question: &str) -> MarketRef {
        MarketRef::new(venue, id, question)
    }

    fn ids(class: &EquivalenceClass) -> Vec<&str> {
        class.markets.iter().map(|m| m.market_id.as_str()).collect()
    }

    #[test]
    fn normalize_strips_case_punctuation_and_spacing() {
        assert_eq!(
            normalize_question("  Will the Fed CUT rates?!  In   2025. "),
            "will the fed cut rates in 2025"
        );
        assert_eq!(normalize_question("???"), "");
    }

    #[tokio::test]
    async fn cluster_matches_across_venues() {
        let input = vec![
            (
                Venue::Kalshi,
                vec![
                    market(Venue::Kalshi, "K1", "Will the Fed cut rates in March?"),
                    market(Venue::Kalshi, "K2", "Who wins the Super Bowl?"),
                ],
            ),
            (
                Venue::Polymarket,
                vec![market(Venue::Polymarket, "P1", "Will the Fed cut rates in March 2030?")],
            ),
        ];

        let classes = resolver().cluster(&input).await.unwrap();

        assert_eq!(classes.stage, ResolverStage::Clustered);
        assert_eq!(classes.len(), 2);
        let fed = classes.get("will the fed cut rates in march").unwrap();
        assert_eq!(ids(fed), vec!["K1", "P1"]);
        assert_eq!(classes.cross_venue().count(), 1);
    }

    #[tokio::test]
    async fn cluster_does_not_compare_within_the_same_venue() {
        let input = vec![(
            Venue::Kalshi,
            vec![
                market(Venue::Kalshi, "K1", "Will it rain in Paris on Monday?"),
                market(Venue::Kalshi, "K2", "Will it rain in Paris on Tuesday?"),
            ],
        )];

        let classes = resolver().cluster(&input).await.unwrap();

        assert_eq!(classes.len(), 2);
    }

    #[tokio::test]
    async fn identical_text_on_one_venue_shares_a_class() {
        let input = vec![(
            Venue::Kalshi,
            vec![
                market(Venue::Kalshi, "K1", "Will it rain?"),
                market(Venue::Kalshi, "K2", "will it rain"),
            ],
        )];

        let classes = resolver().cluster(&input).await.unwrap();

        assert_eq!(classes.len(), 1);
        assert_eq!(ids(&classes.classes[0]), vec!["K1", "K2"]);
    }

    #[tokio::test]
    async fn empty_question_gets_its_own_class() {
        let input = vec![
            (Venue::Kalshi, vec![market(Venue::Kalshi, "K1", "Will it rain?")]),
            (Venue::Polymarket, vec![market(Venue::Polymarket, "P1", "...")]),
        ];

        let classes = resolver().cluster(&input).await.unwrap();

        assert_eq!(classes.len(), 2);
        assert_eq!(ids(classes.get("").unwrap()), vec!["P1"]);
    }

    #[tokio::test]
    async fn narrow_keeps_one_market_per_venue() {
        let input = vec![
            (
                Venue::Kalshi,
                vec![market(Venue::Kalshi, "K1", "Will Team A win the final?")],
            ),
            (
                Venue::Polymarket,
                vec![
                    market(Venue::Polymarket, "P1", "Will Team A win the final game?"),
                    market(Venue::Polymarket, "P2", "Will Team A win the final?"),
                    market(Venue::Polymarket, "P3", "Will Team A win the final by ten?"),
                ],
            ),
            (Venue::Kalshi, vec![market(Venue::Kalshi, "K9", "Something unrelated entirely")]),
        ];

        let classes = resolver().resolve(&input).await.unwrap();

        assert_eq!(classes.stage, ResolverStage::Narrowed);
        let final_class = classes.get("will team a win the final").unwrap();
        assert_eq!(ids(final_class), vec!["K1", "P2"]);
        for class in &classes.classes {
            if class.is_cross_venue() {
                assert_eq!(class.venues().len(), class.markets.len());
            }
        }
    }

    #[tokio::test]
    async fn narrow_leaves_single_venue_classes_alone() {
        let clustered = EquivalenceClasses {
            stage: ResolverStage::Clustered,
            classes: vec![EquivalenceClass {
                question: "will it rain".to_string(),
                markets: vec![
                    market(Venue::Kalshi, "K1", "Will it rain?"),
                    market(Venue::Kalshi, "K2", "Will it rain"),
                ],
            }],
        };

        let narrowed = resolver().narrow(clustered).await.unwrap();

        assert_eq!(ids(&narrowed.classes[0]), vec!["K1", "K2"]);
    }

    #[tokio::test]
    async fn oracle_failure_aborts_clustering() {
        let resolver = QuestionEquivalenceResolver::new(Arc::new(FailingOracle), 0.85, 5);
        let input = vec![
            (Venue::Kalshi, vec![market(Venue::Kalshi, "K1", "Will it rain?")]),
            (Venue::Polymarket, vec![market(Venue::Polymarket, "P1", "Will it rain?")]),
        ];

        let result = resolver.resolve(&input).await;

        assert!(matches!(result, Err(OracleError::Unavailable(_))));
    }

    #[test]
    fn classes_round_trip_through_json() {
        let classes = EquivalenceClasses {
            stage: ResolverStage::Narrowed,
            classes: vec![EquivalenceClass {
                question: "q".to_string(),
                markets: vec![market(Venue::Kalshi, "K1", "Q?")],
            }],
        };

        let json = serde_json::to_string(&classes).unwrap();
        assert!(json.contains(r#""stage":"narrowed""#));
        assert_eq!(serde_json::from_str::<EquivalenceClasses>(&json).unwrap(), classes);
    }
}
