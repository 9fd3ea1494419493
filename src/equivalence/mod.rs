//! Question equivalence across venues.
//!
//! This module handles:
//! - Question normalization and similarity clustering
//! - Narrowing each class to one market per venue
//! - Similarity oracles (embedding and lexical)
//! - Optional pairwise equivalence filtering by a chat model

pub mod llm;
pub mod oracle;
pub mod resolver;

pub use llm::{
    filter_equivalent, parse_equivalent_ids, LlmEquivalenceOracle, OracleVerdict, PairCandidate,
    PairwiseEquivalenceOracle,
};
pub use oracle::{
    cosine_similarity, EmbeddingOracle, LexicalOracle, SimilarityBackend, SimilarityMatch,
    SimilarityOracle,
};
pub use resolver::{
    normalize_question, EquivalenceClass, EquivalenceClasses, QuestionEquivalenceResolver,
    ResolverStage,
};
