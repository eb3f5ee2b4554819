//! Lexical similarity and recommendation ranking.
//!
//! The baseline is Jaccard overlap of lowercase word sets, deliberately
//! simple, deterministic, and explainable. It sits behind the
//! [`SimilarityScorer`] trait so a learned-embedding implementation can swap
//! in without touching call sites.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::item::ContentItem;

/// Capability seam for text similarity in [0, 1].
/// Implementations must be symmetric with `similarity(a, a) = 1`.
pub trait SimilarityScorer {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

/// Jaccard over lowercase, punctuation-trimmed word sets.
#[derive(Clone, Copy, Debug, Default)]
pub struct LexicalJaccard;

impl SimilarityScorer for LexicalJaccard {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        jaccard(&word_set(a), &word_set(b))
    }
}

/// Similarity between two texts using the lexical baseline.
pub fn similarity(a: &str, b: &str) -> f64 {
    LexicalJaccard.similarity(a, b)
}

/// Jaccard overlap of two sets. Two empty sets are identical, so 1.
pub fn jaccard<T: std::hash::Hash + Eq>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    intersection as f64 / union as f64
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// One ranked similarity match.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimilarityHit {
    pub id: String,
    pub saved_by: String,
    pub score: f64,
    pub timestamp: u64,
}

/// Rank candidates against a reference item: similarity desc, recency desc,
/// id asc, truncated to `limit`. The reference itself is excluded.
pub fn find_similar(
    reference: &ContentItem,
    candidates: &[ContentItem],
    limit: usize,
) -> Vec<SimilarityHit> {
    let scorer = LexicalJaccard;
    let mut hits: Vec<SimilarityHit> = candidates
        .iter()
        .filter(|c| c.id != reference.id)
        .map(|c| SimilarityHit {
            id: c.id.clone(),
            saved_by: c.saved_by.clone(),
            score: scorer.similarity(&reference.text, &c.text),
            timestamp: c.timestamp,
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.timestamp.cmp(&a.timestamp))
            .then(a.id.cmp(&b.id))
    });
    hits.truncate(limit);
    hits
}
