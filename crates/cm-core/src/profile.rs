//! Per-user profile derivation.
//!
//! A profile is a fully disposable projection of the user's saved items
//! against the wider corpus, safe to rebuild on every call and never
//! hand-edited. Caching a profile is a performance optimization only.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::constants::{
    HIGH_QUALITY_CUTOFF, RECOMMENDED_HASHTAG_LIMIT, SIMILAR_USER_THRESHOLD, TOP_INTERESTS,
};
use crate::item::ContentItem;
use crate::similarity::jaccard;

/// Derived summary of one user's interests and engagement.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserProfile {
    pub user: String,
    /// Topics ranked by frequency across the user's saves, recency tiebreak.
    pub interests: Vec<String>,
    /// User's average engagement normalized against the corpus, in [0, 1].
    pub engagement_level: f64,
    /// Novel hashtags: frequent among high-quality corpus items, absent from
    /// the user's own history. Never contains a tag the
    /// user already used.
    pub recommended_hashtags: Vec<String>,
    /// Users whose top interest sets overlap this user's above the threshold.
    pub similar_users: Vec<String>,
}

/// Build a profile for `user` from their saved items and the full corpus.
pub fn build_profile(user: &str, items: &[ContentItem], corpus: &[ContentItem]) -> UserProfile {
    let interests = ranked_interests(items);
    let engagement_level = engagement_level(items, corpus);
    let own_hashtags = user_hashtags(items);
    let recommended_hashtags = recommend_hashtags(&own_hashtags, corpus, user);
    let similar_users = similar_users(user, &interests, corpus);

    UserProfile {
        user: user.to_string(),
        interests,
        engagement_level,
        recommended_hashtags,
        similar_users,
    }
}

/// Topics ranked by frequency desc, latest-occurrence desc, name asc.
fn ranked_interests(items: &[ContentItem]) -> Vec<String> {
    let mut counts: HashMap<String, (u32, u64)> = HashMap::new();
    for item in items {
        for topic in item.topics() {
            let entry = counts.entry(topic).or_insert((0, 0));
            entry.0 += 1;
            entry.1 = entry.1.max(item.timestamp);
        }
    }

    let mut ranked: Vec<(String, u32, u64)> = counts
        .into_iter()
        .map(|(topic, (count, latest))| (topic, count, latest))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));
    ranked.into_iter().map(|(topic, _, _)| topic).collect()
}

/// User average weighted engagement over corpus average, clipped to [0, 1].
fn engagement_level(items: &[ContentItem], corpus: &[ContentItem]) -> f64 {
    if items.is_empty() || corpus.is_empty() {
        return 0.0;
    }

    let user_avg: f64 =
        items.iter().map(|i| i.engagement.weighted()).sum::<f64>() / items.len() as f64;
    let corpus_avg: f64 =
        corpus.iter().map(|i| i.engagement.weighted()).sum::<f64>() / corpus.len() as f64;

    if corpus_avg <= 0.0 {
        return if user_avg > 0.0 { 1.0 } else { 0.0 };
    }
    (user_avg / corpus_avg).clamp(0.0, 1.0)
}

fn user_hashtags(items: &[ContentItem]) -> HashSet<String> {
    items
        .iter()
        .flat_map(|i| i.features_or_extract().hashtags)
        .collect()
}

/// Hashtags frequent among high-quality items saved by others, filtered
/// against the user's own history (the novelty invariant).
fn recommend_hashtags(
    own: &HashSet<String>,
    corpus: &[ContentItem],
    user: &str,
) -> Vec<String> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for item in corpus {
        if item.saved_by == user {
            continue;
        }
        let high_quality = item
            .scores
            .as_ref()
            .is_some_and(|s| s.quality_score >= HIGH_QUALITY_CUTOFF);
        if !high_quality {
            continue;
        }
        for tag in item.features_or_extract().hashtags {
            if !own.contains(&tag) {
                *counts.entry(tag).or_insert(0) += 1;
            }
        }
    }

    let mut ranked: Vec<(String, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(RECOMMENDED_HASHTAG_LIMIT)
        .map(|(tag, _)| tag)
        .collect()
}

/// Users whose top-interest sets overlap this user's, excluding self.
/// Ordered by overlap desc, name asc.
fn similar_users(user: &str, interests: &[String], corpus: &[ContentItem]) -> Vec<String> {
    let own: HashSet<String> = interests.iter().take(TOP_INTERESTS).cloned().collect();
    if own.is_empty() {
        return Vec::new();
    }

    let mut by_user: HashMap<&str, Vec<&ContentItem>> = HashMap::new();
    for item in corpus {
        if item.saved_by != user {
            by_user.entry(item.saved_by.as_str()).or_default().push(item);
        }
    }

    let mut matches: Vec<(String, f64)> = by_user
        .into_iter()
        .filter_map(|(other, their_items)| {
            let owned: Vec<ContentItem> = their_items.into_iter().cloned().collect();
            let theirs: HashSet<String> = ranked_interests(&owned)
                .into_iter()
                .take(TOP_INTERESTS)
                .collect();
            let overlap = jaccard(&own, &theirs);
            (overlap >= SIMILAR_USER_THRESHOLD).then(|| (other.to_string(), overlap))
        })
        .collect();

    matches.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    matches.into_iter().map(|(name, _)| name).collect()
}
