//! Quality and trend scoring.
//!
//! Pure blend of content substance, feature richness, log-scaled engagement,
//! and aggregate context. Never calls external services; a missing context
//! degrades silently to content-only scoring.

use serde::{Deserialize, Serialize};

use crate::constants::{
    ANALYSIS_VERSION, ENGAGEMENT_CAP, ENGAGEMENT_SCALE, QUALITY_WEIGHT, TRENDING_WEIGHT,
    UNIQUE_CONTENT_FLOOR,
};
use crate::features::Features;
use crate::item::Engagement;

/// One currently-trending topic with its recency weight in (0, 1].
/// More recent windows carry weight closer to 1.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrendingTopic {
    pub topic: String,
    pub recency_weight: f64,
}

/// Aggregate context for scoring: what the community has historically
/// saved and what is trending right now. All optional; scoring works
/// content-only without it.
#[derive(Clone, Debug, Default)]
pub struct ScoreContext {
    /// Topics common among historically high-quality saved items.
    pub high_quality_topics: Vec<String>,
    /// Current top trending topics with recency weights.
    pub trending: Vec<TrendingTopic>,
}

/// Derived numeric measures for one cast. All values are recomputed as a
/// unit; the version tag flags staleness after model changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    /// In [0, 100].
    pub quality_score: f64,
    /// In [0, 1].
    pub trending_score: f64,
    /// In [0, 1]: 0.6·quality(normalized) + 0.4·trending.
    pub save_worthiness: f64,
    /// In [0, 1]: how much evidence backed this analysis.
    pub confidence_score: f64,
    pub analysis_version: String,
}

/// Compute scores for one cast.
pub fn score(features: &Features, engagement: &Engagement, context: Option<&ScoreContext>) -> Scores {
    let quality = quality_score(features, engagement, context);
    let trending = trending_score(features, context);
    let save_worthiness =
        (QUALITY_WEIGHT * (quality / 100.0) + TRENDING_WEIGHT * trending).clamp(0.0, 1.0);
    let confidence = confidence_score(features, engagement, context);

    Scores {
        quality_score: quality,
        trending_score: trending,
        save_worthiness,
        confidence_score: confidence,
        analysis_version: ANALYSIS_VERSION.to_string(),
    }
}

/// Word-count banding: substance component of quality.
fn substance(word_count: usize) -> f64 {
    match word_count {
        0 => 0.0,
        1..=5 => 5.0,
        6..=20 => 15.0,
        21..=60 => 25.0,
        _ => 30.0,
    }
}

/// Bonus for structured features present on the cast.
fn richness(features: &Features) -> f64 {
    let mut bonus = 0.0;
    if !features.topics.is_empty() {
        bonus += 10.0;
    }
    if !features.entities.projects.is_empty() || !features.entities.companies.is_empty() {
        bonus += 5.0;
    }
    if !features.urls.is_empty() {
        bonus += 5.0;
    }
    if !features.hashtags.is_empty() {
        bonus += 5.0;
    }
    bonus
}

/// Log-scaled weighted engagement, capped so virality cannot dominate.
fn engagement_component(engagement: &Engagement) -> f64 {
    (ENGAGEMENT_SCALE * (1.0 + engagement.weighted()).ln()).min(ENGAGEMENT_CAP)
}

/// Bonus when the cast's topics overlap significantly with topics from
/// historically high-quality saves.
fn community_bonus(features: &Features, context: Option<&ScoreContext>) -> f64 {
    let Some(ctx) = context else { return 0.0 };
    if features.topics.is_empty() || ctx.high_quality_topics.is_empty() {
        return 0.0;
    }

    let matched = features
        .topics
        .iter()
        .filter(|t| ctx.high_quality_topics.contains(t))
        .count();
    let ratio = matched as f64 / features.topics.len() as f64;

    if ratio >= 0.5 {
        10.0
    } else if ratio >= 0.25 {
        5.0
    } else {
        0.0
    }
}

fn quality_score(
    features: &Features,
    engagement: &Engagement,
    context: Option<&ScoreContext>,
) -> f64 {
    let raw = substance(features.word_count)
        + richness(features)
        + engagement_component(engagement)
        + community_bonus(features, context);

    // Unique-content policy: novel posts with no engagement and no topics
    // still floor above zero instead of scoring as noise.
    let floored = if engagement.total() == 0 && features.topics.is_empty() && features.word_count > 0
    {
        raw.max(UNIQUE_CONTENT_FLOOR)
    } else {
        raw
    };

    floored.clamp(0.0, 100.0)
}

/// Overlap between the cast's topics and the current trending set, each
/// match weighted by the trend's recency.
fn trending_score(features: &Features, context: Option<&ScoreContext>) -> f64 {
    let Some(ctx) = context else { return 0.0 };
    if features.topics.is_empty() || ctx.trending.is_empty() {
        return 0.0;
    }

    let total: f64 = features
        .topics
        .iter()
        .filter_map(|topic| {
            ctx.trending
                .iter()
                .find(|t| &t.topic == topic)
                .map(|t| t.recency_weight)
        })
        .sum();

    (total / features.topics.len() as f64).clamp(0.0, 1.0)
}

/// More evidence, more confidence. Content-only scoring sits at 0.5.
fn confidence_score(
    features: &Features,
    engagement: &Engagement,
    context: Option<&ScoreContext>,
) -> f64 {
    let mut confidence: f64 = 0.5;
    if engagement.total() > 0 {
        confidence += 0.2;
    }
    if context.is_some() {
        confidence += 0.2;
    }
    if !features.topics.is_empty() {
        confidence += 0.1;
    }
    confidence.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::extract;

    fn scored(text: &str, engagement: Engagement, ctx: Option<&ScoreContext>) -> Scores {
        let features = extract(text, &[]);
        score(&features, &engagement, ctx)
    }

    #[test]
    fn test_ranges_always_valid() {
        let cases = [
            ("", Engagement::default()),
            ("gm", Engagement::default()),
            ("massive launch #defi #web3", Engagement::new(u32::MAX, u32::MAX, u32::MAX)),
        ];
        for (text, engagement) in cases {
            let s = scored(text, engagement, None);
            assert!((0.0..=100.0).contains(&s.quality_score), "quality: {}", s.quality_score);
            assert!((0.0..=1.0).contains(&s.trending_score));
            assert!((0.0..=1.0).contains(&s.save_worthiness));
            assert!((0.0..=1.0).contains(&s.confidence_score));
        }
    }

    #[test]
    fn test_unique_content_floor() {
        // Zero engagement, zero topics, but real text still floors above zero
        let s = scored("gm all", Engagement::default(), None);
        assert!(
            s.quality_score >= UNIQUE_CONTENT_FLOOR,
            "floored quality: {}",
            s.quality_score
        );
    }

    #[test]
    fn test_empty_text_scores_zero_quality() {
        let s = scored("", Engagement::default(), None);
        assert_eq!(s.quality_score, 0.0);
    }

    #[test]
    fn test_defi_scenario_beats_baseline() {
        let s = scored(
            "Just shipped a new DeFi protocol! #web3 #defi",
            Engagement::new(10, 2, 1),
            None,
        );
        let baseline = scored("gm all", Engagement::default(), None);
        assert!(
            s.quality_score > baseline.quality_score,
            "{} should exceed baseline {}",
            s.quality_score,
            baseline.quality_score
        );
    }

    #[test]
    fn test_engagement_log_scaled() {
        let low = scored("solid post #web3", Engagement::new(10, 0, 0), None);
        let high = scored("solid post #web3", Engagement::new(1000, 0, 0), None);
        let diff = high.quality_score - low.quality_score;
        assert!(diff > 0.0, "more engagement should score higher");
        assert!(diff < 40.0, "log scaling should compress the gap: {diff}");
    }

    #[test]
    fn test_replies_weigh_more_than_likes() {
        let likes = scored("a post about governance", Engagement::new(4, 0, 0), None);
        let replies = scored("a post about governance", Engagement::new(0, 4, 0), None);
        assert!(replies.quality_score > likes.quality_score);
    }

    #[test]
    fn test_community_bonus_applies() {
        let ctx = ScoreContext {
            high_quality_topics: vec!["defi".to_string(), "web3".to_string()],
            trending: Vec::new(),
        };
        let with = scored("deep dive #defi #web3", Engagement::default(), Some(&ctx));
        let without = scored("deep dive #defi #web3", Engagement::default(), None);
        assert!(with.quality_score > without.quality_score);
    }

    #[test]
    fn test_trending_overlap_recency_weighted() {
        let ctx = ScoreContext {
            high_quality_topics: Vec::new(),
            trending: vec![TrendingTopic {
                topic: "defi".to_string(),
                recency_weight: 1.0,
            }],
        };
        let s = scored("#defi", Engagement::default(), Some(&ctx));
        assert!(s.trending_score > 0.9, "full overlap: {}", s.trending_score);

        let stale = ScoreContext {
            high_quality_topics: Vec::new(),
            trending: vec![TrendingTopic {
                topic: "defi".to_string(),
                recency_weight: 0.49,
            }],
        };
        let s2 = scored("#defi", Engagement::default(), Some(&stale));
        assert!(s2.trending_score < s.trending_score);
    }

    #[test]
    fn test_missing_context_degrades_silently() {
        let s = scored("post #defi", Engagement::new(1, 0, 0), None);
        assert_eq!(s.trending_score, 0.0);
        assert!(s.quality_score > 0.0);
    }

    #[test]
    fn test_save_worthiness_blend() {
        let ctx = ScoreContext {
            high_quality_topics: Vec::new(),
            trending: vec![TrendingTopic {
                topic: "defi".to_string(),
                recency_weight: 1.0,
            }],
        };
        let s = scored("#defi", Engagement::default(), Some(&ctx));
        let expected = 0.6 * (s.quality_score / 100.0) + 0.4 * s.trending_score;
        assert!((s.save_worthiness - expected).abs() < 1e-10);
    }

    #[test]
    fn test_version_tag_stamped() {
        let s = scored("gm", Engagement::default(), None);
        assert_eq!(s.analysis_version, ANALYSIS_VERSION);
    }

    #[test]
    fn test_recompute_idempotent() {
        let features = extract("a thoughtful post about protocols #defi", &[]);
        let engagement = Engagement::new(3, 1, 1);
        let a = score(&features, &engagement, None);
        let b = score(&features, &engagement, None);
        assert_eq!(a, b);
    }
}
