/// Version tag stamped on every computed `Scores`. Bump when the scoring
/// model changes so stale analyses can be detected and recomputed.
pub const ANALYSIS_VERSION: &str = "v2";

/// Maximum number of derived topics per cast.
pub const TOPIC_LIMIT: usize = 5;

/// Minimum keyword length for a topic candidate.
pub const TOPIC_MIN_LEN: usize = 4;

/// Engagement weighting: replies signal more than likes.
pub const REPLY_WEIGHT: f64 = 2.0;

/// Engagement weighting for recasts.
pub const RECAST_WEIGHT: f64 = 1.5;

/// Log-scale multiplier for the engagement component of quality.
pub const ENGAGEMENT_SCALE: f64 = 12.0;

/// Cap on the engagement component of quality.
pub const ENGAGEMENT_CAP: f64 = 35.0;

/// Quality floor for zero-engagement, zero-topic content ("unique content"
/// policy: novel posts never score zero).
pub const UNIQUE_CONTENT_FLOOR: f64 = 15.0;

/// save_worthiness = QUALITY_WEIGHT * quality + TRENDING_WEIGHT * trending.
pub const QUALITY_WEIGHT: f64 = 0.6;
pub const TRENDING_WEIGHT: f64 = 0.4;

/// Per-window recency decay applied to trending overlap. A topic trending
/// in the hour window counts more than one only trending this week.
pub const RECENCY_DECAY: f64 = 0.7;

/// Topics with fewer saves than this in a window are reported low-confidence
/// rather than filtered out.
pub const MIN_OCCURRENCES_CONFIDENT: u32 = 3;

/// How many trending topics feed the trend-overlap score.
pub const TOP_TRENDING: usize = 10;

/// Number of top interests compared when matching similar users.
pub const TOP_INTERESTS: usize = 5;

/// Minimum Jaccard overlap of top interest sets for two users to count as
/// similar.
pub const SIMILAR_USER_THRESHOLD: f64 = 0.3;

/// Quality score above which an item contributes to the community-pattern
/// bonus and to hashtag recommendations.
pub const HIGH_QUALITY_CUTOFF: f64 = 70.0;

/// Maximum recommended hashtags per profile.
pub const RECOMMENDED_HASHTAG_LIMIT: usize = 5;
