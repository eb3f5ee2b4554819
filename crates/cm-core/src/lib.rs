//! Cast intelligence engine.
//!
//! Turns saved social posts ("casts") into scored, tagged, trend-aware
//! knowledge: deterministic feature extraction, quality/trend scoring,
//! windowed trending aggregation, per-user profile derivation, and a
//! lexical similarity baseline.
//!
//! Zero I/O: pure compute with no opinions about transport or persistence.

pub mod constants;
pub mod features;
pub mod item;
pub mod opinion;
pub mod profile;
pub mod scores;
pub mod similarity;
pub mod time;
pub mod trending;

pub use constants::{
    ANALYSIS_VERSION, HIGH_QUALITY_CUTOFF, MIN_OCCURRENCES_CONFIDENT, RECENCY_DECAY,
    SIMILAR_USER_THRESHOLD, TOPIC_LIMIT, UNIQUE_CONTENT_FLOOR,
};
pub use features::{Entities, Features, Sentiment, extract};
pub use item::{ContentItem, Engagement};
pub use opinion::{Opinion, ResponseTone};
pub use profile::{UserProfile, build_profile};
pub use scores::{ScoreContext, Scores, TrendingTopic, score};
pub use similarity::{LexicalJaccard, SimilarityHit, SimilarityScorer, find_similar, similarity};
pub use time::{now_iso8601, now_unix_secs, unix_to_iso8601};
pub use trending::{TopicTrend, TrendingAggregator, TrendingReport, Window};
