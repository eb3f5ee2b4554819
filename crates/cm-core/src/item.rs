use serde::{Deserialize, Serialize};

use crate::constants::{RECAST_WEIGHT, REPLY_WEIGHT};
use crate::features::{Features, extract};
use crate::scores::{ScoreContext, Scores, score};

/// Engagement counters as reported by the social network.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub likes: u32,
    pub replies: u32,
    pub recasts: u32,
}

impl Engagement {
    pub fn new(likes: u32, replies: u32, recasts: u32) -> Self {
        Self {
            likes,
            replies,
            recasts,
        }
    }

    /// Weighted engagement: likes + 2×replies + 1.5×recasts.
    pub fn weighted(&self) -> f64 {
        f64::from(self.likes)
            + REPLY_WEIGHT * f64::from(self.replies)
            + RECAST_WEIGHT * f64::from(self.recasts)
    }

    pub fn total(&self) -> u32 {
        self.likes
            .saturating_add(self.replies)
            .saturating_add(self.recasts)
    }
}

/// One saved cast plus its derived analysis.
///
/// `text` is immutable once saved. Features and Scores are recomputed in
/// place, never appended; recomputation is idempotent for identical inputs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentItem {
    /// Cast hash from the social network.
    pub id: String,
    /// Author handle.
    pub author: String,
    /// The user who saved this cast.
    pub saved_by: String,
    pub text: String,
    /// Unix seconds.
    pub timestamp: u64,
    pub engagement: Engagement,
    /// Embed links attached to the cast.
    pub embeds: Vec<String>,
    pub features: Option<Features>,
    pub scores: Option<Scores>,
}

impl ContentItem {
    pub fn new(
        id: &str,
        author: &str,
        saved_by: &str,
        text: &str,
        timestamp: u64,
        engagement: Engagement,
    ) -> Self {
        Self {
            id: id.to_string(),
            author: author.to_string(),
            saved_by: saved_by.to_string(),
            text: text.to_string(),
            timestamp,
            engagement,
            embeds: Vec::new(),
            features: None,
            scores: None,
        }
    }

    /// Recompute features and scores from the raw text. Replaces any prior
    /// analysis; calling twice with the same context yields the same result.
    pub fn analyze(&mut self, context: Option<&ScoreContext>) -> Scores {
        let features = extract(&self.text, &self.embeds);
        let scores = score(&features, &self.engagement, context);
        self.features = Some(features);
        self.scores = Some(scores.clone());
        scores
    }

    /// Features, computing on the fly when no stored analysis exists.
    pub fn features_or_extract(&self) -> Features {
        match &self.features {
            Some(f) => f.clone(),
            None => extract(&self.text, &self.embeds),
        }
    }

    /// Topics from the stored or freshly-extracted features.
    pub fn topics(&self) -> Vec<String> {
        self.features_or_extract().topics
    }
}
