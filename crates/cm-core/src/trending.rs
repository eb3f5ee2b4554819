//! Windowed trending aggregation.
//!
//! Maintains per-topic-per-window save counts, running-mean engagement, and
//! growth deltas. Window rollover happens lazily on record/read, so no
//! background task is needed; the aggregator is a plain value that callers
//! own and are free to rebuild from saved items at any time.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{MIN_OCCURRENCES_CONFIDENT, RECENCY_DECAY, TOP_TRENDING};
use crate::scores::TrendingTopic;
use crate::time::bucket_index;

/// Fixed time windows trends are tracked over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    Hour,
    Day,
    Week,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::Hour, Window::Day, Window::Week];

    pub fn secs(self) -> u64 {
        match self {
            Window::Hour => 3_600,
            Window::Day => 86_400,
            Window::Week => 604_800,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Window::Hour => "hour",
            Window::Day => "day",
            Window::Week => "week",
        }
    }

    /// Recency weight for cross-window scoring: shorter windows are fresher.
    pub fn recency_weight(self) -> f64 {
        match self {
            Window::Hour => 1.0,
            Window::Day => RECENCY_DECAY,
            Window::Week => RECENCY_DECAY * RECENCY_DECAY,
        }
    }
}

impl FromStr for Window {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hour" | "hourly" => Ok(Window::Hour),
            "day" | "daily" => Ok(Window::Day),
            "week" | "weekly" => Ok(Window::Week),
            other => Err(format!("unknown window '{other}' (expected hour/day/week)")),
        }
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated popularity of one topic within one window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopicTrend {
    pub topic: String,
    pub window: Window,
    pub save_count: u32,
    /// Running mean of weighted engagement across occurrences.
    pub engagement_avg: f64,
    /// Current-window count minus previous-window count.
    pub recent_growth: i64,
    /// Set when save_count is below the confidence threshold. Sparse topics
    /// are reported flagged, never filtered.
    pub low_confidence: bool,
}

/// Trending query result. `insufficient_data` distinguishes "nothing
/// recorded" from an error; an empty window is a valid answer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrendingReport {
    pub window: Window,
    pub trends: Vec<TopicTrend>,
    pub insufficient_data: bool,
}

#[derive(Clone, Debug)]
struct TopicState {
    bucket: u64,
    save_count: u32,
    engagement_avg: f64,
    prev_count: u32,
}

/// Rolling per-topic counters across all windows.
#[derive(Debug, Default)]
pub struct TrendingAggregator {
    states: HashMap<(String, Window), TopicState>,
}

impl TrendingAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one topic occurrence at `timestamp` with its weighted
    /// engagement. Updates every window.
    pub fn record_occurrence(&mut self, topic: &str, engagement: f64, timestamp: u64) {
        for window in Window::ALL {
            let bucket = bucket_index(timestamp, window.secs());
            let key = (topic.to_string(), window);

            let state = self.states.entry(key).or_insert(TopicState {
                bucket,
                save_count: 0,
                engagement_avg: 0.0,
                prev_count: 0,
            });

            roll_to(state, bucket);

            state.save_count += 1;
            // Running mean: avg += (x - avg) / n
            let n = f64::from(state.save_count);
            state.engagement_avg += (engagement - state.engagement_avg) / n;
        }
    }

    /// Current trends for a window, deterministically ordered:
    /// save_count desc, engagement_avg desc, topic asc.
    pub fn get_trending(&mut self, window: Window, now: u64) -> TrendingReport {
        let current = bucket_index(now, window.secs());

        let mut trends: Vec<TopicTrend> = self
            .states
            .iter_mut()
            .filter(|((_, w), _)| *w == window)
            .map(|((topic, _), state)| {
                roll_to(state, current);
                TopicTrend {
                    topic: topic.clone(),
                    window,
                    save_count: state.save_count,
                    engagement_avg: state.engagement_avg,
                    recent_growth: i64::from(state.save_count) - i64::from(state.prev_count),
                    low_confidence: state.save_count < MIN_OCCURRENCES_CONFIDENT,
                }
            })
            .filter(|t| t.save_count > 0 || t.recent_growth != 0)
            .collect();

        trends.sort_by(|a, b| {
            b.save_count
                .cmp(&a.save_count)
                .then(
                    b.engagement_avg
                        .partial_cmp(&a.engagement_avg)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.topic.cmp(&b.topic))
        });

        let insufficient_data = trends.is_empty();
        TrendingReport {
            window,
            trends,
            insufficient_data,
        }
    }

    /// Top trending topics across all windows with recency weights, for the
    /// scorer's trend-overlap component. A topic hot in multiple windows
    /// takes its freshest weight.
    pub fn scoring_context(&mut self, now: u64) -> Vec<TrendingTopic> {
        let mut best: HashMap<String, f64> = HashMap::new();

        for window in Window::ALL {
            let report = self.get_trending(window, now);
            for trend in report.trends.iter().take(TOP_TRENDING) {
                let weight = window.recency_weight();
                best.entry(trend.topic.clone())
                    .and_modify(|w| {
                        if weight > *w {
                            *w = weight;
                        }
                    })
                    .or_insert(weight);
            }
        }

        let mut topics: Vec<TrendingTopic> = best
            .into_iter()
            .map(|(topic, recency_weight)| TrendingTopic {
                topic,
                recency_weight,
            })
            .collect();
        topics.sort_by(|a, b| {
            b.recency_weight
                .partial_cmp(&a.recency_weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.topic.cmp(&b.topic))
        });
        topics.truncate(TOP_TRENDING);
        topics
    }

    /// Number of tracked (topic, window) states.
    pub fn tracked(&self) -> usize {
        self.states.len()
    }
}

/// Advance a state to `bucket`, snapshotting the outgoing window.
/// An adjacent rollover keeps the old count as "previous"; skipping a whole
/// window zeroes it.
fn roll_to(state: &mut TopicState, bucket: u64) {
    if state.bucket == bucket {
        return;
    }
    state.prev_count = if bucket == state.bucket + 1 {
        state.save_count
    } else {
        0
    };
    state.bucket = bucket;
    state.save_count = 0;
    state.engagement_avg = 0.0;
}
