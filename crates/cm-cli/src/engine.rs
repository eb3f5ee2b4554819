//! Engine: the one place where store, aggregator, profiles, and the
//! opinion pipeline meet. CLI commands and HTTP handlers both talk to this
//! type and nothing below it.

use std::time::Duration;

use cm_core::{
    ANALYSIS_VERSION, ContentItem, Engagement, HIGH_QUALITY_CUTOFF, ScoreContext, Scores,
    SimilarityHit, TrendingAggregator, TrendingReport, UserProfile, Window, build_profile,
    find_similar, now_unix_secs,
};
use cm_store::Store;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::cache::TtlCache;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::generative::{GenerativeClient, GenerativeError, HttpGenerative};
use crate::pipeline::{OpinionContext, OpinionPipeline, persistable};
use crate::tiering::{Tiered, respond};

/// How many related casts feed an opinion's context bundle.
const OPINION_CONTEXT_SIZE: usize = 3;
/// How many of a user's saves feed profile derivation.
const PROFILE_SAMPLE: usize = 200;
/// Pause between retag refreshes. Bulk reprocessing is sequential and
/// paced rather than parallel.
const RETAG_DELAY: Duration = Duration::from_millis(25);

#[derive(Clone, Debug, Deserialize)]
pub struct SaveRequest {
    pub id: String,
    pub author: String,
    pub saved_by: String,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub likes: u32,
    #[serde(default)]
    pub replies: u32,
    #[serde(default)]
    pub recasts: u32,
    #[serde(default)]
    pub embeds: Vec<String>,
}

#[derive(Clone, Copy, Debug)]
pub struct RetagReport {
    pub scanned: usize,
    pub refreshed: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct EngineStats {
    pub items: u64,
    pub opinions: u64,
    pub users: u64,
    pub tracked_topics: usize,
    pub generative_configured: bool,
    pub db_schema_version: Option<i64>,
}

pub struct Engine {
    store: Mutex<Store>,
    aggregator: Mutex<TrendingAggregator>,
    profiles: Mutex<TtlCache<String, UserProfile>>,
    pipeline: OpinionPipeline,
}

impl Engine {
    /// Open the engine from config: store on disk, optional HTTP generative
    /// client, trending state replayed from saved items.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| EngineError::Validation(format!("cannot create data dir: {e}")))?;
        let store = Store::open(&config.db_path())?;

        let client: Option<Box<dyn GenerativeClient>> = config.generative_url.as_ref().map(|url| {
            Box::new(HttpGenerative::new(
                url.clone(),
                config.generative_api_key.clone(),
                Duration::from_millis(config.tier1_timeout_ms),
                Duration::from_millis(config.research_timeout_ms),
            )) as Box<dyn GenerativeClient>
        });

        Self::with_store(store, client, Duration::from_secs(config.profile_ttl_secs))
    }

    pub fn with_store(
        store: Store,
        client: Option<Box<dyn GenerativeClient>>,
        profile_ttl: Duration,
    ) -> Result<Self> {
        // The aggregator is a plain value, so one replay at startup makes
        // one-shot CLI invocations see the same trends a long-running
        // server would.
        let mut aggregator = TrendingAggregator::new();
        for item in store.all_items()? {
            record_item(&mut aggregator, &item);
        }

        Ok(Self {
            store: Mutex::new(store),
            aggregator: Mutex::new(aggregator),
            profiles: Mutex::new(TtlCache::new(profile_ttl)),
            pipeline: OpinionPipeline::new(client),
        })
    }

    // --- Operations ---

    /// Save a cast and analyze it immediately. A duplicate save reports
    /// [`EngineError::AlreadySaved`]; everything else about the item is
    /// unchanged in that case.
    pub async fn save(&self, req: SaveRequest) -> Result<Scores> {
        validate_save(&req)?;

        let mut item = ContentItem::new(
            &req.id,
            &req.author,
            &req.saved_by,
            &req.text,
            req.timestamp.unwrap_or_else(now_unix_secs),
            Engagement::new(req.likes, req.replies, req.recasts),
        );
        item.embeds = req.embeds;

        let context = self.score_context().await?;
        let scores = item.analyze(Some(&context));

        self.store.lock().await.insert_item(&item)?;
        record_item(&mut *self.aggregator.lock().await, &item);
        self.profiles.lock().await.invalidate_all();

        Ok(scores)
    }

    /// Recompute the analysis for one saved cast against current aggregate
    /// context, and persist the result. Idempotent for identical inputs.
    pub async fn analyze(&self, id: &str) -> Result<Scores> {
        let mut item = self.store.lock().await.get_item(id)?;
        let context = self.score_context().await?;
        let scores = item.analyze(Some(&context));

        let features = item
            .features
            .clone()
            .ok_or_else(|| EngineError::Validation("analysis produced no features".into()))?;
        self.store
            .lock()
            .await
            .update_analysis(&item.id, &item.saved_by, &features, &scores)?;
        Ok(scores)
    }

    /// Form an opinion about a saved cast. Generative failures degrade
    /// through tiers and never surface as errors; only a missing item or
    /// bad input fails.
    pub async fn opinion(
        &self,
        id: &str,
        requested_by: &str,
        prompt: &str,
    ) -> Result<Tiered<cm_core::Opinion>> {
        if requested_by.trim().is_empty() {
            return Err(EngineError::Validation("requested_by is required".into()));
        }
        let item = self.store.lock().await.get_item(id)?;
        let context = self.opinion_context(&item, requested_by).await?;

        let result = self.pipeline.form(&item, requested_by, prompt, &context).await;

        if persistable(result.tier) {
            // Tier 2/3 responses lack stable provenance, so only model
            // judgments are recorded.
            if let Err(e) = self.store.lock().await.insert_opinion(&result.value) {
                tracing::error!("failed to persist opinion: {e}");
            }
        }
        Ok(result)
    }

    /// Nudge a persisted opinion's confidence based on user feedback.
    pub async fn opinion_feedback(&self, opinion_id: &str, delta: f64) -> Result<f64> {
        if !delta.is_finite() {
            return Err(EngineError::Validation("delta must be finite".into()));
        }
        Ok(self
            .store
            .lock()
            .await
            .adjust_opinion_confidence(opinion_id, delta)?)
    }

    pub async fn trending(&self, window: Window) -> TrendingReport {
        self.aggregator.lock().await.get_trending(window, now_unix_secs())
    }

    /// Natural-language trend summary, degrading from generative to
    /// data-driven to canned.
    pub async fn digest(&self, window: Window) -> Tiered<String> {
        let report = self.trending(window).await;

        let primary = async {
            if report.insufficient_data {
                return Err(GenerativeError::Unavailable("no trend data".into()));
            }
            let topics: Vec<&str> = report
                .trends
                .iter()
                .take(5)
                .map(|t| t.topic.as_str())
                .collect();
            self.pipeline
                .summarize(&format!(
                    "summarize current community interest in: {}",
                    topics.join(", ")
                ))
                .await
        };
        let fallback = || {
            if report.insufficient_data {
                return Err("no trend data".to_string());
            }
            Ok(format_digest(&report))
        };
        let canned = || {
            format!(
                "No trend data for the last {} yet. Save a few casts and ask again.",
                report.window
            )
        };

        respond("digest", primary, fallback, canned).await
    }

    /// Derived profile with recommendations. Cached briefly; rebuilt from
    /// scratch on expiry.
    pub async fn recommend(&self, user: &str) -> Result<UserProfile> {
        if user.trim().is_empty() {
            return Err(EngineError::Validation("user is required".into()));
        }
        if let Some(profile) = self.profiles.lock().await.get(&user.to_string()) {
            return Ok(profile);
        }

        let profile = self.build_profile(user).await?;
        self.profiles
            .lock()
            .await
            .insert(user.to_string(), profile.clone());
        Ok(profile)
    }

    pub async fn find_similar(&self, id: &str, limit: usize) -> Result<Vec<SimilarityHit>> {
        let store = self.store.lock().await;
        let reference = store.get_item(id)?;
        let candidates = store.all_items()?;
        Ok(find_similar(&reference, &candidates, limit))
    }

    /// Re-run analysis for every cast whose stored analysis is missing or
    /// predates the current model version.
    pub async fn retag(&self) -> Result<RetagReport> {
        let items = self.store.lock().await.all_items()?;
        let context = self.score_context().await?;

        let scanned = items.len();
        let mut refreshed = 0;
        for mut item in items {
            let stale = item
                .scores
                .as_ref()
                .is_none_or(|s| s.analysis_version != ANALYSIS_VERSION);
            if !stale {
                continue;
            }
            let scores = item.analyze(Some(&context));
            let features = item
                .features
                .clone()
                .ok_or_else(|| EngineError::Validation("analysis produced no features".into()))?;
            self.store
                .lock()
                .await
                .update_analysis(&item.id, &item.saved_by, &features, &scores)?;
            refreshed += 1;
            tokio::time::sleep(RETAG_DELAY).await;
        }

        if refreshed > 0 {
            self.profiles.lock().await.invalidate_all();
        }
        Ok(RetagReport { scanned, refreshed })
    }

    pub async fn unsave(&self, id: &str, saved_by: &str) -> Result<()> {
        self.store.lock().await.delete_item(id, saved_by)?;
        self.profiles.lock().await.invalidate_all();
        Ok(())
    }

    pub async fn stats(&self) -> Result<EngineStats> {
        let store = self.store.lock().await;
        let stats = store.stats()?;
        let schema_version = cm_store::schema::get_schema_version(store.conn())?;
        drop(store);

        Ok(EngineStats {
            items: stats.items,
            opinions: stats.opinions,
            users: stats.users,
            tracked_topics: self.aggregator.lock().await.tracked(),
            generative_configured: self.pipeline.has_generative(),
            db_schema_version: schema_version,
        })
    }

    // --- Context assembly ---

    /// Aggregate context for scoring: historically high-quality topics plus
    /// current trends.
    async fn score_context(&self) -> Result<ScoreContext> {
        let items = self.store.lock().await.all_items()?;
        let mut high_quality_topics: Vec<String> = Vec::new();
        for item in &items {
            let high = item
                .scores
                .as_ref()
                .is_some_and(|s| s.quality_score >= HIGH_QUALITY_CUTOFF);
            if !high {
                continue;
            }
            for topic in item.topics() {
                if !high_quality_topics.contains(&topic) {
                    high_quality_topics.push(topic);
                }
            }
        }

        let trending = self.aggregator.lock().await.scoring_context(now_unix_secs());
        Ok(ScoreContext {
            high_quality_topics,
            trending,
        })
    }

    async fn opinion_context(&self, item: &ContentItem, requested_by: &str) -> Result<OpinionContext> {
        let candidates = self.store.lock().await.all_items()?;
        let related = find_similar(item, &candidates, OPINION_CONTEXT_SIZE);

        let mut source_ids = Vec::new();
        let mut source_texts = Vec::new();
        for hit in &related {
            if hit.score > 0.0
                && let Some(found) = candidates.iter().find(|c| c.id == hit.id)
            {
                source_ids.push(found.id.clone());
                source_texts.push(found.text.clone());
            }
        }

        let trending = self
            .aggregator
            .lock()
            .await
            .scoring_context(now_unix_secs())
            .into_iter()
            .map(|t| t.topic)
            .collect();

        let interests = match self.recommend(requested_by).await {
            Ok(profile) => profile.interests,
            Err(_) => Vec::new(),
        };

        Ok(OpinionContext {
            source_ids,
            source_texts,
            trending,
            interests,
        })
    }

    async fn build_profile(&self, user: &str) -> Result<UserProfile> {
        let store = self.store.lock().await;
        let own = store.items_saved_by(user, PROFILE_SAMPLE)?;
        let corpus = store.all_items()?;
        drop(store);
        Ok(build_profile(user, &own, &corpus))
    }
}

fn validate_save(req: &SaveRequest) -> Result<()> {
    if req.id.trim().is_empty() {
        return Err(EngineError::Validation("id is required".into()));
    }
    if req.saved_by.trim().is_empty() {
        return Err(EngineError::Validation("saved_by is required".into()));
    }
    if req.text.trim().is_empty() {
        return Err(EngineError::Validation("text is required".into()));
    }
    Ok(())
}

fn record_item(aggregator: &mut TrendingAggregator, item: &ContentItem) {
    for topic in item.topics() {
        aggregator.record_occurrence(&topic, item.engagement.weighted(), item.timestamp);
    }
}

fn format_digest(report: &TrendingReport) -> String {
    let mut lines = vec![format!("Trending over the last {}:", report.window)];
    for (i, trend) in report.trends.iter().take(5).enumerate() {
        let confidence = if trend.low_confidence {
            " (early signal)"
        } else {
            ""
        };
        lines.push(format!(
            "{}. {} - {} saves, avg engagement {:.1}, growth {:+}{confidence}",
            i + 1,
            trend.topic,
            trend.save_count,
            trend.engagement_avg,
            trend.recent_growth,
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generative::{GenerativePrompt, OpinionDraft, ValidDraft};
    use crate::tiering::ServedTier;
    use async_trait::async_trait;

    struct AlwaysGenerates;

    #[async_trait]
    impl GenerativeClient for AlwaysGenerates {
        async fn generate(
            &self,
            _prompt: &GenerativePrompt,
        ) -> std::result::Result<ValidDraft, GenerativeError> {
            OpinionDraft {
                text: "A considered take.".to_string(),
                confidence: Some(0.9),
                tone: Some("analytical".to_string()),
                reasoning: vec!["grounded in saved context".to_string()],
            }
            .validate()
            .map_err(GenerativeError::Malformed)
        }

        async fn research(&self, _query: &str) -> std::result::Result<String, GenerativeError> {
            Ok("background summary".to_string())
        }
    }

    fn engine() -> Engine {
        Engine::with_store(Store::open_in_memory().unwrap(), None, Duration::from_secs(60))
            .unwrap()
    }

    fn engine_with_client() -> Engine {
        Engine::with_store(
            Store::open_in_memory().unwrap(),
            Some(Box::new(AlwaysGenerates)),
            Duration::from_secs(60),
        )
        .unwrap()
    }

    fn save_req(id: &str, saved_by: &str, text: &str) -> SaveRequest {
        SaveRequest {
            id: id.to_string(),
            author: "author".to_string(),
            saved_by: saved_by.to_string(),
            text: text.to_string(),
            timestamp: Some(1_700_000_000),
            likes: 5,
            replies: 1,
            recasts: 0,
            embeds: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_save_returns_scores() {
        let engine = engine();
        let scores = engine
            .save(save_req("0x1", "bob", "shipping a protocol #defi"))
            .await
            .unwrap();
        assert!(scores.quality_score > 0.0);
        assert!((0.0..=1.0).contains(&scores.save_worthiness));
    }

    #[tokio::test]
    async fn test_duplicate_save_typed_error() {
        let engine = engine();
        let req = save_req("0x1", "bob", "gm");
        engine.save(req.clone()).await.unwrap();

        let err = engine.save(req).await;
        assert!(matches!(err, Err(EngineError::AlreadySaved { .. })), "{err:?}");
    }

    #[tokio::test]
    async fn test_save_validation() {
        let engine = engine();
        let mut req = save_req("0x1", "bob", "gm");
        req.text = "   ".to_string();
        assert!(matches!(
            engine.save(req).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_analyze_missing_item() {
        let engine = engine();
        let err = engine.analyze("0xmissing").await;
        assert!(matches!(err, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_analyze_persists_rescore() {
        let engine = engine();
        let mut req = save_req("0x1", "bob", "deep defi analysis #defi");
        req.timestamp = Some(now_unix_secs());
        engine.save(req).await.unwrap();
        let scores = engine.analyze("0x1").await.unwrap();
        assert_eq!(scores.analysis_version, ANALYSIS_VERSION);

        // Trending context now includes defi, so the rescore sees it
        assert!(scores.trending_score > 0.0);
    }

    #[tokio::test]
    async fn test_opinion_without_service_resolves() {
        let engine = engine();
        engine
            .save(save_req("0x1", "bob", "a lending protocol launch #defi"))
            .await
            .unwrap();

        let result = engine.opinion("0x1", "bob", "what do you think").await.unwrap();
        assert_eq!(result.tier, ServedTier::Fallback);
        assert!(!result.value.opinion_text.is_empty());
        assert!(result.value.confidence_score <= 0.5);

        // Tier 2 is not persisted
        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.opinions, 0);
    }

    #[tokio::test]
    async fn test_opinion_tier1_persisted() {
        let engine = engine_with_client();
        engine
            .save(save_req("0x1", "bob", "a lending protocol launch #defi"))
            .await
            .unwrap();

        let result = engine.opinion("0x1", "bob", "thoughts?").await.unwrap();
        assert_eq!(result.tier, ServedTier::Primary);

        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.opinions, 1);
    }

    #[tokio::test]
    async fn test_opinion_feedback_on_persisted() {
        let engine = engine_with_client();
        engine
            .save(save_req("0x1", "bob", "protocol launch #defi"))
            .await
            .unwrap();
        let result = engine.opinion("0x1", "bob", "thoughts?").await.unwrap();

        let updated = engine
            .opinion_feedback(&result.value.id, -0.3)
            .await
            .unwrap();
        assert!((updated - 0.6).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_trending_reflects_saves() {
        let engine = engine();
        for i in 0..3 {
            let mut req = save_req(&format!("0x{i}"), "bob", "yield farming update #defi");
            req.timestamp = Some(now_unix_secs());
            engine.save(req).await.unwrap();
        }

        let report = engine.trending(Window::Hour).await;
        assert!(!report.insufficient_data);
        assert_eq!(report.trends[0].topic, "defi");
        assert_eq!(report.trends[0].save_count, 3);
    }

    #[tokio::test]
    async fn test_digest_data_driven_without_service() {
        let engine = engine();
        let mut req = save_req("0x1", "bob", "yield farming update #defi");
        req.timestamp = Some(now_unix_secs());
        engine.save(req).await.unwrap();

        let digest = engine.digest(Window::Day).await;
        assert_eq!(digest.tier, ServedTier::Fallback);
        assert!(digest.value.contains("defi"));
    }

    #[tokio::test]
    async fn test_digest_empty_serves_canned() {
        let engine = engine();
        let digest = engine.digest(Window::Week).await;
        assert_eq!(digest.tier, ServedTier::Canned);
        assert!(!digest.value.is_empty());
    }

    #[tokio::test]
    async fn test_recommend_cached_until_invalidated() {
        let engine = engine();
        engine
            .save(save_req("0x1", "bob", "defi deep dive #defi"))
            .await
            .unwrap();

        let first = engine.recommend("bob").await.unwrap();
        assert!(first.interests.contains(&"defi".to_string()));

        // A new save invalidates the cache; the rebuilt profile sees it
        engine
            .save(save_req("0x2", "bob", "zk proofs explained #zk"))
            .await
            .unwrap();
        let second = engine.recommend("bob").await.unwrap();
        assert!(second.interests.contains(&"zk".to_string()));
    }

    #[tokio::test]
    async fn test_find_similar_excludes_reference() {
        let engine = engine();
        engine.save(save_req("0x1", "bob", "gm friends")).await.unwrap();
        engine.save(save_req("0x2", "carol", "gm friends")).await.unwrap();

        let hits = engine.find_similar("0x1", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "0x2");
    }

    #[tokio::test]
    async fn test_retag_refreshes_stale_versions() {
        let engine = engine();
        engine
            .save(save_req("0x1", "bob", "protocol notes #defi"))
            .await
            .unwrap();

        // Fresh analyses are current; nothing to refresh
        let report = engine.retag().await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.refreshed, 0);

        // Age the stored analysis by rewriting its version tag
        {
            let store = engine.store.lock().await;
            store
                .conn()
                .execute(
                    "UPDATE items SET scores = json_set(scores, '$.analysis_version', 'v0')",
                    [],
                )
                .unwrap();
        }

        let report = engine.retag().await.unwrap();
        assert_eq!(report.refreshed, 1);
        let item = engine.store.lock().await.get_item("0x1").unwrap();
        assert_eq!(
            item.scores.unwrap().analysis_version,
            ANALYSIS_VERSION
        );
    }

    #[tokio::test]
    async fn test_unsave_removes_item() {
        let engine = engine();
        engine.save(save_req("0x1", "bob", "gm")).await.unwrap();
        engine.unsave("0x1", "bob").await.unwrap();
        assert!(matches!(
            engine.analyze("0x1").await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_shape() {
        let engine = engine();
        engine
            .save(save_req("0x1", "bob", "protocol notes #defi"))
            .await
            .unwrap();

        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.items, 1);
        assert_eq!(stats.users, 1);
        assert!(stats.tracked_topics > 0);
        assert!(!stats.generative_configured);
        assert!(stats.db_schema_version.is_some());
    }

    #[tokio::test]
    async fn test_replay_on_open() {
        let store = Store::open_in_memory().unwrap();
        let mut item = ContentItem::new(
            "0x1",
            "author",
            "bob",
            "yield strategies #defi",
            now_unix_secs(),
            Engagement::new(2, 0, 0),
        );
        item.analyze(None);
        store.insert_item(&item).unwrap();

        let engine = Engine::with_store(store, None, Duration::from_secs(60)).unwrap();
        let report = engine.trending(Window::Day).await;
        assert!(!report.insufficient_data, "replayed items should trend");
    }
}
