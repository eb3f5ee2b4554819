//! Opinion formation.
//!
//! Tier 1 asks the generative service and validates its structured output.
//! Tier 2 is a deterministic template keyed by detected intent, with
//! rotating phrasings so repeated fallbacks don't read like a broken
//! record. Tier 3 is a canned line. The ladder itself lives in
//! [`crate::tiering`]; this module supplies the three rungs.

use std::sync::atomic::{AtomicUsize, Ordering};

use cm_core::{ContentItem, Opinion, ResponseTone, now_unix_secs};
use uuid::Uuid;

use crate::generative::{GenerativeClient, GenerativeError, GenerativePrompt};
use crate::intent::{OpinionIntent, classify};
use crate::tiering::{ServedTier, Tiered, respond};

/// Fixed confidence for template opinions: no model judgment exists.
const TIER2_CONFIDENCE: f64 = 0.5;
/// Fixed confidence for canned opinions.
const TIER3_CONFIDENCE: f64 = 0.2;

/// Everything the engine gathered about the cast before asking for an
/// opinion.
#[derive(Clone, Debug, Default)]
pub struct OpinionContext {
    /// Ids of related saved casts, recorded as provenance.
    pub source_ids: Vec<String>,
    /// Their texts, sent to the generative service for grounding.
    pub source_texts: Vec<String>,
    /// Currently trending topics.
    pub trending: Vec<String>,
    /// The requester's top interests.
    pub interests: Vec<String>,
}

pub struct OpinionPipeline {
    client: Option<Box<dyn GenerativeClient>>,
    rotation: AtomicUsize,
}

impl OpinionPipeline {
    pub fn new(client: Option<Box<dyn GenerativeClient>>) -> Self {
        Self {
            client,
            rotation: AtomicUsize::new(0),
        }
    }

    pub fn has_generative(&self) -> bool {
        self.client.is_some()
    }

    /// Free-text summarization through the research endpoint, for commands
    /// that want prose rather than a structured opinion.
    pub async fn summarize(&self, query: &str) -> std::result::Result<String, GenerativeError> {
        match &self.client {
            Some(client) => client.research(query).await,
            None => Err(GenerativeError::Unavailable(
                "no generative endpoint configured".to_string(),
            )),
        }
    }

    /// Form an opinion about `item`. Always returns one; the tier tells the
    /// caller whether it carries model judgment (only primary results are
    /// worth persisting).
    pub async fn form(
        &self,
        item: &ContentItem,
        requested_by: &str,
        user_prompt: &str,
        context: &OpinionContext,
    ) -> Tiered<Opinion> {
        let intent = classify(user_prompt);

        let primary = self.generate(item, requested_by, user_prompt, intent, context);
        let fallback = || Ok(self.template_opinion(item, requested_by, intent, context));
        let canned = || canned_opinion(item, requested_by, intent);

        respond("opinion", primary, fallback, canned).await
    }

    async fn generate(
        &self,
        item: &ContentItem,
        requested_by: &str,
        user_prompt: &str,
        intent: OpinionIntent,
        context: &OpinionContext,
    ) -> std::result::Result<Opinion, GenerativeError> {
        let Some(client) = &self.client else {
            return Err(GenerativeError::Unavailable(
                "no generative endpoint configured".to_string(),
            ));
        };

        let topics = item.topics();

        // Context gathering includes research: for domain questions the
        // lookup runs first, and its summary rides along in the prompt.
        // Best-effort under its own shorter timeout; a miss costs nothing.
        let web_research_summary = if intent == OpinionIntent::Domain && !topics.is_empty() {
            client.research(&topics.join(" ")).await.ok()
        } else {
            None
        };

        let prompt = GenerativePrompt {
            content_id: item.id.clone(),
            text: item.text.clone(),
            author: item.author.clone(),
            likes: item.engagement.likes,
            replies: item.engagement.replies,
            recasts: item.engagement.recasts,
            topics: topics.clone(),
            context: context.source_texts.clone(),
            research: web_research_summary.clone(),
            intent: intent.as_str().to_string(),
            user_prompt: user_prompt.to_string(),
        };

        let draft = client.generate(&prompt).await?;

        Ok(Opinion {
            id: Uuid::new_v4().to_string(),
            content_id: item.id.clone(),
            requested_by: requested_by.to_string(),
            opinion_text: draft.text,
            confidence_score: draft.confidence,
            response_tone: draft.tone,
            topic_analysis: topics,
            reasoning: draft.reasoning,
            sources_used: context.source_ids.clone(),
            web_research_summary,
            created_at: now_unix_secs(),
        })
    }

    /// Tier 2: deterministic template from the data we already have.
    fn template_opinion(
        &self,
        item: &ContentItem,
        requested_by: &str,
        intent: OpinionIntent,
        context: &OpinionContext,
    ) -> Opinion {
        let topics = item.topics();
        let topic = topics
            .first()
            .cloned()
            .unwrap_or_else(|| "this".to_string());
        let engagement = item.engagement.total();
        let variant = self.rotation.fetch_add(1, Ordering::Relaxed);

        let text = template_text(intent, variant, &topic, engagement, item);

        let mut reasoning = vec![format!(
            "engagement: {} likes, {} replies, {} recasts",
            item.engagement.likes, item.engagement.replies, item.engagement.recasts
        )];
        if !topics.is_empty() {
            reasoning.push(format!("topics detected: {}", topics.join(", ")));
        }
        if let Some(scores) = &item.scores {
            reasoning.push(format!("quality score {:.0}/100", scores.quality_score));
        }
        if context.trending.iter().any(|t| topics.contains(t)) {
            reasoning.push("overlaps current trending topics".to_string());
        }
        if context.interests.iter().any(|t| topics.contains(t)) {
            reasoning.push("matches the requester's saved interests".to_string());
        }

        Opinion {
            id: Uuid::new_v4().to_string(),
            content_id: item.id.clone(),
            requested_by: requested_by.to_string(),
            opinion_text: text,
            confidence_score: TIER2_CONFIDENCE,
            response_tone: template_tone(intent),
            topic_analysis: topics,
            reasoning,
            sources_used: context.source_ids.clone(),
            web_research_summary: None,
            created_at: now_unix_secs(),
        }
    }
}

fn template_tone(intent: OpinionIntent) -> ResponseTone {
    match intent {
        OpinionIntent::Thoughts | OpinionIntent::Domain => ResponseTone::Analytical,
        OpinionIntent::Reaction => ResponseTone::Supportive,
        OpinionIntent::Advice => ResponseTone::Neutral,
        OpinionIntent::Future => ResponseTone::Curious,
    }
}

fn template_text(
    intent: OpinionIntent,
    variant: usize,
    topic: &str,
    engagement: u32,
    item: &ContentItem,
) -> String {
    let author = &item.author;
    match intent {
        OpinionIntent::Thoughts | OpinionIntent::Domain => match variant % 3 {
            0 => format!(
                "This cast from {author} centers on {topic}. With {engagement} total \
                 interactions it has found a real audience; the substance holds up \
                 on a second read."
            ),
            1 => format!(
                "A {topic} take from {author}. The engagement numbers ({engagement} \
                 interactions) suggest it resonated, and the framing is clear enough \
                 to be worth keeping."
            ),
            _ => format!(
                "{author} is writing about {topic} here. Judged on the saved data \
                 alone, it reads as a considered post rather than a throwaway."
            ),
        },
        OpinionIntent::Reaction => match variant % 2 {
            0 => format!(
                "A straightforward way to engage: acknowledge the {topic} angle and \
                 add one concrete detail from your own experience."
            ),
            _ => format!(
                "Worth replying to. {author} clearly put thought into the {topic} \
                 framing, so a specific question will land better than a general \
                 compliment."
            ),
        },
        OpinionIntent::Advice => match variant % 2 {
            0 => format!(
                "Based on the saved data alone: the {topic} discussion has \
                 {engagement} interactions behind it, which is signal, not noise. \
                 Weigh it, but verify independently."
            ),
            _ => format!(
                "Treat this as one input. The {topic} thesis is plausible and the \
                 engagement is organic, but nothing here replaces your own research."
            ),
        },
        OpinionIntent::Future => match variant % 2 {
            0 => format!(
                "Hard to project from a single cast, but {topic} keeps appearing in \
                 recent saves. If that continues, this post will look early rather \
                 than late."
            ),
            _ => format!(
                "The trajectory depends on whether {topic} keeps its momentum. \
                 Current engagement ({engagement} interactions) says the interest is \
                 there today."
            ),
        },
    }
}

/// Tier 3: static response, still shaped by intent so it never reads as an
/// error message.
fn canned_opinion(item: &ContentItem, requested_by: &str, intent: OpinionIntent) -> Opinion {
    let text = match intent {
        OpinionIntent::Advice => {
            "I can't weigh in with full analysis right now. The cast is saved; \
             ask again shortly for a considered take."
        }
        _ => {
            "I don't have enough analysis available at the moment to offer a \
             substantive opinion on this cast. It is saved, so try again shortly."
        }
    };
    Opinion {
        id: Uuid::new_v4().to_string(),
        content_id: item.id.clone(),
        requested_by: requested_by.to_string(),
        opinion_text: text.to_string(),
        confidence_score: TIER3_CONFIDENCE,
        response_tone: ResponseTone::Neutral,
        topic_analysis: Vec::new(),
        reasoning: vec!["analysis pipeline unavailable".to_string()],
        sources_used: Vec::new(),
        web_research_summary: None,
        created_at: now_unix_secs(),
    }
}

/// True when an opinion carries model judgment and should be persisted.
pub fn persistable(tier: ServedTier) -> bool {
    tier == ServedTier::Primary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generative::{OpinionDraft, ValidDraft};
    use async_trait::async_trait;
    use cm_core::Engagement;

    struct FakeClient {
        draft: std::result::Result<OpinionDraft, ()>,
    }

    #[async_trait]
    impl GenerativeClient for FakeClient {
        async fn generate(
            &self,
            _prompt: &GenerativePrompt,
        ) -> std::result::Result<ValidDraft, GenerativeError> {
            match &self.draft {
                Ok(draft) => draft.clone().validate().map_err(GenerativeError::Malformed),
                Err(()) => Err(GenerativeError::Unavailable("down".to_string())),
            }
        }

        async fn research(&self, _query: &str) -> std::result::Result<String, GenerativeError> {
            Err(GenerativeError::Unavailable("down".to_string()))
        }
    }

    fn make_item() -> ContentItem {
        let mut item = ContentItem::new(
            "0x1",
            "alice",
            "bob",
            "shipping a lending protocol #defi",
            1_700_000_000,
            Engagement::new(10, 2, 1),
        );
        item.analyze(None);
        item
    }

    fn good_draft() -> OpinionDraft {
        OpinionDraft {
            text: "A credible launch with organic traction.".to_string(),
            confidence: Some(0.85),
            tone: Some("analytical".to_string()),
            reasoning: vec!["reply ratio is healthy".to_string()],
        }
    }

    #[tokio::test]
    async fn test_tier1_served_with_model_judgment() {
        let pipeline = OpinionPipeline::new(Some(Box::new(FakeClient {
            draft: Ok(good_draft()),
        })));
        let item = make_item();

        let result = pipeline
            .form(&item, "bob", "what do you think", &OpinionContext::default())
            .await;
        assert_eq!(result.tier, ServedTier::Primary);
        assert!(persistable(result.tier));
        assert_eq!(result.value.confidence_score, 0.85);
        assert_eq!(result.value.response_tone, ResponseTone::Analytical);
        assert!(result.value.topic_analysis.contains(&"defi".to_string()));
    }

    #[tokio::test]
    async fn test_service_down_serves_template() {
        let pipeline = OpinionPipeline::new(Some(Box::new(FakeClient { draft: Err(()) })));
        let item = make_item();

        let result = pipeline
            .form(&item, "bob", "thoughts?", &OpinionContext::default())
            .await;
        assert_eq!(result.tier, ServedTier::Fallback);
        assert!(!persistable(result.tier));
        assert_eq!(result.value.confidence_score, TIER2_CONFIDENCE);
        assert!(!result.value.opinion_text.is_empty());
        assert!(!result.value.reasoning.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_output_is_not_silently_accepted() {
        let pipeline = OpinionPipeline::new(Some(Box::new(FakeClient {
            draft: Ok(OpinionDraft {
                text: "take".to_string(),
                confidence: Some(2.0), // out of range
                tone: Some("analytical".to_string()),
                reasoning: vec!["r".to_string()],
            }),
        })));
        let item = make_item();

        let result = pipeline
            .form(&item, "bob", "thoughts?", &OpinionContext::default())
            .await;
        assert_eq!(result.tier, ServedTier::Fallback);
    }

    #[tokio::test]
    async fn test_no_client_serves_template() {
        let pipeline = OpinionPipeline::new(None);
        let item = make_item();

        let result = pipeline
            .form(&item, "bob", "should I care", &OpinionContext::default())
            .await;
        assert_eq!(result.tier, ServedTier::Fallback);
        assert_eq!(result.value.response_tone, ResponseTone::Neutral);
    }

    #[tokio::test]
    async fn test_template_variants_rotate() {
        let pipeline = OpinionPipeline::new(None);
        let item = make_item();
        let ctx = OpinionContext::default();

        let first = pipeline.form(&item, "bob", "what do you think", &ctx).await;
        let second = pipeline.form(&item, "bob", "what do you think", &ctx).await;
        assert_ne!(
            first.value.opinion_text, second.value.opinion_text,
            "consecutive fallbacks should rotate phrasing"
        );
    }

    #[tokio::test]
    async fn test_intent_shapes_template_tone() {
        let pipeline = OpinionPipeline::new(None);
        let item = make_item();
        let ctx = OpinionContext::default();

        let future = pipeline.form(&item, "bob", "will this take off", &ctx).await;
        assert_eq!(future.value.response_tone, ResponseTone::Curious);

        let reaction = pipeline.form(&item, "bob", "how should I respond", &ctx).await;
        assert_eq!(reaction.value.response_tone, ResponseTone::Supportive);
    }

    #[test]
    fn test_canned_opinion_never_empty() {
        let item = make_item();
        let opinion = canned_opinion(&item, "bob", OpinionIntent::Thoughts);
        assert!(!opinion.opinion_text.is_empty());
        assert_eq!(opinion.confidence_score, TIER3_CONFIDENCE);
    }

    struct ResearchAware;

    #[async_trait]
    impl GenerativeClient for ResearchAware {
        async fn generate(
            &self,
            prompt: &GenerativePrompt,
        ) -> std::result::Result<ValidDraft, GenerativeError> {
            if prompt.research.as_deref() != Some("context notes") {
                return Err(GenerativeError::Malformed(
                    "research missing from prompt".to_string(),
                ));
            }
            good_draft().validate().map_err(GenerativeError::Malformed)
        }

        async fn research(&self, _query: &str) -> std::result::Result<String, GenerativeError> {
            Ok("context notes".to_string())
        }
    }

    #[tokio::test]
    async fn test_research_gathered_before_generation() {
        let pipeline = OpinionPipeline::new(Some(Box::new(ResearchAware)));
        let item = make_item();

        // Domain prompt on a topical cast: the research summary must already
        // be in the prompt when the generator runs
        let result = pipeline
            .form(&item, "bob", "what about this defi play", &OpinionContext::default())
            .await;
        assert_eq!(result.tier, ServedTier::Primary);
        assert_eq!(
            result.value.web_research_summary.as_deref(),
            Some("context notes")
        );
    }

    #[tokio::test]
    async fn test_sources_carried_as_provenance() {
        let pipeline = OpinionPipeline::new(Some(Box::new(FakeClient {
            draft: Ok(good_draft()),
        })));
        let item = make_item();
        let ctx = OpinionContext {
            source_ids: vec!["0xrelated".to_string()],
            source_texts: vec!["related cast".to_string()],
            trending: vec![],
            interests: vec![],
        };

        let result = pipeline.form(&item, "bob", "thoughts", &ctx).await;
        assert_eq!(result.value.sources_used, vec!["0xrelated".to_string()]);
    }
}
