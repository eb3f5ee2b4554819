//! Opinion records: generated judgments about a saved cast, with provenance.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Tone classification attached to a generated opinion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseTone {
    Analytical,
    Supportive,
    Critical,
    Curious,
    #[default]
    Neutral,
}

impl ResponseTone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analytical => "analytical",
            Self::Supportive => "supportive",
            Self::Critical => "critical",
            Self::Curious => "curious",
            Self::Neutral => "neutral",
        }
    }
}

impl FromStr for ResponseTone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "analytical" => Ok(Self::Analytical),
            "supportive" => Ok(Self::Supportive),
            "critical" => Ok(Self::Critical),
            "curious" => Ok(Self::Curious),
            "neutral" => Ok(Self::Neutral),
            other => Err(format!("unknown response tone: {other}")),
        }
    }
}

impl fmt::Display for ResponseTone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated judgment about one saved cast.
///
/// Immutable once recorded, with one exception: feedback can nudge the
/// confidence score. Everything else is provenance and must not change.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Opinion {
    pub id: String,
    /// The cast this opinion is about.
    pub content_id: String,
    /// The user who asked for it.
    pub requested_by: String,
    pub opinion_text: String,
    /// In [0, 1].
    pub confidence_score: f64,
    pub response_tone: ResponseTone,
    /// Topics the analysis touched on.
    pub topic_analysis: Vec<String>,
    /// Ordered reasoning trace from the generator.
    pub reasoning: Vec<String>,
    /// Identifiers of the context items that informed the opinion.
    pub sources_used: Vec<String>,
    pub web_research_summary: Option<String>,
    /// Unix seconds.
    pub created_at: u64,
}

impl Opinion {
    /// Apply a feedback delta to the confidence score, clamped to [0, 1].
    pub fn apply_feedback(&mut self, delta: f64) -> f64 {
        self.confidence_score = (self.confidence_score + delta).clamp(0.0, 1.0);
        self.confidence_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_opinion(confidence: f64) -> Opinion {
        Opinion {
            id: "op-1".to_string(),
            content_id: "0xabc".to_string(),
            requested_by: "alice".to_string(),
            opinion_text: "Strong thesis, thin evidence.".to_string(),
            confidence_score: confidence,
            response_tone: ResponseTone::Analytical,
            topic_analysis: vec!["defi".to_string()],
            reasoning: vec!["engagement is organic".to_string()],
            sources_used: vec!["0xdef".to_string()],
            web_research_summary: None,
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_tone_roundtrip() {
        for tone in [
            ResponseTone::Analytical,
            ResponseTone::Supportive,
            ResponseTone::Critical,
            ResponseTone::Curious,
            ResponseTone::Neutral,
        ] {
            let parsed: ResponseTone = tone.as_str().parse().unwrap();
            assert_eq!(parsed, tone);
        }
    }

    #[test]
    fn test_tone_parse_is_lenient_on_case() {
        assert_eq!(
            " Analytical ".parse::<ResponseTone>().unwrap(),
            ResponseTone::Analytical
        );
    }

    #[test]
    fn test_tone_parse_rejects_unknown() {
        assert!("sarcastic".parse::<ResponseTone>().is_err());
    }

    #[test]
    fn test_tone_serde_lowercase() {
        let json = serde_json::to_string(&ResponseTone::Curious).unwrap();
        assert_eq!(json, "\"curious\"");
        let back: ResponseTone = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(back, ResponseTone::Critical);
    }

    #[test]
    fn test_feedback_clamps_high() {
        let mut op = make_opinion(0.9);
        assert_eq!(op.apply_feedback(0.5), 1.0);
    }

    #[test]
    fn test_feedback_clamps_low() {
        let mut op = make_opinion(0.1);
        assert_eq!(op.apply_feedback(-0.5), 0.0);
    }

    #[test]
    fn test_feedback_normal_delta() {
        let mut op = make_opinion(0.6);
        let updated = op.apply_feedback(0.1);
        assert!((updated - 0.7).abs() < 1e-10);
    }

    #[test]
    fn test_serde_roundtrip() {
        let op = make_opinion(0.8);
        let json = serde_json::to_string(&op).unwrap();
        let back: Opinion = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, op.id);
        assert_eq!(back.response_tone, op.response_tone);
        assert_eq!(back.reasoning, op.reasoning);
    }
}
