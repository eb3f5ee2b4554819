//! Generative service client.
//!
//! The service contract is deliberately loose JSON; the strict part lives
//! here in [`OpinionDraft::validate`]. Error, timeout, and malformed output
//! all collapse into [`GenerativeError`] so the tiering controller handles
//! them uniformly.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use cm_core::ResponseTone;
use serde::{Deserialize, Serialize};

/// Context bundle sent to the generative service.
#[derive(Clone, Debug, Serialize)]
pub struct GenerativePrompt {
    pub content_id: String,
    pub text: String,
    pub author: String,
    pub likes: u32,
    pub replies: u32,
    pub recasts: u32,
    pub topics: Vec<String>,
    /// Texts of related saved casts, for grounding.
    pub context: Vec<String>,
    /// Web research summary gathered before generation, when available.
    pub research: Option<String>,
    pub intent: String,
    pub user_prompt: String,
}

/// Raw structured output from the service, before validation.
#[derive(Clone, Debug, Deserialize)]
pub struct OpinionDraft {
    #[serde(default)]
    pub text: String,
    pub confidence: Option<f64>,
    pub tone: Option<String>,
    #[serde(default)]
    pub reasoning: Vec<String>,
}

/// A draft that passed validation. Construction goes through
/// [`OpinionDraft::validate`] only.
#[derive(Clone, Debug)]
pub struct ValidDraft {
    pub text: String,
    pub confidence: f64,
    pub tone: ResponseTone,
    pub reasoning: Vec<String>,
}

impl OpinionDraft {
    /// Enforce the tier-1 contract: non-empty text, confidence in [0, 1],
    /// a parseable tone, and a non-empty reasoning trace. Any miss is a
    /// tier failure, never a silent acceptance.
    pub fn validate(self) -> std::result::Result<ValidDraft, String> {
        if self.text.trim().is_empty() {
            return Err("empty opinion text".to_string());
        }
        let confidence = self.confidence.ok_or("missing confidence")?;
        if !(0.0..=1.0).contains(&confidence) || !confidence.is_finite() {
            return Err(format!("confidence {confidence} outside [0, 1]"));
        }
        let tone: ResponseTone = self.tone.ok_or("missing tone")?.parse()?;
        if self.reasoning.iter().all(|r| r.trim().is_empty()) {
            return Err("missing reasoning trace".to_string());
        }
        Ok(ValidDraft {
            text: self.text,
            confidence,
            tone,
            reasoning: self.reasoning,
        })
    }
}

#[derive(Debug)]
pub enum GenerativeError {
    Unavailable(String),
    Timeout,
    Malformed(String),
}

impl fmt::Display for GenerativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerativeError::Unavailable(msg) => write!(f, "service unavailable: {msg}"),
            GenerativeError::Timeout => write!(f, "service timed out"),
            GenerativeError::Malformed(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

impl std::error::Error for GenerativeError {}

/// Seam for the generative backend. The HTTP client below is the real one;
/// tests substitute their own.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(&self, prompt: &GenerativePrompt)
    -> std::result::Result<ValidDraft, GenerativeError>;

    /// Short factual lookup used to garnish tier-1 opinions. Best-effort;
    /// callers treat any failure as "no research".
    async fn research(&self, query: &str) -> std::result::Result<String, GenerativeError>;
}

pub struct HttpGenerative {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
    research_timeout: Duration,
}

impl HttpGenerative {
    pub fn new(
        url: String,
        api_key: Option<String>,
        timeout: Duration,
        research_timeout: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            api_key,
            timeout,
            research_timeout,
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.post(format!("{}/{path}", self.url.trim_end_matches('/')));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }
}

#[async_trait]
impl GenerativeClient for HttpGenerative {
    async fn generate(
        &self,
        prompt: &GenerativePrompt,
    ) -> std::result::Result<ValidDraft, GenerativeError> {
        let send = self.request("opinion").json(prompt).send();
        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| GenerativeError::Timeout)?
            .map_err(|e| GenerativeError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GenerativeError::Unavailable(format!(
                "status {}",
                response.status()
            )));
        }

        let draft: OpinionDraft = response
            .json()
            .await
            .map_err(|e| GenerativeError::Malformed(e.to_string()))?;
        draft.validate().map_err(GenerativeError::Malformed)
    }

    async fn research(&self, query: &str) -> std::result::Result<String, GenerativeError> {
        let body = serde_json::json!({ "query": query });
        let send = self.request("research").json(&body).send();
        let response = tokio::time::timeout(self.research_timeout, send)
            .await
            .map_err(|_| GenerativeError::Timeout)?
            .map_err(|e| GenerativeError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GenerativeError::Unavailable(format!(
                "status {}",
                response.status()
            )));
        }

        #[derive(Deserialize)]
        struct Research {
            summary: String,
        }
        let research: Research = response
            .json()
            .await
            .map_err(|e| GenerativeError::Malformed(e.to_string()))?;
        if research.summary.trim().is_empty() {
            return Err(GenerativeError::Malformed("empty research summary".into()));
        }
        Ok(research.summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(text: &str, confidence: Option<f64>, tone: Option<&str>, reasoning: &[&str]) -> OpinionDraft {
        OpinionDraft {
            text: text.to_string(),
            confidence,
            tone: tone.map(String::from),
            reasoning: reasoning.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_valid_draft_passes() {
        let valid = draft("solid take", Some(0.8), Some("analytical"), &["engagement is real"])
            .validate()
            .unwrap();
        assert_eq!(valid.tone, ResponseTone::Analytical);
        assert_eq!(valid.confidence, 0.8);
    }

    #[test]
    fn test_empty_text_rejected() {
        assert!(draft("  ", Some(0.8), Some("neutral"), &["r"]).validate().is_err());
    }

    #[test]
    fn test_missing_confidence_rejected() {
        assert!(draft("text", None, Some("neutral"), &["r"]).validate().is_err());
    }

    #[test]
    fn test_out_of_range_confidence_rejected() {
        assert!(draft("text", Some(1.5), Some("neutral"), &["r"]).validate().is_err());
        assert!(draft("text", Some(-0.1), Some("neutral"), &["r"]).validate().is_err());
        assert!(draft("text", Some(f64::NAN), Some("neutral"), &["r"]).validate().is_err());
    }

    #[test]
    fn test_unknown_tone_rejected() {
        assert!(draft("text", Some(0.5), Some("sarcastic"), &["r"]).validate().is_err());
    }

    #[test]
    fn test_missing_reasoning_rejected() {
        assert!(draft("text", Some(0.5), Some("neutral"), &[]).validate().is_err());
        assert!(draft("text", Some(0.5), Some("neutral"), &["", " "]).validate().is_err());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        // Nothing listens on this port
        let client = HttpGenerative::new(
            "http://127.0.0.1:1".to_string(),
            None,
            Duration::from_millis(500),
            Duration::from_millis(200),
        );
        let prompt = GenerativePrompt {
            content_id: "0x1".into(),
            text: "gm".into(),
            author: "a".into(),
            likes: 0,
            replies: 0,
            recasts: 0,
            topics: vec![],
            context: vec![],
            research: None,
            intent: "thoughts".into(),
            user_prompt: String::new(),
        };
        let err = client.generate(&prompt).await;
        assert!(
            matches!(err, Err(GenerativeError::Unavailable(_)) | Err(GenerativeError::Timeout)),
            "{err:?}"
        );
    }
}
