//! Feature extraction: raw cast text to structured attributes.
//!
//! A total function of the text plus attached embed links. Never fails;
//! empty input yields empty-but-valid features. Identical input produces
//! byte-identical output, so recomputation is always safe.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::{TOPIC_LIMIT, TOPIC_MIN_LEN};

static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s]+").unwrap());
static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z0-9_][A-Za-z0-9_.-]*)").unwrap());
static HASHTAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\w+)").unwrap());

/// Lexical sentiment markers. Majority wins, ties are neutral.
const POSITIVE_MARKERS: &[&str] = &[
    "good", "great", "awesome", "amazing", "love", "excellent", "bullish", "excited", "shipped",
    "launch", "win", "winning", "best", "nice", "cool", "solid", "impressive", "beautiful",
    "congrats", "gm",
];

const NEGATIVE_MARKERS: &[&str] = &[
    "bad", "terrible", "awful", "hate", "scam", "rug", "bearish", "worst", "broken", "down",
    "crash", "fail", "failed", "ugly", "wrong", "fear", "dead", "rekt", "dump", "exploit",
];

/// Common words excluded from topic candidates.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "if", "then", "this", "that", "these", "those", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", "can", "may", "might", "just", "very", "really", "about", "with",
    "from", "into", "over", "under", "again", "more", "most", "some", "such", "what", "when",
    "where", "which", "while", "your", "you", "they", "them", "their", "there", "here", "it's",
    "its", "not", "for", "out", "all", "like",
];

/// Known protocol/ecosystem names surfaced as project entities.
const PROJECT_LEXICON: &[&str] = &[
    "bitcoin", "ethereum", "solana", "farcaster", "warpcast", "uniswap", "aave", "optimism",
    "arbitrum", "base", "polygon", "lens", "nouns", "zora", "defi", "web3", "nft", "dao",
];

/// Known company names surfaced as company entities.
const COMPANY_LEXICON: &[&str] = &[
    "coinbase", "google", "apple", "microsoft", "openai", "anthropic", "meta", "amazon", "tesla",
    "stripe", "paradigm", "a16z",
];

/// Sentiment classification of a cast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

/// Entity buckets derived from text and mentions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entities {
    /// Distinctive tokens (long, non-stopword), first-occurrence ordered.
    pub tokens: Vec<String>,
    pub projects: Vec<String>,
    /// Mentioned handles.
    pub people: Vec<String>,
    pub companies: Vec<String>,
}

/// Structured attributes of one cast. Pure function of raw text plus the
/// attached embed link list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    pub urls: Vec<String>,
    pub mentions: Vec<String>,
    pub hashtags: Vec<String>,
    /// Hashtags plus keyword candidates, capped at [`TOPIC_LIMIT`],
    /// first-occurrence ordered.
    pub topics: Vec<String>,
    pub word_count: usize,
    pub sentiment: Sentiment,
    pub entities: Entities,
}

/// Extract features from cast text and its embed links.
pub fn extract(text: &str, embeds: &[String]) -> Features {
    let urls = collect_urls(text, embeds);
    let mentions: Vec<String> = dedup_ordered(
        MENTION
            .captures_iter(text)
            .map(|c| c[1].to_lowercase())
            .collect(),
    );
    let hashtags: Vec<String> = dedup_ordered(
        HASHTAG
            .captures_iter(text)
            .map(|c| c[1].to_lowercase())
            .collect(),
    );

    let tokens = word_tokens(text);
    let word_count = text.split_whitespace().count();
    let sentiment = classify_sentiment(&tokens);
    let topics = derive_topics(&hashtags, &tokens);
    let entities = derive_entities(&tokens, &mentions);

    Features {
        urls,
        mentions,
        hashtags,
        topics,
        word_count,
        sentiment,
        entities,
    }
}

/// Text urls unioned with embed links, deduplicated, order-preserving
/// (text urls first).
fn collect_urls(text: &str, embeds: &[String]) -> Vec<String> {
    let mut all: Vec<String> = URL.find_iter(text).map(|m| m.as_str().to_string()).collect();
    all.extend(embeds.iter().cloned());
    dedup_ordered(all)
}

fn dedup_ordered(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values.into_iter().filter(|v| seen.insert(v.clone())).collect()
}

/// Lowercase word tokens with surrounding punctuation stripped. Hashtag and
/// mention sigils are dropped so "#defi" and "defi" compare equal.
fn word_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

fn classify_sentiment(tokens: &[String]) -> Sentiment {
    let positive = tokens
        .iter()
        .filter(|t| POSITIVE_MARKERS.contains(&t.as_str()))
        .count();
    let negative = tokens
        .iter()
        .filter(|t| NEGATIVE_MARKERS.contains(&t.as_str()))
        .count();

    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}

/// topics = hashtags plus stopword-filtered keyword candidates (len > 3),
/// first-occurrence ordered, capped.
fn derive_topics(hashtags: &[String], tokens: &[String]) -> Vec<String> {
    let mut topics: Vec<String> = hashtags.to_vec();
    let mut seen: HashSet<String> = topics.iter().cloned().collect();

    for token in tokens {
        if topics.len() >= TOPIC_LIMIT {
            break;
        }
        if token.len() >= TOPIC_MIN_LEN
            && token.chars().any(|c| c.is_alphabetic())
            && !STOPWORDS.contains(&token.as_str())
            && !seen.contains(token.as_str())
        {
            seen.insert(token.clone());
            topics.push(token.clone());
        }
    }

    topics.truncate(TOPIC_LIMIT);
    topics
}

fn derive_entities(tokens: &[String], mentions: &[String]) -> Entities {
    let distinctive: Vec<String> = dedup_ordered(
        tokens
            .iter()
            .filter(|t| t.len() >= TOPIC_MIN_LEN && !STOPWORDS.contains(&t.as_str()))
            .cloned()
            .collect(),
    );

    let projects = distinctive
        .iter()
        .filter(|t| PROJECT_LEXICON.contains(&t.as_str()))
        .cloned()
        .collect();
    let companies = distinctive
        .iter()
        .filter(|t| COMPANY_LEXICON.contains(&t.as_str()))
        .cloned()
        .collect();

    Entities {
        tokens: distinctive,
        projects,
        people: mentions.to_vec(),
        companies,
    }
}
