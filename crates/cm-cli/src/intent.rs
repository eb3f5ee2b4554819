//! Intent detection for opinion prompts.
//!
//! A thin keyword classifier: rules are checked in order and the first
//! match wins, so more specific intents sit above the catch-all.

/// What kind of opinion the user is asking for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpinionIntent {
    /// "what do you think about this"
    Thoughts,
    /// "how should I react / respond"
    Reaction,
    /// "should I do X"
    Advice,
    /// "where is this going"
    Future,
    /// Domain-specific commentary (crypto/web3 vocabulary in the prompt).
    Domain,
}

impl OpinionIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            OpinionIntent::Thoughts => "thoughts",
            OpinionIntent::Reaction => "reaction",
            OpinionIntent::Advice => "advice",
            OpinionIntent::Future => "future",
            OpinionIntent::Domain => "domain",
        }
    }
}

/// Ordered rule table. First matching rule wins.
const RULES: &[(fn(&str) -> bool, OpinionIntent)] = &[
    (is_future, OpinionIntent::Future),
    (is_reaction, OpinionIntent::Reaction),
    (is_advice, OpinionIntent::Advice),
    (is_domain, OpinionIntent::Domain),
];

/// Classify a prompt. Defaults to [`OpinionIntent::Thoughts`] when nothing
/// more specific matches, including the empty prompt.
pub fn classify(prompt: &str) -> OpinionIntent {
    let lowered = prompt.to_lowercase();
    for (matches, intent) in RULES {
        if matches(&lowered) {
            return *intent;
        }
    }
    OpinionIntent::Thoughts
}

fn is_future(prompt: &str) -> bool {
    contains_any(
        prompt,
        &["will this", "going to", "future", "predict", "where is this going", "next for"],
    )
}

fn is_advice(prompt: &str) -> bool {
    contains_any(prompt, &["should i", "worth", "advice", "recommend", "good idea"])
}

fn is_reaction(prompt: &str) -> bool {
    contains_any(prompt, &["react", "respond", "reply", "how do i answer"])
}

fn is_domain(prompt: &str) -> bool {
    contains_any(
        prompt,
        &["defi", "token", "protocol", "onchain", "web3", "airdrop", "yield"],
    )
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_thoughts() {
        assert_eq!(classify("what do you think about this"), OpinionIntent::Thoughts);
        assert_eq!(classify(""), OpinionIntent::Thoughts);
    }

    #[test]
    fn test_future_intent() {
        assert_eq!(classify("Will this take off?"), OpinionIntent::Future);
        assert_eq!(classify("where is this going"), OpinionIntent::Future);
    }

    #[test]
    fn test_advice_intent() {
        assert_eq!(classify("Should I buy in?"), OpinionIntent::Advice);
        assert_eq!(classify("is this worth my time"), OpinionIntent::Advice);
    }

    #[test]
    fn test_reaction_intent() {
        assert_eq!(classify("how should I respond to this"), OpinionIntent::Reaction);
    }

    #[test]
    fn test_domain_intent() {
        assert_eq!(classify("thoughts on this defi play"), OpinionIntent::Domain);
    }

    #[test]
    fn test_rule_order_specific_beats_domain() {
        // Mentions a token but asks a future question; future rule sits higher
        assert_eq!(classify("will this token moon"), OpinionIntent::Future);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("SHOULD I care"), OpinionIntent::Advice);
    }
}
