//! Uniform demotion across command types.
//!
//! Every degradable command hands over a triple: a primary generative call,
//! a data-driven fallback, and an infallible canned response. Each tier runs
//! at most once; there is no retry loop, so latency is bounded by the
//! primary's own timeout. The controller only owns the demotion policy and
//! the record of which tier actually served.

use std::future::Future;

use crate::generative::GenerativeError;

/// Which tier produced a response. Reported for observability, never
/// hidden from logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServedTier {
    Primary,
    Fallback,
    Canned,
}

impl ServedTier {
    pub fn as_str(self) -> &'static str {
        match self {
            ServedTier::Primary => "primary",
            ServedTier::Fallback => "fallback",
            ServedTier::Canned => "canned",
        }
    }
}

pub struct Tiered<T> {
    pub value: T,
    pub tier: ServedTier,
}

/// Run the demotion ladder for one command. Always terminates with a value.
pub async fn respond<T, P, F, C>(command: &str, primary: P, fallback: F, canned: C) -> Tiered<T>
where
    P: Future<Output = std::result::Result<T, GenerativeError>>,
    F: FnOnce() -> std::result::Result<T, String>,
    C: FnOnce() -> T,
{
    match primary.await {
        Ok(value) => {
            return Tiered {
                value,
                tier: ServedTier::Primary,
            };
        }
        Err(e) => {
            tracing::warn!("{command}: primary tier failed ({e}), demoting to fallback");
        }
    }

    match fallback() {
        Ok(value) => Tiered {
            value,
            tier: ServedTier::Fallback,
        },
        Err(e) => {
            tracing::error!("{command}: fallback tier failed ({e}), serving canned response");
            Tiered {
                value: canned(),
                tier: ServedTier::Canned,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_primary_success_stops_ladder() {
        let result = respond(
            "test",
            async { Ok::<_, GenerativeError>("primary") },
            || panic!("fallback must not run"),
            || panic!("canned must not run"),
        )
        .await;
        assert_eq!(result.value, "primary");
        assert_eq!(result.tier, ServedTier::Primary);
    }

    #[tokio::test]
    async fn test_primary_failure_demotes_once() {
        let result = respond(
            "test",
            async { Err::<&str, _>(GenerativeError::Timeout) },
            || Ok("fallback"),
            || panic!("canned must not run"),
        )
        .await;
        assert_eq!(result.value, "fallback");
        assert_eq!(result.tier, ServedTier::Fallback);
    }

    #[tokio::test]
    async fn test_double_failure_serves_canned() {
        let result = respond(
            "test",
            async { Err::<&str, _>(GenerativeError::Unavailable("down".into())) },
            || Err("no data".to_string()),
            || "canned",
        )
        .await;
        assert_eq!(result.value, "canned");
        assert_eq!(result.tier, ServedTier::Canned);
    }

    #[tokio::test]
    async fn test_malformed_output_is_a_tier_failure() {
        let result = respond(
            "test",
            async { Err::<&str, _>(GenerativeError::Malformed("bad json".into())) },
            || Ok("fallback"),
            || "canned",
        )
        .await;
        assert_eq!(result.tier, ServedTier::Fallback);
    }
}
