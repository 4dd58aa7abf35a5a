// Alert dispatcher port - publish side of the notification channel.
//
// The dispatcher delivers exactly one message per call. Deduplication is the
// caller's job within a run, and the downstream subscriber's job across runs
// via the idempotency key. Retries of one publish must reuse the same key.

use super::models::{AlertMessage, ModerationVerdict, Verdict};
use super::policy::POLICY_VERSION;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Retryable channel failure (timeouts, 5xx, transport errors).
    #[error("transient dispatch failure: {0}")]
    Transient(String),

    /// Channel not found, permission denied, malformed destination. Fatal
    /// for the record; retrying cannot help.
    #[error("permanent dispatch failure: {0}")]
    Permanent(String),
}

/// Abstraction over the publish/subscribe channel. Fan-out to the final
/// destination (e.g. an email relay) is the channel's responsibility.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    /// Deliver one message to the notification topic.
    async fn publish(&self, message: &AlertMessage) -> Result<(), DispatchError>;
}

/// Stable key for collapsing duplicate deliveries of logically-identical
/// alerts. Deterministic across processes for a fixed policy version:
/// `DefaultHasher::new()` is seeded with constant keys.
pub fn idempotency_key(record_id: &str, verdict: Verdict) -> String {
    let mut hasher = DefaultHasher::new();
    record_id.hash(&mut hasher);
    verdict.hash(&mut hasher);
    POLICY_VERSION.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Build the alert for a flagged/blocked verdict.
pub fn build_alert(verdict: &ModerationVerdict) -> AlertMessage {
    AlertMessage {
        record_id: verdict.record_id.clone(),
        verdict: verdict.verdict,
        severity: verdict.severity,
        reason_codes: verdict.reason_codes.clone(),
        timestamp: Utc::now(),
        idempotency_key: idempotency_key(&verdict.record_id, verdict.verdict),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_inputs_yield_equal_keys() {
        assert_eq!(
            idempotency_key("rec-1", Verdict::Block),
            idempotency_key("rec-1", Verdict::Block)
        );
    }

    #[test]
    fn different_record_or_verdict_yields_different_keys() {
        let base = idempotency_key("rec-1", Verdict::Block);
        assert_ne!(base, idempotency_key("rec-2", Verdict::Block));
        assert_ne!(base, idempotency_key("rec-1", Verdict::Flag));
    }

    #[test]
    fn no_collisions_over_a_bounded_corpus() {
        let mut seen = std::collections::HashSet::new();
        for i in 0..1000 {
            for verdict in [Verdict::Flag, Verdict::Block] {
                assert!(seen.insert(idempotency_key(&format!("rec-{i}"), verdict)));
            }
        }
    }

    #[test]
    fn alert_carries_the_verdict_fields() {
        let verdict = ModerationVerdict {
            record_id: "rec-9".to_string(),
            verdict: Verdict::Flag,
            severity: 6,
            reason_codes: vec!["LINK_SPAM".to_string()],
            evaluated_at: Utc::now(),
        };
        let alert = build_alert(&verdict);
        assert_eq!(alert.record_id, "rec-9");
        assert_eq!(alert.verdict, Verdict::Flag);
        assert_eq!(alert.severity, 6);
        assert_eq!(alert.reason_codes, vec!["LINK_SPAM".to_string()]);
        assert_eq!(alert.idempotency_key, idempotency_key("rec-9", Verdict::Flag));
    }

    #[test]
    fn alert_wire_schema_uses_camel_case() {
        let verdict = ModerationVerdict {
            record_id: "rec-9".to_string(),
            verdict: Verdict::Block,
            severity: 10,
            reason_codes: vec!["DISALLOWED_TERM".to_string()],
            evaluated_at: Utc::now(),
        };
        let json = serde_json::to_value(build_alert(&verdict)).unwrap();
        assert_eq!(json["recordId"], "rec-9");
        assert_eq!(json["verdict"], "BLOCK");
        assert_eq!(json["reasonCodes"][0], "DISALLOWED_TERM");
        assert!(json["idempotencyKey"].is_string());
        assert!(json["timestamp"].is_string());
    }
}
