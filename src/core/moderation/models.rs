// Moderation domain models - data structures for the content moderation pipeline.
//
// These are pure domain types with no storage or transport dependencies.
// The infra layer converts these to wire/storage shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One moderatable unit, as stored by the external record collection.
///
/// The pipeline treats records as read-only: it never mutates or deletes
/// them, only classifies their content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Opaque unique identifier, immutable once created.
    pub id: String,
    /// Free-form text body evaluated by the policy.
    pub content: String,
    /// Identifier of the submitting principal. Used only for audit/logging,
    /// never for access control.
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Classification outcome for one content record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Content is fine - no action needed.
    Allow,
    /// Aggregate severity crossed the threshold - needs human review.
    Flag,
    /// A rule signalled a hard violation.
    Block,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Allow => write!(f, "ALLOW"),
            Verdict::Flag => write!(f, "FLAG"),
            Verdict::Block => write!(f, "BLOCK"),
        }
    }
}

/// Output of the policy evaluator for one record.
///
/// Invariant: a deterministic function of `content` and the policy version.
/// Identical input always yields an identical verdict, severity, and reason
/// code set (`evaluated_at` aside).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationVerdict {
    pub record_id: String,
    pub verdict: Verdict,
    /// Aggregate severity score across all matched rules.
    pub severity: u32,
    /// Short machine-readable tags explaining the verdict, sorted and deduped.
    pub reason_codes: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl ModerationVerdict {
    /// Whether this verdict must be surfaced to a human reviewer.
    pub fn requires_alert(&self) -> bool {
        matches!(self.verdict, Verdict::Flag | Verdict::Block)
    }
}

/// Unit published to the notification channel when a record is flagged or
/// blocked. Serialized field names are the wire schema the downstream
/// subscriber sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertMessage {
    pub record_id: String,
    pub verdict: Verdict,
    pub severity: u32,
    pub reason_codes: Vec<String>,
    pub timestamp: DateTime<Utc>,
    /// Stable hash of (record id, verdict, policy version). Lets a
    /// deduplicating subscriber collapse duplicate deliveries.
    pub idempotency_key: String,
}

/// Normalized unit of work produced by the invocation router.
///
/// Created per invocation, consumed immediately by the orchestrator,
/// never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum ModerationCommand {
    /// One record touched by a store change event.
    SingleEvent { record_id: String },
    /// Manual re-check of one record.
    SingleLookup { record_id: String },
    /// Bulk audit sweep over the whole collection, optionally resuming
    /// from an earlier page.
    BulkSweep { continuation_token: Option<String> },
}

/// Machine-readable failure kinds reported per record in a run result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeError {
    NotFound,
    StoreUnavailable,
    InvalidQuery,
    DispatchTransient,
    DispatchPermanent,
}

/// Outcome for one record processed within an invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub record_id: String,
    /// Absent when the record could not be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    /// Whether an alert for this record was published during this run.
    pub alerted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
}

impl RecordOutcome {
    /// Outcome for a record that was resolved and evaluated.
    pub fn evaluated(record_id: impl Into<String>, verdict: Verdict, alerted: bool) -> Self {
        Self {
            record_id: record_id.into(),
            verdict: Some(verdict),
            alerted,
            error: None,
        }
    }

    /// Outcome for a record that failed before or during dispatch.
    pub fn failed(
        record_id: impl Into<String>,
        verdict: Option<Verdict>,
        error: OutcomeError,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            verdict,
            alerted: false,
            error: Some(error),
        }
    }
}

/// Aggregated result of one pipeline invocation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationRunResult {
    /// Per-record outcomes in processing order.
    pub outcomes: Vec<RecordOutcome>,
    /// Present when a sweep stopped early (page cap, deadline, or page
    /// fetch failure). Pass it back in a sweep trigger to resume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
    /// Set when a sweep page fetch failed after exhausting retries. There
    /// is no record to pin that failure on, so it is reported at run level
    /// to distinguish "store down, sweep aborted" from a normal page-cap
    /// partial run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sweep_error: Option<OutcomeError>,
    /// True when every publish attempted in this run failed permanently,
    /// which usually means a channel/permission misconfiguration.
    pub degraded: bool,
}

impl ModerationRunResult {
    /// Number of per-record failures collected in this run.
    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_some()).count()
    }

    /// Number of alerts published in this run.
    pub fn alert_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.alerted).count()
    }
}
