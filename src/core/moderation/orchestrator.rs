// Moderation orchestrator - drives one invocation end to end.
//
// Resolves each routed command against the record store, runs the policy
// evaluator, and publishes alerts for flagged/blocked verdicts. One bad
// record never aborts its siblings: per-record failures are collected into
// the run result and the run reports partial success.
//
// NO storage or transport details here - the store and dispatcher are
// injected ports, so this whole module is testable with in-memory mocks.

use super::dispatch::{build_alert, AlertDispatcher, DispatchError};
use super::models::{ModerationCommand, ModerationRunResult, OutcomeError, RecordOutcome};
use super::policy::PolicyEvaluator;
use super::router::{route, RouteError};
use super::store::{RecordPage, RecordStore, StoreError};
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

/// Tuning knobs for one pipeline invocation. Injected explicitly so tests
/// can shrink timeouts and page caps.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sweep pages processed per invocation before handing back a
    /// continuation token instead of looping unbounded.
    pub max_pages_per_run: usize,
    /// Attempts per store/channel call, transient failures only.
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts.
    pub retry_base_delay: Duration,
    /// Upper bound on any single store read or publish.
    pub call_timeout: Duration,
    /// Overall time budget; once exceeded no new per-record work starts.
    pub run_deadline: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_pages_per_run: 10,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(100),
            call_timeout: Duration::from_secs(10),
            run_deadline: Duration::from_secs(60),
        }
    }
}

/// Mutable state threaded through one invocation.
struct RunState {
    outcomes: Vec<RecordOutcome>,
    continuation_token: Option<String>,
    sweep_error: Option<OutcomeError>,
    /// Idempotency keys already published this run; duplicates are
    /// suppressed (with a log line, never silently).
    published_keys: HashSet<String>,
    publish_attempts: usize,
    permanent_publish_failures: usize,
}

impl RunState {
    fn new() -> Self {
        Self {
            outcomes: Vec::new(),
            continuation_token: None,
            sweep_error: None,
            published_keys: HashSet::new(),
            publish_attempts: 0,
            permanent_publish_failures: 0,
        }
    }

    fn into_result(self) -> ModerationRunResult {
        // Degraded: every publish this run attempted failed permanently,
        // which points at a channel/permission misconfiguration rather than
        // bad luck with individual records.
        let degraded =
            self.publish_attempts > 0 && self.permanent_publish_failures == self.publish_attempts;
        ModerationRunResult {
            outcomes: self.outcomes,
            continuation_token: self.continuation_token,
            sweep_error: self.sweep_error,
            degraded,
        }
    }
}

/// Ties the router, store, evaluator, and dispatcher together. Stateless
/// across invocations; concurrent invocations share nothing in-process.
pub struct ModerationService<S: RecordStore, D: AlertDispatcher> {
    store: S,
    dispatcher: D,
    policy: PolicyEvaluator,
    config: PipelineConfig,
}

impl<S: RecordStore, D: AlertDispatcher> ModerationService<S, D> {
    pub fn new(store: S, dispatcher: D, policy: PolicyEvaluator, config: PipelineConfig) -> Self {
        Self {
            store,
            dispatcher,
            policy,
            config,
        }
    }

    /// Process one raw trigger to completion.
    ///
    /// Only a malformed top-level trigger is rejected outright; every other
    /// failure lands as a per-record entry in the run result.
    pub async fn handle(
        &self,
        trigger: &serde_json::Value,
    ) -> Result<ModerationRunResult, RouteError> {
        let commands = route(trigger)?;
        let started = Instant::now();
        let mut state = RunState::new();

        for command in commands {
            match command {
                ModerationCommand::SingleEvent { record_id }
                | ModerationCommand::SingleLookup { record_id } => {
                    if started.elapsed() >= self.config.run_deadline {
                        tracing::warn!(
                            processed = state.outcomes.len(),
                            "run deadline exceeded, returning partial result"
                        );
                        break;
                    }
                    self.process_record(&record_id, &mut state).await;
                }
                // The sweep enforces the deadline itself so it can hand the
                // current continuation token back to the caller.
                ModerationCommand::BulkSweep { continuation_token } => {
                    self.run_sweep(continuation_token, started, &mut state).await;
                }
            }
        }

        let result = state.into_result();
        tracing::info!(
            processed = result.outcomes.len(),
            alerts = result.alert_count(),
            failures = result.failure_count(),
            degraded = result.degraded,
            "moderation run finished"
        );
        Ok(result)
    }

    /// Resolve, evaluate, and (when flagged) alert for one record. Appends
    /// exactly one outcome to the run state.
    async fn process_record(&self, record_id: &str, state: &mut RunState) {
        let record = match self.get_record_with_retry(record_id).await {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(record_id, error = %err, "failed to resolve record");
                state
                    .outcomes
                    .push(RecordOutcome::failed(record_id, None, store_error_kind(&err)));
                return;
            }
        };

        let verdict = self.policy.evaluate(&record.id, &record.content);
        tracing::debug!(
            record_id = %record.id,
            owner = %record.owner,
            verdict = %verdict.verdict,
            severity = verdict.severity,
            "record evaluated"
        );

        if !verdict.requires_alert() {
            state
                .outcomes
                .push(RecordOutcome::evaluated(&record.id, verdict.verdict, false));
            return;
        }

        let alert = build_alert(&verdict);
        if state.published_keys.contains(&alert.idempotency_key) {
            tracing::info!(
                record_id = %record.id,
                idempotency_key = %alert.idempotency_key,
                "alert already published in this run, suppressing duplicate"
            );
            state
                .outcomes
                .push(RecordOutcome::evaluated(&record.id, verdict.verdict, true));
            return;
        }

        state.publish_attempts += 1;
        match self.publish_with_retry(&alert).await {
            Ok(()) => {
                // Recorded only on success: a failed publish must not make a
                // later duplicate of the same record look already-alerted.
                state.published_keys.insert(alert.idempotency_key.clone());
                tracing::info!(
                    record_id = %record.id,
                    verdict = %verdict.verdict,
                    severity = verdict.severity,
                    "alert published"
                );
                state
                    .outcomes
                    .push(RecordOutcome::evaluated(&record.id, verdict.verdict, true));
            }
            Err(err) => {
                tracing::error!(record_id = %record.id, error = %err, "alert dispatch failed");
                let kind = match err {
                    DispatchError::Transient(_) => OutcomeError::DispatchTransient,
                    DispatchError::Permanent(_) => {
                        state.permanent_publish_failures += 1;
                        OutcomeError::DispatchPermanent
                    }
                };
                state
                    .outcomes
                    .push(RecordOutcome::failed(&record.id, Some(verdict.verdict), kind));
            }
        }
    }

    /// Page through the whole collection, re-resolving each scanned record
    /// by id before evaluation. Scan pages can be stale mid-sweep; a record
    /// deleted between scan and resolution surfaces as a per-record
    /// NotFound rather than aborting the sweep.
    async fn run_sweep(
        &self,
        mut token: Option<String>,
        started: Instant,
        state: &mut RunState,
    ) {
        let mut pages = 0usize;

        loop {
            if pages >= self.config.max_pages_per_run {
                tracing::info!(pages, "sweep page cap reached, handing back continuation token");
                state.continuation_token = token;
                return;
            }
            if started.elapsed() >= self.config.run_deadline {
                tracing::warn!(pages, "run deadline exceeded mid-sweep, returning partial result");
                state.continuation_token = token;
                return;
            }

            let page = match self.scan_with_retry(token.as_deref()).await {
                Ok(page) => page,
                Err(err) => {
                    // A page-level failure has no record to pin it on, so
                    // it is surfaced at run level; stop the sweep and hand
                    // back the token so a later invocation resumes from the
                    // same spot.
                    tracing::error!(pages, error = %err, "sweep page fetch failed");
                    state.sweep_error = Some(store_error_kind(&err));
                    state.continuation_token = token;
                    return;
                }
            };
            pages += 1;

            for record in &page.records {
                if started.elapsed() >= self.config.run_deadline {
                    // Resuming from the current page token repeats some of
                    // this page; idempotency keys keep that harmless.
                    tracing::warn!(pages, "run deadline exceeded mid-page");
                    state.continuation_token = token;
                    return;
                }
                self.process_record(&record.id, state).await;
            }

            match page.next_token {
                Some(next) => token = Some(next),
                None => return,
            }
        }
    }

    async fn get_record_with_retry(
        &self,
        record_id: &str,
    ) -> Result<super::models::ContentRecord, StoreError> {
        let mut attempt = 1;
        loop {
            let outcome = match timeout(self.config.call_timeout, self.store.get_by_id(record_id))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(StoreError::Unavailable("store call timed out".to_string())),
            };

            match outcome {
                Err(StoreError::Unavailable(msg)) if attempt < self.config.max_attempts => {
                    tracing::debug!(record_id, attempt, error = %msg, "retrying store read");
                    sleep(self.backoff_delay(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn scan_with_retry(&self, token: Option<&str>) -> Result<RecordPage, StoreError> {
        let mut attempt = 1;
        loop {
            let outcome = match timeout(self.config.call_timeout, self.store.scan_all(token)).await
            {
                Ok(result) => result,
                Err(_) => Err(StoreError::Unavailable("store scan timed out".to_string())),
            };

            match outcome {
                Err(StoreError::Unavailable(msg)) if attempt < self.config.max_attempts => {
                    tracing::debug!(attempt, error = %msg, "retrying store scan");
                    sleep(self.backoff_delay(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Retries reuse the same alert (and therefore the same idempotency
    /// key), so a downstream deduplicating subscriber can collapse any
    /// duplicates a retry produces.
    async fn publish_with_retry(
        &self,
        alert: &super::models::AlertMessage,
    ) -> Result<(), DispatchError> {
        let mut attempt = 1;
        loop {
            let outcome = match timeout(self.config.call_timeout, self.dispatcher.publish(alert))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(DispatchError::Transient(
                    "publish call timed out".to_string(),
                )),
            };

            match outcome {
                Err(DispatchError::Transient(msg)) if attempt < self.config.max_attempts => {
                    tracing::debug!(
                        record_id = %alert.record_id,
                        attempt,
                        error = %msg,
                        "retrying alert publish"
                    );
                    sleep(self.backoff_delay(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Exponential backoff with jitter so concurrent invocations don't
    /// hammer a struggling store in lockstep.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self
            .config
            .retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt - 1));
        let jitter_cap = (base.as_millis() as u64 / 2).max(1);
        let jitter = rand::thread_rng().gen_range(0..=jitter_cap);
        base + Duration::from_millis(jitter)
    }
}

fn store_error_kind(err: &StoreError) -> OutcomeError {
    match err {
        StoreError::NotFound => OutcomeError::NotFound,
        StoreError::Unavailable(_) => OutcomeError::StoreUnavailable,
        StoreError::InvalidQuery(_) => OutcomeError::InvalidQuery,
    }
}

// ============================================================================
// TESTS
// ============================================================================
