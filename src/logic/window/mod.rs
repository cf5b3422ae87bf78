//! Session Windowing
//!
//! Turns an id-ordered stream of unlinked records into closed sessions.
//!
//! A session for `(host, agent group)` closes when:
//! - a record for the same key arrives more than one inactivity window
//!   after the previous one (timeout split)
//! - the last timestamp of a batch is a full window past its last record
//!   (batch boundary)
//! - a one-shot run finds the source dry (end of stream)
//! - a watch tick finds the source dry and the session has been idle for a
//!   full window by the wall clock
//!
//! The batch-boundary rule relies on records being consumed in
//! non-decreasing id order within a run.

pub mod accumulator;
mod state;


pub use accumulator::*;
pub use state::WindowState;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::classifier::{heuristic_label, Classifier, ClassifyOutcome};
use super::guard::{GuardPolicy, GUARD_CLASSIFICATION};
use super::run_loop::RunReport;
use super::store::{commit_session, SessionStore};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Confidence, RawRecord, Session, SessionLabel};

/// Where a committed label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictSource {
    Guard,
    Classifier,
    Heuristic,
}

/// What happened to one closed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Committed(VerdictSource),
    /// Classifier temporarily unavailable; nothing written
    Deferred,
    /// Store rejected the write; nothing written
    Failed,
}

#[derive(Debug)]
struct Verdict {
    label: SessionLabel,
    confidence: Option<Confidence>,
    classifier_raw: Option<String>,
    classification: Option<String>,
    source: VerdictSource,
}

pub struct SessionWindower {
    inactivity: Duration,
    guard: GuardPolicy,
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn SessionStore>,
}

impl SessionWindower {
    pub fn new(
        inactivity: Duration,
        guard: GuardPolicy,
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            inactivity,
            guard,
            classifier,
            store,
        }
    }

    /// Merge one batch into `state`, then close sessions idle at the batch boundary.
    pub async fn process_batch(
        &self,
        state: &mut WindowState,
        batch: &[RawRecord],
        report: &mut RunReport,
    ) -> PipelineResult<()> {
        // Timestamp of the last parseable record
        let mut boundary: Option<DateTime<Utc>> = None;

        for record in batch {
            report.processed += 1;

            let Some(at) = record.parsed_timestamp() else {
                report.skipped += 1;
                tracing::warn!(
                    record_id = record.id,
                    timestamp = %record.timestamp,
                    "Skipping record with unparseable timestamp"
                );
                continue;
            };
            boundary = Some(at);

            let key = SessionKey::for_record(record);
            if let Some(expired) = state.split_if_expired(&key, at, self.inactivity) {
                self.flush(expired, report).await?;
            }
            state.entry(key, record, at).merge(record, at);
        }

        match boundary {
            Some(now) => self.flush_idle(state, now, report).await,
            None => Ok(()),
        }
    }

    /// Close the sessions that have been idle for a full window at `now`.
    pub async fn flush_idle(
        &self,
        state: &mut WindowState,
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) -> PipelineResult<()> {
        for acc in state.drain_idle(now, self.inactivity) {
            self.flush(acc, report).await?;
        }
        Ok(())
    }

    /// Close every open session unconditionally.
    pub async fn flush_all(&self, state: &mut WindowState, report: &mut RunReport) -> PipelineResult<()> {
        for acc in state.drain_all() {
            self.flush(acc, report).await?;
        }
        Ok(())
    }

    /// Label one closed session and commit it with its records.
    ///
    /// Only a fatal store error is returned; every other failure leaves the
    /// records unlinked for the next run and reports how the flush ended.
    pub async fn flush(&self, acc: Accumulator, report: &mut RunReport) -> PipelineResult<FlushOutcome> {
        let session_id = acc.session_id();

        let Some(verdict) = self.resolve(&acc, &session_id, report).await else {
            report.deferred += 1;
            return Ok(FlushOutcome::Deferred);
        };

        let source = verdict.source;
        let session = Session {
            session_id,
            ip_address: acc.key.remote_host.clone(),
            user_agent: acc.user_agent.clone(),
            start_time: acc.start,
            end_time: acc.end,
            label: verdict.label,
            confidence: verdict.confidence,
            classifier_raw: verdict.classifier_raw,
            classification: verdict.classification,
        };

        match commit_session(self.store.as_ref(), &session, &acc.record_ids).await {
            Ok(_) => {
                report.committed += 1;
                tracing::debug!(
                    session_id = %session.session_id,
                    label = %session.label,
                    records = acc.record_ids.len(),
                    source = ?source,
                    "Session committed"
                );
                Ok(FlushOutcome::Committed(source))
            }
            Err(err) if err.is_fatal() => Err(PipelineError::Store(err)),
            Err(err) => {
                report.failed += 1;
                tracing::error!(
                    session_id = %session.session_id,
                    records = acc.record_ids.len(),
                    error = %err,
                    "Session commit failed, records left unlinked"
                );
                Ok(FlushOutcome::Failed)
            }
        }
    }

    /// Guard first, then the classifier. `None` defers the session.
    async fn resolve(&self, acc: &Accumulator, session_id: &str, report: &mut RunReport) -> Option<Verdict> {
        if let Some(guard) = self.guard.decide(acc) {
            report.guard_verdicts += 1;
            let classifier_raw = serde_json::to_value(acc.summary())
                .map(|summary| serde_json::json!({ "guard": summary }).to_string())
                .ok();

            return Some(Verdict {
                label: guard.label,
                confidence: Some(guard.confidence),
                classifier_raw,
                classification: Some(GUARD_CLASSIFICATION.to_string()),
                source: VerdictSource::Guard,
            });
        }

        report.classifier_calls += 1;
        match self.classifier.classify(&acc.preview).await {
            ClassifyOutcome::Success(result) => Some(Verdict {
                label: result.label,
                confidence: Some(result.confidence),
                classifier_raw: result.raw_response,
                classification: result.classification,
                source: VerdictSource::Classifier,
            }),
            ClassifyOutcome::Retryable(failure) => {
                tracing::warn!(
                    session_id,
                    records = acc.record_ids.len(),
                    error = %failure,
                    "Classifier unavailable, session deferred to next run"
                );
                None
            }
            ClassifyOutcome::Permanent(failure) => {
                report.heuristic_fallbacks += 1;
                let label = heuristic_label(acc.heuristic_corpus());
                tracing::warn!(
                    session_id,
                    error = %failure,
                    label = %label,
                    "Classifier rejected session, using local heuristic"
                );
                Some(Verdict {
                    label,
                    confidence: Some(Confidence::Low),
                    classifier_raw: None,
                    classification: None,
                    source: VerdictSource::Heuristic,
                })
            }
        }
    }
}
