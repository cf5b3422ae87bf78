//! Run Loop
//!
//! Drives batch fetch → windower → store until the source runs dry, and
//! optionally repeats on a fixed interval (watch mode).

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::store::RecordSource;
use super::window::{SessionWindower, WindowState};
use crate::error::{PipelineError, PipelineResult};

/// Counters of one sessionizing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub batches: u64,
    pub processed: u64,
    /// Records dropped for an unparseable timestamp
    pub skipped: u64,
    pub committed: u64,
    pub deferred: u64,
    pub failed: u64,
    pub guard_verdicts: u64,
    pub classifier_calls: u64,
    pub heuristic_fallbacks: u64,
    /// Sessions left open for the next watch tick
    pub open: u64,
    pub last_id: i64,
}

impl RunReport {
    /// Sessions closed so far, whatever happened to them.
    pub fn flushed(&self) -> u64 {
        self.committed + self.deferred + self.failed
    }
}

/// What the status endpoint sees of the worker.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStatus {
    pub runs: u64,
    pub last_report: Option<RunReport>,
    pub last_error: Option<String>,
}

impl RunStatus {
    pub fn record(&mut self, result: &PipelineResult<RunReport>) {
        self.runs += 1;
        match result {
            Ok(report) => {
                self.last_report = Some(report.clone());
                self.last_error = None;
            }
            Err(err) => self.last_error = Some(err.to_string()),
        }
    }
}

pub type SharedStatus = Arc<RwLock<RunStatus>>;

pub struct Sessionizer {
    source: Arc<dyn RecordSource>,
    windower: SessionWindower,
    batch_size: i64,
}

/// What a run does with the sessions still open once the source is dry.
#[derive(Debug, Clone, Copy)]
enum Closing {
    EndOfStream,
    IdleAt(DateTime<Utc>),
}

impl Sessionizer {
    pub fn new(source: Arc<dyn RecordSource>, windower: SessionWindower, batch_size: i64) -> Self {
        Self {
            source,
            windower,
            batch_size: batch_size.max(1),
        }
    }

    /// Sessionize every record that is unlinked when the run starts, then
    /// close whatever is still open.
    ///
    /// A deferred or failed session is not retried within the run; the
    /// cursor has moved past its records and the next run picks them up.
    pub async fn run_once(&self) -> PipelineResult<RunReport> {
        self.run(Closing::EndOfStream).await
    }

    /// One watch-mode pass at wall-clock time `now`.
    ///
    /// Only sessions idle for a full window at `now` are closed. The others
    /// stay open with their records unlinked, so the next tick rebuilds them
    /// from their first record with the same start and session id.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> PipelineResult<RunReport> {
        self.run(Closing::IdleAt(now)).await
    }

    async fn run(&self, closing: Closing) -> PipelineResult<RunReport> {
        let mut report = RunReport {
            started_at: Some(Utc::now()),
            ..Default::default()
        };
        let mut state = WindowState::new();
        let mut last_id = 0;

        tracing::debug!(batch_size = self.batch_size, ?closing, "Sessionizing run started");

        loop {
            let batch = self
                .source
                .fetch_unlinked(last_id, self.batch_size)
                .await
                .map_err(PipelineError::Source)?;

            let Some(last) = batch.last() else {
                break;
            };
            last_id = last.id;
            report.batches += 1;
            report.last_id = last_id;

            let flushed_before = report.flushed();
            self.windower.process_batch(&mut state, &batch, &mut report).await?;

            tracing::info!(
                batch = report.batches,
                processed = report.processed,
                last_id,
                active = state.len(),
                flushed = report.flushed() - flushed_before,
                "Batch processed"
            );
        }

        match closing {
            Closing::EndOfStream => self.windower.flush_all(&mut state, &mut report).await?,
            Closing::IdleAt(now) => self.windower.flush_idle(&mut state, now, &mut report).await?,
        }
        report.open = state.len() as u64;
        report.finished_at = Some(Utc::now());

        tracing::info!(
            batches = report.batches,
            processed = report.processed,
            committed = report.committed,
            deferred = report.deferred,
            failed = report.failed,
            open = report.open,
            skipped = report.skipped,
            guard = report.guard_verdicts,
            classifier = report.classifier_calls,
            heuristic = report.heuristic_fallbacks,
            "Sessionizing run finished"
        );

        Ok(report)
    }
}

/// Run [`Sessionizer::run_tick`] every `interval` until `shutdown` resolves.
///
/// A failed tick is logged and recorded; the loop carries on. Sessions open
/// at shutdown are left unlinked and rebuilt on the next start.
pub async fn run_forever<F>(
    sessionizer: &Sessionizer,
    interval: Duration,
    status: SharedStatus,
    shutdown: F,
) where
    F: std::future::Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let result = tokio::select! {
            result = sessionizer.run_tick(Utc::now()) => result,
            _ = &mut shutdown => break,
        };

        if let Err(err) = &result {
            tracing::error!(error = %err, "Sessionizing run failed");
        }
        status.write().record(&result);

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = &mut shutdown => break,
        }
    }

    tracing::info!("Sessionizer stopped");
}
