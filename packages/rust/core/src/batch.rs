//! Batch path: object → decode → validate → enrich → persist, one row at a time.
//!
//! A batch moves through `Start → Decoding → Processing → Aggregating →
//! Notifying → Done`. Only a source that cannot be read or decoded sends it to
//! `Failed`; row rejections and per-row store failures are counted and the
//! batch carries on with the next row.

use std::sync::Arc;
use std::time::Instant;

use rowpipe_gateways::{Notifier, ObjectSource};
use rowpipe_shared::{
    BatchOutcome, CanonicalRecord, Locator, Result, RowError, RowpipeError, Source,
};
use rowpipe_storage::StoreGateway;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, instrument, warn};

use crate::decoder::{self, DecodedRow};
use crate::enricher::Enricher;
use crate::outcome;
use crate::validator;

/// Batch lifecycle phases, reported to a [`ProgressReporter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Start,
    Decoding,
    Processing,
    Aggregating,
    Notifying,
    Done,
    Failed,
}

impl BatchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Decoding => "decoding",
            Self::Processing => "processing",
            Self::Aggregating => "aggregating",
            Self::Notifying => "notifying",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// What happened to one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Persisted,
    Rejected,
    Failed,
}

/// Progress callback for reporting batch status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, phase: BatchPhase);
    /// Called after each row has been attempted.
    fn row_processed(&self, row: usize, status: RowStatus);
    /// Called when the batch completes.
    fn done(&self, outcome: &BatchOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _phase: BatchPhase) {}
    fn row_processed(&self, _row: usize, _status: RowStatus) {}
    fn done(&self, _outcome: &BatchOutcome) {}
}

/// Running counters for one batch.
#[derive(Debug, Default)]
struct Tally {
    total: usize,
    succeeded: usize,
    rejected: usize,
    failed: usize,
    errors: Vec<RowError>,
}

impl Tally {
    fn record_error(&mut self, row: &DecodedRow, err: &RowpipeError) -> RowStatus {
        let (status, kind) = match err {
            RowpipeError::RowRejected { reason, .. } => {
                self.rejected += 1;
                (RowStatus::Rejected, reason.as_str())
            }
            other => {
                self.failed += 1;
                (RowStatus::Failed, other.kind())
            }
        };
        let message = match err {
            RowpipeError::RowRejected { message, .. } => message.clone(),
            other => other.to_string(),
        };
        self.errors.push(RowError {
            row: row.row,
            line: row.line,
            kind: kind.to_string(),
            message,
        });
        status
    }

    fn into_outcome(self, batch_id: String, digest: String, started: Instant) -> BatchOutcome {
        let success_rate = if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        };
        BatchOutcome {
            batch_id,
            digest,
            total: self.total,
            succeeded: self.succeeded,
            rejected: self.rejected,
            failed: self.failed,
            success_rate,
            elapsed_ms: started.elapsed().as_millis() as u64,
            errors: self.errors,
        }
    }
}

/// Drives one batch per [`BatchIngestor::run`] call.
pub struct BatchIngestor {
    source: Arc<dyn ObjectSource>,
    store: Arc<dyn StoreGateway>,
    notifier: Arc<dyn Notifier>,
    enricher: Arc<Enricher>,
    delimiter: char,
}

impl BatchIngestor {
    pub fn new(
        source: Arc<dyn ObjectSource>,
        store: Arc<dyn StoreGateway>,
        notifier: Arc<dyn Notifier>,
        enricher: Arc<Enricher>,
        delimiter: char,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            enricher,
            delimiter,
        }
    }

    /// Process every row of the object at `locator`.
    ///
    /// Returns `Err` only when the source could not be read or decoded. Row-level
    /// problems are reported through the returned [`BatchOutcome`].
    #[instrument(skip_all, fields(batch = %locator))]
    pub async fn run(
        &self,
        locator: &Locator,
        progress: &dyn ProgressReporter,
    ) -> Result<BatchOutcome> {
        let started = Instant::now();
        progress.phase(BatchPhase::Start);
        info!("starting batch");

        let bytes = match self.source.read(locator).await {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.fail(locator, e, progress).await),
        };

        progress.phase(BatchPhase::Decoding);
        let text = match decoder::decode_utf8(&bytes) {
            Ok(text) => text,
            Err(e) => {
                let err = RowpipeError::source_unavailable(locator, format!("not valid UTF-8: {e}"));
                return Err(self.fail(locator, err, progress).await);
            }
        };
        let digest = format!("{:x}", Sha256::digest(&bytes));
        debug!(bytes = bytes.len(), %digest, "source decoded");

        progress.phase(BatchPhase::Processing);
        let source = Source::File(locator.key.clone());
        let mut tally = Tally::default();

        for row in decoder::decode(text, self.delimiter) {
            tally.total += 1;
            let status = match self.process_row(&row, &source).await {
                Ok(record) => {
                    tally.succeeded += 1;
                    debug!(row = row.row, id = %record.id, timestamp = record.timestamp, "row persisted");
                    RowStatus::Persisted
                }
                Err(e) => {
                    let status = tally.record_error(&row, &e);
                    match status {
                        RowStatus::Rejected => {
                            warn!(row = row.row, line = row.line, error = %e, "row rejected")
                        }
                        _ => error!(row = row.row, line = row.line, error = %e, "row failed to persist"),
                    }
                    status
                }
            };
            progress.row_processed(row.row, status);
        }

        progress.phase(BatchPhase::Aggregating);
        let outcome = tally.into_outcome(locator.to_string(), digest, started);

        progress.phase(BatchPhase::Notifying);
        outcome::publish_best_effort(
            self.notifier.as_ref(),
            &outcome::batch_completed(locator, &outcome),
        )
        .await;

        progress.phase(BatchPhase::Done);
        progress.done(&outcome);

        info!(
            total = outcome.total,
            succeeded = outcome.succeeded,
            rejected = outcome.rejected,
            failed = outcome.failed,
            elapsed_ms = outcome.elapsed_ms,
            "batch complete"
        );

        Ok(outcome)
    }

    /// Validate, enrich and persist one row.
    async fn process_row(&self, row: &DecodedRow, source: &Source) -> Result<CanonicalRecord> {
        let accepted = validator::validate_row(&row.fields)?;
        let record = self.enricher.enrich(accepted, source.clone());
        self.store.put(&record).await.map_err(|e| match e {
            RowpipeError::PersistenceFailed(_) => e,
            other => RowpipeError::PersistenceFailed(other.to_string()),
        })?;
        Ok(record)
    }

    /// Enter `Failed`: log, send a best-effort failure notice, hand back the error.
    async fn fail(
        &self,
        locator: &Locator,
        err: RowpipeError,
        progress: &dyn ProgressReporter,
    ) -> RowpipeError {
        progress.phase(BatchPhase::Failed);
        error!(kind = err.kind(), error = %err, "batch failed before processing rows");
        outcome::publish_best_effort(self.notifier.as_ref(), &outcome::batch_failed(locator, &err))
            .await;
        err
    }
}
