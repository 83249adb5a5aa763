//! Per-record processing pipeline.
//!
//! Walks every stored record through fetch → classify → convert → persist.
//! Each record reaches a terminal state independently: skip reasons and
//! failure diagnostics are written to the record's `error` field and
//! committed, and the batch always proceeds to the next record. A successful
//! pass writes text, fingerprint, and the dirty flag, leaving the previous
//! diagnostic untouched.

use tracing::{debug, info, instrument, warn};

use refsync_convert::Converter;
use refsync_fetcher::{FetchOutcome, Fetcher};
use refsync_shared::{Record, Result, fingerprint};
use refsync_storage::Storage;

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// Summary of one pipeline pass over the record table.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    /// Records examined (including empty-reference skips).
    pub processed: usize,
    /// Records whose text was refreshed.
    pub updated: usize,
    /// Records skipped: empty reference, up-to-date source, or unsupported
    /// remote content-type.
    pub skipped: usize,
    /// Records that hit a fetch, classification, or conversion failure.
    pub failed: usize,
}

/// Terminal state of one record within a pass.
enum Outcome {
    Updated,
    Skipped,
    Failed,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Sequential record processor. One record is fully fetched, classified,
/// converted, and persisted before the next begins.
pub struct Pipeline<'a> {
    storage: &'a Storage,
    fetcher: &'a Fetcher,
    converter: &'a Converter,
}

impl<'a> Pipeline<'a> {
    pub fn new(storage: &'a Storage, fetcher: &'a Fetcher, converter: &'a Converter) -> Self {
        Self {
            storage,
            fetcher,
            converter,
        }
    }

    /// Process every stored record, one at a time.
    ///
    /// The returned `Result` only reflects storage-handle faults; per-record
    /// failures are recorded in the summary and the records themselves.
    #[instrument(skip_all)]
    pub async fn process_records(&self) -> Result<RunSummary> {
        let records = self.storage.list_records().await?;
        info!(count = records.len(), "processing records");

        let mut summary = RunSummary::default();
        for record in records {
            summary.processed += 1;

            if record.reference.is_empty() {
                // No source to consult; the record keeps its last known state
                // and nothing is written.
                debug!(id = record.id, "empty reference, skipping");
                summary.skipped += 1;
                continue;
            }

            match self.process_one(&record).await? {
                Outcome::Updated => summary.updated += 1,
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Failed => summary.failed += 1,
            }
        }

        info!(
            processed = summary.processed,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            "record processing complete"
        );
        Ok(summary)
    }

    /// Drive a single record to a terminal state and persist the outcome.
    #[instrument(skip_all, fields(id = record.id, reference = %record.reference))]
    async fn process_one(&self, record: &Record) -> Result<Outcome> {
        let fetched = self
            .fetcher
            .fetch(&record.reference, &record.text, record.updated_at)
            .await;

        let (bytes, content_type) = match fetched {
            Ok(FetchOutcome::Skip { reason }) => {
                debug!(%reason, "fetch skipped");
                self.storage.set_outcome(record.id, &reason).await?;
                return Ok(Outcome::Skipped);
            }
            Ok(FetchOutcome::Payload {
                bytes,
                content_type,
            }) => (bytes, content_type),
            Err(e) => {
                warn!(error = %e, "fetch failed");
                self.storage.set_outcome(record.id, &e.to_string()).await?;
                return Ok(Outcome::Failed);
            }
        };

        match self.converter.convert(&bytes, content_type.as_deref()) {
            Ok(result) => {
                let hash = fingerprint(&result.text);
                self.storage
                    .set_converted(record.id, &result.text, &hash)
                    .await?;
                info!("record content updated");
                Ok(Outcome::Updated)
            }
            Err(failure) => {
                let detail = failure.detail();
                warn!(error = %detail, "conversion failed");
                self.storage.set_outcome(record.id, &detail).await?;
                Ok(Outcome::Failed)
            }
        }
    }
}
