//! Core domain types for refsync knowledge-base records.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{RefsyncError, Result};

/// Timestamp format used by the bulk API (`2020-01-01 00:00:00`).
const WIRE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A knowledge-base record — the pipeline's unit of work.
///
/// Rows are created or overwritten wholesale by the sync gateway pull;
/// `text`/`hash`/`update_flg`/`error` are mutated by the pipeline; the
/// dirty flag is cleared only by an acknowledged push. Records are never
/// hard-deleted locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier, unique, immutable once created.
    pub id: i64,
    /// Human-readable title.
    pub title: String,
    /// Current normalized content. May be empty.
    pub text: String,
    /// Where fresh content originates: an absolute filesystem path, a bare
    /// URL, or `"<url>,<selector>"`. Empty means the record is never
    /// processed.
    pub reference: String,
    /// Owning group in the remote store.
    pub group_id: i64,
    /// Provenance, set at creation and not mutated by the pipeline.
    pub created_by: String,
    /// Creation timestamp from the remote store.
    pub created_at: DateTime<Utc>,
    /// Last-known-good timestamp, used as the staleness baseline.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker owned by the upstream store.
    pub deleted: bool,
    /// SHA-256 fingerprint of `text`.
    pub hash: String,
    /// Set when the pipeline produced new text not yet pushed upstream.
    pub update_flg: bool,
    /// Last outcome message: skip reason or failure diagnostic. A
    /// successful pass leaves the previous message in place.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Fingerprinting
// ---------------------------------------------------------------------------

/// Compute the SHA-256 fingerprint of text content.
///
/// Empty text maps to an empty fingerprint, matching what the remote store
/// sends for records that have never been converted.
pub fn fingerprint(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Parse a timestamp as sent by the bulk API, falling back to RFC 3339.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, WIRE_TIMESTAMP_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RefsyncError::parse(format!("invalid timestamp '{s}': {e}")))
}
