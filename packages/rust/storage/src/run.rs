//! Per-run state isolation.
//!
//! Each invocation starts from a clean slate: a database or log file left by
//! a previous run is renamed with a timestamp stamp, never overwritten, and
//! the run opens fresh files. [`RunContext`] performs the archival once at
//! startup and hands the resulting paths to the rest of the program.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use refsync_shared::{RefsyncError, Result};

/// Database file name within the data directory.
pub const DB_FILE_NAME: &str = "records.db";
/// Run log file name within the data directory.
pub const LOG_FILE_NAME: &str = "refsync.log";

/// Stamp appended to archived file names.
const ARCHIVE_STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Paths and start time for one run, constructed once at startup.
#[derive(Debug)]
pub struct RunContext {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub log_path: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    /// Archive any previous run's files and lay out paths for this run.
    pub fn prepare(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| RefsyncError::io(data_dir, e))?;

        let started_at = Utc::now();
        let stamp = started_at.format(ARCHIVE_STAMP_FORMAT).to_string();

        let db_path = data_dir.join(DB_FILE_NAME);
        let log_path = data_dir.join(LOG_FILE_NAME);

        archive_existing(&db_path, &stamp)?;
        archive_existing(&log_path, &stamp)?;

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            db_path,
            log_path,
            started_at,
        })
    }
}

/// Rename `path` to `<stem>-<stamp>.<ext>` if it exists.
fn archive_existing(path: &Path, stamp: &str) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("archive");
    let archived_name = match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("{stem}-{stamp}.{ext}"),
        None => format!("{stem}-{stamp}"),
    };
    let target = path.with_file_name(archived_name);

    std::fs::rename(path, &target).map_err(|e| RefsyncError::io(path, e))?;
    tracing::info!(from = %path.display(), to = %target.display(), "archived previous run file");
    Ok(())
}
