//! Data entry trigger log and snapshot staleness.
//!
//! REDCap can notify a listener every time a record is saved (a "data entry
//! trigger"). The listener appends one CSV row per event:
//!
//! ```text
//! record,timestamp,project_id,instrument
//! S1,1718031234.5,42,intake
//! ```
//!
//! Reading that log is far cheaper than re-downloading every record, so a
//! snapshot is only re-fetched when the log shows an update newer than the
//! snapshot's mtime.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct TriggerRow {
    record: String,
    timestamp: f64,
}

/// Latest trigger timestamp per record id, loaded once per sync run.
#[derive(Debug, Clone, Default)]
pub struct TriggerLog {
    latest: HashMap<String, f64>,
    clock_skew_secs: f64,
}

impl TriggerLog {
    /// A log with no entries: every existing snapshot is considered fresh.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the trigger CSV.
    ///
    /// No configured path, or a path that is not a file, yields an empty log.
    ///
    /// # Errors
    ///
    /// Returns a CSV error if the file exists but a row is malformed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path.filter(|p| p.is_file()) else {
            debug!("no data entry trigger log, treating every snapshot as current");
            return Ok(Self::empty());
        };
        let file = File::open(path).map_err(Error::at(path))?;
        let log = Self::from_reader(file)?;
        debug!(path = %path.display(), records = log.len(), "loaded data entry trigger log");
        Ok(log)
    }

    /// Parse trigger CSV from any reader. Columns other than `record` and
    /// `timestamp` are ignored.
    ///
    /// # Errors
    ///
    /// Returns a CSV error on a missing column or a non-numeric timestamp.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut log = Self::empty();
        for row in rdr.deserialize() {
            let row: TriggerRow = row?;
            log.record(row.record, row.timestamp);
        }
        Ok(log)
    }

    /// Build a log from `(record id, unix timestamp)` pairs.
    #[must_use]
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut log = Self::empty();
        for (record, ts) in entries {
            log.record(record.into(), ts);
        }
        log
    }

    /// Tolerate this many seconds of clock drift between the trigger
    /// listener and the local filesystem.
    #[must_use]
    pub fn with_clock_skew(mut self, secs: f64) -> Self {
        self.clock_skew_secs = secs.max(0.0);
        self
    }

    fn record(&mut self, record: String, ts: f64) {
        self.latest
            .entry(record)
            .and_modify(|t| *t = t.max(ts))
            .or_insert(ts);
    }

    /// Number of distinct record ids in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.latest.len()
    }

    /// Whether the log has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// Most recent trigger timestamp for a record id.
    #[must_use]
    pub fn latest_update(&self, record_id: &str) -> Option<f64> {
        self.latest.get(record_id).copied()
    }

    /// Whether the existing snapshot at `snapshot` is older than the
    /// record's latest update.
    ///
    /// A record absent from the log is never stale. Callers must not ask
    /// about a snapshot that does not exist; a missing snapshot is always
    /// fetched.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the snapshot's mtime cannot be read.
    pub fn check_if_modified(&self, record_id: &str, snapshot: &Path) -> Result<bool> {
        let local = mtime_secs(snapshot)?;
        let Some(remote) = self.latest_update(record_id) else {
            return Ok(false);
        };
        Ok(is_newer(remote, local - self.clock_skew_secs))
    }
}

/// Strict comparison: an update at exactly the snapshot's mtime is not newer.
#[must_use]
pub fn is_newer(remote: f64, local: f64) -> bool {
    remote > local
}

/// File modification time as fractional unix seconds.
///
/// # Errors
///
/// Returns an I/O error if the file's metadata cannot be read.
pub fn mtime_secs(path: &Path) -> Result<f64> {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(Error::at(path))?;
    Ok(match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    })
}

/// Set a file's modification time to `secs` after the epoch.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened or updated.
pub fn set_mtime_secs(path: &Path, secs: f64) -> Result<()> {
    let when = UNIX_EPOCH + std::time::Duration::from_secs_f64(secs.max(0.0));
    let file = fs::OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(Error::at(path))?;
    file.set_modified(when).map_err(Error::at(path))?;
    Ok(())
}

/// Unix seconds now, for callers that stamp their own trigger entries.
#[must_use]
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
