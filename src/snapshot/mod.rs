//! Snapshot persistence.
//!
//! A snapshot is the JSON body REDCap returned for one subject in one
//! project, stored verbatim on disk. This module owns how those files are
//! written:
//!
//! - **Atomic writes**: temp file + fsync + rename, so readers never observe
//!   a half-written snapshot
//! - **Hashing**: SHA256 comparison decides whether a re-download changed
//!   anything
//! - **Backups**: a changed snapshot's previous version is copied to
//!   `.backup/` before the new one lands, so the snapshot path never goes
//!   missing

mod file;
mod hash;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;

pub use file::{atomic_write, backup, list_backups, touch, BACKUP_DIR};
pub use hash::{checksum, checksum_file};

/// What happened when a downloaded record was handed to [`write_snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
    /// No snapshot existed; one was created.
    Created,
    /// The snapshot changed; the old version was copied to `backup`.
    Updated { backup: PathBuf },
    /// The snapshot already held identical bytes. Its mtime is refreshed so
    /// the trigger entry that prompted the download no longer marks it stale.
    Unchanged,
    /// Dry run: nothing was written.
    DryRun,
}

/// Persist a downloaded record.
///
/// Missing destination: atomic write. Existing destination: compare
/// checksums; identical content only has its mtime refreshed, different
/// content is backed up and then atomically replaced.
///
/// # Errors
///
/// Returns an error if reading, backing up, or writing the snapshot fails.
pub fn write_snapshot(dst: &Path, content: &[u8], dry_run: bool) -> Result<WriteOutcome> {
    if dry_run {
        debug!(dst = %dst.display(), "dry run, not saving");
        return Ok(WriteOutcome::DryRun);
    }

    if !dst.exists() {
        debug!(dst = %dst.display(), "saving");
        atomic_write(dst, content)?;
        return Ok(WriteOutcome::Created);
    }

    // Responses are not stored atomically in REDCap, so a re-download can
    // legitimately differ from what we hold.
    let src_sum = checksum(content);
    let dst_sum = checksum_file(dst)?;
    if src_sum == dst_sum {
        debug!(dst = %dst.display(), "unchanged");
        touch(dst)?;
        return Ok(WriteOutcome::Unchanged);
    }

    warn!(dst = %dst.display(), "file has changed");
    let backup = backup(dst)?;
    info!(dst = %dst.display(), backup = %backup.display(), "saving");
    atomic_write(dst, content)?;
    Ok(WriteOutcome::Updated { backup })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    #[test]
    fn test_write_creates_missing_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let dst = temp_dir.path().join("surveys").join("S1.intake.json");

        let outcome = write_snapshot(&dst, b"[{\"a\":1}]", false).unwrap();

        assert_eq!(outcome, WriteOutcome::Created);
        assert_eq!(fs::read(&dst).unwrap(), b"[{\"a\":1}]");
        assert!(list_backups(&dst).unwrap().is_empty());
    }

    #[test]
    fn test_identical_content_twice_makes_no_backup() {
        let temp_dir = TempDir::new().unwrap();
        let dst = temp_dir.path().join("S1.intake.json");

        write_snapshot(&dst, b"[{\"a\":1}]", false).unwrap();
        let outcome = write_snapshot(&dst, b"[{\"a\":1}]", false).unwrap();

        assert_eq!(outcome, WriteOutcome::Unchanged);
        assert_eq!(fs::read(&dst).unwrap(), b"[{\"a\":1}]");
        assert!(list_backups(&dst).unwrap().is_empty());
        assert!(!temp_dir.path().join(BACKUP_DIR).exists());
    }

    #[test]
    fn test_unchanged_snapshot_mtime_is_refreshed() {
        let temp_dir = TempDir::new().unwrap();
        let dst = temp_dir.path().join("S1.intake.json");
        fs::write(&dst, b"[{\"a\":1}]").unwrap();
        let old = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        fs::File::options()
            .write(true)
            .open(&dst)
            .unwrap()
            .set_modified(old)
            .unwrap();

        let outcome = write_snapshot(&dst, b"[{\"a\":1}]", false).unwrap();

        assert_eq!(outcome, WriteOutcome::Unchanged);
        assert!(fs::metadata(&dst).unwrap().modified().unwrap() > old);
    }

    #[test]
    fn test_failed_replace_keeps_previous_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let dst = temp_dir.path().join("S1.intake.json");
        fs::write(&dst, b"[{\"a\":1}]").unwrap();
        // A plain file where the backup directory belongs makes the backup fail
        fs::write(temp_dir.path().join(BACKUP_DIR), b"").unwrap();

        assert!(write_snapshot(&dst, b"[{\"a\":2}]", false).is_err());
        assert_eq!(fs::read(&dst).unwrap(), b"[{\"a\":1}]");
    }

    #[test]
    fn test_different_content_backs_up_exactly_once() {
        let temp_dir = TempDir::new().unwrap();
        let dst = temp_dir.path().join("S1.intake.json");

        write_snapshot(&dst, b"[{\"a\":1}]", false).unwrap();
        let outcome = write_snapshot(&dst, b"[{\"a\":2}]", false).unwrap();

        let WriteOutcome::Updated { backup } = outcome else {
            panic!("expected Updated, got {outcome:?}");
        };
        assert_eq!(fs::read(&backup).unwrap(), b"[{\"a\":1}]");
        assert_eq!(fs::read(&dst).unwrap(), b"[{\"a\":2}]");
        assert_eq!(list_backups(&dst).unwrap(), vec![backup]);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let dst = temp_dir.path().join("S1.intake.json");

        let outcome = write_snapshot(&dst, b"[{\"a\":1}]", true).unwrap();

        assert_eq!(outcome, WriteOutcome::DryRun);
        assert!(!dst.exists());
    }
}
