//! Atomic file operations for snapshots.
//!
//! This module provides safe file operations that prevent data corruption:
//! - Atomic writes: write to a temp file, sync to disk, then rename
//! - Backups: copy the previous snapshot aside before it is replaced
//! - Touch: mark an unchanged snapshot as freshly verified

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Utc;
use tracing::debug;

use crate::error::{Error, Result};

/// Directory (next to the snapshot) that holds superseded versions.
pub const BACKUP_DIR: &str = ".backup";

/// Write content to a file atomically.
///
/// This function:
/// 1. Writes content to a uniquely named temp file in the target directory
/// 2. Calls `fsync` to ensure data is on disk
/// 3. Atomically renames the temp file to the target path
///
/// Readers see either the old file or the complete new one. If any step
/// fails, the original file (if any) remains untouched and the temp file is
/// removed on a best-effort basis.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(Error::at(parent))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidArgument(format!("not a file path: {}", path.display())))?;
    let temp_path = parent.join(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        uuid::Uuid::new_v4().simple()
    ));

    let written = write_synced(&temp_path, content).and_then(|()| {
        fs::rename(&temp_path, path).map_err(Error::at(path))
    });
    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    written
}

fn write_synced(path: &Path, content: &[u8]) -> Result<()> {
    let file = File::create(path).map_err(Error::at(path))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(content).map_err(Error::at(path))?;
    writer.flush().map_err(Error::at(path))?;
    // Sync to disk before rename
    writer.get_ref().sync_all().map_err(Error::at(path))?;
    Ok(())
}

/// Copy an existing snapshot into the backup directory.
///
/// The backup lands in `<dir>/.backup/<file name>.<UTC timestamp>`. An
/// existing backup is never overwritten; a numeric suffix is appended when
/// two backups share a timestamp. The snapshot itself stays in place until
/// [`atomic_write`] replaces it.
///
/// # Errors
///
/// Returns an error if the backup directory cannot be created or the file
/// cannot be copied.
pub fn backup(path: &Path) -> Result<PathBuf> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidArgument(format!("not a file path: {}", path.display())))?
        .to_string_lossy()
        .into_owned();

    let backup_dir = parent.join(BACKUP_DIR);
    fs::create_dir_all(&backup_dir).map_err(Error::at(&backup_dir))?;

    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6f");
    let mut dst = backup_dir.join(format!("{file_name}.{stamp}"));
    let mut n = 1;
    while dst.exists() {
        dst = backup_dir.join(format!("{file_name}.{stamp}.{n}"));
        n += 1;
    }

    debug!(src = %path.display(), dst = %dst.display(), "backing up snapshot");
    fs::copy(path, &dst).map_err(Error::at(&dst))?;
    Ok(dst)
}

/// Set a file's modification time to now without touching its content.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or updated.
pub fn touch(path: &Path) -> Result<()> {
    let file = File::options()
        .write(true)
        .open(path)
        .map_err(Error::at(path))?;
    file.set_modified(SystemTime::now())
        .map_err(Error::at(path))
}

/// List the backups retained for a snapshot, oldest first.
///
/// # Errors
///
/// Returns an error if the backup directory exists but cannot be read.
pub fn list_backups(path: &Path) -> Result<Vec<PathBuf>> {
    let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Ok(Vec::new());
    };
    let backup_dir = path.parent().unwrap_or_else(|| Path::new(".")).join(BACKUP_DIR);
    if !backup_dir.is_dir() {
        return Ok(Vec::new());
    }

    let prefix = format!("{file_name}.");
    let mut backups = Vec::new();
    for entry in fs::read_dir(&backup_dir).map_err(Error::at(&backup_dir))? {
        let entry = entry.map_err(Error::at(&backup_dir))?;
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            backups.push(entry.path());
        }
    }
    backups.sort();
    Ok(backups)
}
