//! Content hashing for snapshot writes.
//!
//! REDCap does not hand out stable record revisions, so the only way to know
//! whether a freshly downloaded record differs from the one on disk is to
//! compare their bytes. SHA256 digests keep that comparison cheap to log.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Compute a SHA256 hex digest of raw bytes.
#[must_use]
pub fn checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Compute a SHA256 hex digest of a file's contents, streaming it from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn checksum_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(Error::at(path))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).map_err(Error::at(path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
