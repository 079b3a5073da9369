//! Forensic body-file listing parser.
//!
//! Disk-image jobs take their fingerprints from the forensic listing instead
//! of walking the extracted tree, because the listing preserves the original
//! filesystem timestamps. The format is the pipe-delimited body file the
//! listing tool emits with `-m`:
//!
//! ```text
//! md5|name|inode|mode|uid|gid|size|atime|mtime|ctime|crtime
//! ```
//!
//! Times are Unix epoch seconds; zero means the filesystem did not record
//! that time.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};

use super::FileFingerprint;

const BODY_FIELDS: usize = 11;

/// Parse a body-file listing into fingerprints.
///
/// Directories, symlinks, deleted entries, and filesystem-virtual entries
/// (`$MBR`, `$OrphanFiles`, ...) are filtered out; the listing's own digest
/// field is carried as the checksum rather than recomputed. Lines that do not
/// parse are skipped with a warning.
pub fn parse_body_file(path: &Path) -> Result<Vec<FileFingerprint>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read listing: {}", path.display()))?;

    let mut fingerprints = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(Some(fingerprint)) => fingerprints.push(fingerprint),
            Ok(None) => {} // filtered entry
            Err(e) => tracing::warn!(
                "Skipping unparseable listing line {} in {}: {e}",
                index + 1,
                path.display()
            ),
        }
    }

    Ok(fingerprints)
}

fn parse_line(line: &str) -> Result<Option<FileFingerprint>> {
    let fields: Vec<&str> = line.split('|').collect();
    let &[digest, name, _inode, mode, _uid, _gid, size, atime, mtime, ctime, crtime] =
        fields.as_slice()
    else {
        anyhow::bail!("expected {BODY_FIELDS} fields, found {}", fields.len());
    };

    if !is_regular_file(mode) || is_virtual(name) || is_deleted(name) {
        return Ok(None);
    }

    let size: u64 = size
        .trim()
        .parse()
        .with_context(|| format!("bad size field: {size}"))?;

    let accessed = epoch_time(atime);
    let mtime = epoch_time(mtime);
    let ctime = epoch_time(ctime);
    let created = epoch_time(crtime);

    // Best available stand-in when the modify time itself is unrecorded;
    // fully unknown times land on the epoch, which dating treats as undated.
    let modified = mtime
        .or(created)
        .or(ctime)
        .or(accessed)
        .unwrap_or(DateTime::UNIX_EPOCH);

    Ok(Some(FileFingerprint {
        path: PathBuf::from(name.trim_start_matches('/')),
        size,
        modified,
        created,
        accessed,
        sha256: digest.trim().to_lowercase(),
    }))
}

fn is_regular_file(mode: &str) -> bool {
    mode.starts_with('r') || mode.starts_with("-/r")
}

fn is_virtual(name: &str) -> bool {
    Path::new(name)
        .file_name()
        .and_then(|base| base.to_str())
        .is_some_and(|base| base.starts_with('$'))
}

fn is_deleted(name: &str) -> bool {
    name.ends_with("(deleted)") || name.ends_with("(deleted-realloc)")
}

fn epoch_time(field: &str) -> Option<DateTime<Utc>> {
    let seconds: i64 = field.trim().parse().ok()?;
    if seconds <= 0 {
        return None;
    }
    DateTime::from_timestamp(seconds, 0)
}
