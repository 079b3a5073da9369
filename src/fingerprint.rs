//! Per-file fingerprint index.
//!
//! A fingerprint is the identity record dedup and reporting work from:
//! relative path, size, timestamps, and a content digest. Fingerprints come
//! from one of two sources, a live walk of the designated output
//! ([`collect`]) or a forensic body-file listing for disk-image jobs
//! ([`from_listing`]).

pub mod checkpoint;
pub mod hasher;
pub mod listing;
pub mod walk;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use checkpoint::Checkpoint;
pub use hasher::hash_file;

/// Identity record for one file in the designated output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    /// Path relative to the designated output root.
    pub path: PathBuf,

    /// Size in bytes.
    pub size: u64,

    /// Modify time, second precision. The Unix epoch stands in when the
    /// source recorded no usable time at all.
    pub modified: DateTime<Utc>,

    /// Creation time where the source records one.
    pub created: Option<DateTime<Utc>>,

    /// Access time where the source records one.
    pub accessed: Option<DateTime<Utc>>,

    /// Content digest as lowercase hex. SHA-256 when computed here; carried
    /// verbatim from the listing's digest column otherwise.
    pub sha256: String,
}

impl FileFingerprint {
    /// Does this fingerprint carry a real (non-epoch) modify time?
    pub fn is_dated(&self) -> bool {
        self.modified > DateTime::UNIX_EPOCH
    }
}

/// Fingerprint every regular file under `root`, resuming from the checkpoint
/// at `checkpoint_path`.
///
/// Files already checkpointed are reused without re-hashing; each newly
/// hashed file is durably appended to the checkpoint before the next file
/// starts, so an interrupted pass loses at most the file in flight. Files
/// that cannot be read are skipped with a warning.
pub fn collect(root: &Path, checkpoint_path: &Path) -> Result<Vec<FileFingerprint>> {
    let files = walk::walk_files(root);
    let mut checkpoint = Checkpoint::open(checkpoint_path)?;

    let mut fingerprints = Vec::with_capacity(files.len());
    for relative in files {
        if let Some(existing) = checkpoint.get(&relative) {
            fingerprints.push(existing.clone());
            continue;
        }

        match fingerprint_file(root, &relative) {
            Ok(fingerprint) => {
                checkpoint.record(fingerprint.clone())?;
                fingerprints.push(fingerprint);
            }
            Err(e) => {
                tracing::warn!("Skipping unreadable file {}: {e:#}", relative.display());
            }
        }
    }

    Ok(fingerprints)
}

/// Fingerprints from a forensic body-file listing (disk-image jobs).
pub fn from_listing(path: &Path) -> Result<Vec<FileFingerprint>> {
    listing::parse_body_file(path)
}

fn fingerprint_file(root: &Path, relative: &Path) -> Result<FileFingerprint> {
    let absolute = root.join(relative);
    let metadata = std::fs::metadata(&absolute)
        .with_context(|| format!("Failed to stat file: {}", absolute.display()))?;

    let modified = metadata
        .modified()
        .map(to_seconds)
        .with_context(|| format!("No modify time for: {}", absolute.display()))?;

    Ok(FileFingerprint {
        path: relative.to_path_buf(),
        size: metadata.len(),
        modified,
        created: metadata.created().ok().map(to_seconds),
        accessed: metadata.accessed().ok().map(to_seconds),
        sha256: hasher::hash_file(&absolute)?,
    })
}

/// Truncate to whole seconds; sub-second precision differs by filesystem and
/// would make otherwise-identical fingerprints compare unequal on the wire.
fn to_seconds(time: SystemTime) -> DateTime<Utc> {
    let datetime: DateTime<Utc> = time.into();
    DateTime::from_timestamp(datetime.timestamp(), 0).unwrap_or(datetime)
}
