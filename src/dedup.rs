//! Duplicate detection and content dating.
//!
//! Works purely over fingerprints; no filesystem access. Empty files are
//! counted but never grouped (every empty file shares a digest, and calling
//! them duplicates of each other would be noise rather than signal).

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Datelike as _, Utc};

use crate::fingerprint::FileFingerprint;

/// Accounting summary over one item's fingerprints.
///
/// Holds the invariant
/// `distinct_files + duplicate_copies + empty_files == total_files`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupStats {
    /// Every fingerprinted file.
    pub total_files: usize,

    /// Files of size zero.
    pub empty_files: usize,

    /// Non-empty files counted once per distinct content.
    pub distinct_files: usize,

    /// Extra copies beyond the first in each duplicate group.
    pub duplicate_copies: usize,

    /// How many distinct contents have at least one extra copy.
    pub distinct_with_duplicates: usize,

    /// Bytes across all files.
    pub total_bytes: u64,

    /// Bytes spent on extra copies.
    pub duplicate_bytes: u64,

    /// (earliest, latest) year of surviving modify times; `None` means the
    /// item is undated.
    pub date_range: Option<(i32, i32)>,
}

/// A set of non-empty files sharing one content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub sha256: String,
    pub size: u64,
    pub members: Vec<PathBuf>,
}

/// Summarise duplication and dating across `fingerprints`.
///
/// Dating considers each fingerprint's modify time but discards any time not
/// earlier than `acquisition_marker`, since times stamped during or after
/// transfer say nothing about the content's own age. Epoch stand-ins (unknown
/// times) are likewise excluded. If no time survives, the item is undated.
pub fn analyze(fingerprints: &[FileFingerprint], acquisition_marker: DateTime<Utc>) -> DedupStats {
    let total_files = fingerprints.len();
    let empty_files = fingerprints.iter().filter(|f| f.size == 0).count();
    let total_bytes = fingerprints.iter().map(|f| f.size).sum();

    let mut groups: BTreeMap<&str, Vec<&FileFingerprint>> = BTreeMap::new();
    for fingerprint in fingerprints.iter().filter(|f| f.size > 0) {
        groups
            .entry(fingerprint.sha256.as_str())
            .or_default()
            .push(fingerprint);
    }

    let mut duplicate_copies = 0;
    let mut distinct_with_duplicates = 0;
    let mut duplicate_bytes = 0u64;
    for members in groups.values() {
        if members.len() > 1 {
            let extras = members.len() - 1;
            duplicate_copies += extras;
            distinct_with_duplicates += 1;
            duplicate_bytes += extras as u64 * members.first().map_or(0, |f| f.size);
        }
    }

    let distinct_files = (total_files - empty_files) - duplicate_copies;

    let mut years = fingerprints
        .iter()
        .filter(|f| f.is_dated() && f.modified < acquisition_marker)
        .map(|f| f.modified.year());
    let date_range = years.next().map(|first| {
        years.fold((first, first), |(min, max), year| {
            (min.min(year), max.max(year))
        })
    });

    DedupStats {
        total_files,
        empty_files,
        distinct_files,
        duplicate_copies,
        distinct_with_duplicates,
        total_bytes,
        duplicate_bytes,
        date_range,
    }
}

/// Duplicate groups for the human report: largest group first (ties broken by
/// size, then digest), members path-sorted.
pub fn duplicate_groups(fingerprints: &[FileFingerprint]) -> Vec<DuplicateGroup> {
    let mut by_digest: BTreeMap<&str, Vec<&FileFingerprint>> = BTreeMap::new();
    for fingerprint in fingerprints.iter().filter(|f| f.size > 0) {
        by_digest
            .entry(fingerprint.sha256.as_str())
            .or_default()
            .push(fingerprint);
    }

    let mut groups: Vec<DuplicateGroup> = by_digest
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(sha256, members)| {
            let mut paths: Vec<PathBuf> =
                members.iter().map(|f| f.path.clone()).collect();
            paths.sort();
            DuplicateGroup {
                sha256: sha256.to_owned(),
                size: members.first().map_or(0, |f| f.size),
                members: paths,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        b.members
            .len()
            .cmp(&a.members.len())
            .then(b.size.cmp(&a.size))
            .then(a.sha256.cmp(&b.sha256))
    });
    groups
}
