//! Derived ingest state.
//!
//! A unit's state is never stored as a flag. It is recomputed from what
//! actually exists on disk, in the ledger, and in the registry, which makes
//! "resume after a crash" and "resume after closing the app" the same code
//! path. The `.lock` and `.complete` sentinels are written for outside
//! observers but never read back as truth.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::fingerprint::walk::walk_files;
use crate::ledger::{EventKind, Ledger};
use crate::unit::{JobType, UnitPaths};

/// Where a unit stands in the ingest sequence.
///
/// `Acquiring`, `Characterizing`, and `Failed` only describe a live run;
/// derivation reports the most advanced completed evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UnitState {
    /// No working folder bound yet.
    New,
    /// Working folders exist and `unit.json` is persisted.
    Loaded,
    /// Acquisition in progress.
    Acquiring,
    /// Usable acquisition output exists.
    Acquired,
    /// Characterization in progress.
    Characterizing,
    /// The human report has been produced.
    Characterized,
    /// The interchange document has been exported.
    Reported,
    /// Document exported and registry outcome recorded. Permanent.
    Done,
    /// A run died with nothing usable; operator attention needed.
    Failed,
}

impl UnitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Loaded => "loaded",
            Self::Acquiring => "acquiring",
            Self::Acquired => "acquired",
            Self::Characterizing => "characterizing",
            Self::Characterized => "characterized",
            Self::Reported => "reported",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// The next step in the normal sequence, if any.
    pub fn next_state(&self) -> Option<Self> {
        match self {
            Self::New => Some(Self::Loaded),
            Self::Loaded => Some(Self::Acquiring),
            Self::Acquiring => Some(Self::Acquired),
            Self::Acquired => Some(Self::Characterizing),
            Self::Characterizing => Some(Self::Characterized),
            Self::Characterized => Some(Self::Reported),
            Self::Reported => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work out how far a unit has progressed from its folder tree, its ledger,
/// and whether the registry row carries results.
pub fn derive(
    paths: &UnitPaths,
    job_type: JobType,
    ledger: &Ledger,
    results_recorded: bool,
) -> UnitState {
    if !paths.unit_file().exists() {
        return UnitState::New;
    }
    if !has_acquired_output(paths, job_type, ledger) {
        return UnitState::Loaded;
    }
    if paths.document_file().exists() {
        if results_recorded {
            return UnitState::Done;
        }
        return UnitState::Reported;
    }
    if paths.report_file().exists() {
        return UnitState::Characterized;
    }
    UnitState::Acquired
}

/// Does the designated output for this job type hold anything usable?
pub fn has_acquired_output(paths: &UnitPaths, job_type: JobType, ledger: &Ledger) -> bool {
    match job_type {
        JobType::CopyOnly | JobType::DvdVideo | JobType::AudioCd => {
            dir_has_files(&paths.objects_dir())
        }
        // An image alone is not enough; extraction must at least have been
        // attempted (an unsupported disc leaves a failure event).
        JobType::DiskImage => {
            file_has_content(&paths.image_file())
                && ledger.events_of_kind(EventKind::Replication).next().is_some()
        }
    }
}

/// Non-empty file test used for the partial-acquisition rule.
pub fn file_has_content(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.len() > 0).unwrap_or(false)
}

/// Recursive "contains at least one regular file" test.
pub fn dir_has_files(dir: &Path) -> bool {
    dir.is_dir() && !walk_files(dir).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Agent, ProvenanceEvent};
    use crate::unit::IngestUnit;
    use std::fs;

    #[test]
    fn test_ordering_matches_the_sequence() {
        assert!(UnitState::New < UnitState::Loaded);
        assert!(UnitState::Loaded < UnitState::Acquired);
        assert!(UnitState::Acquired < UnitState::Characterized);
        assert!(UnitState::Characterized < UnitState::Reported);
        assert!(UnitState::Reported < UnitState::Done);
    }

    #[test]
    fn test_next_state_follows_the_sequence() {
        assert_eq!(UnitState::New.next_state(), Some(UnitState::Loaded));
        assert_eq!(
            UnitState::Acquired.next_state(),
            Some(UnitState::Characterizing)
        );
        assert_eq!(UnitState::Reported.next_state(), Some(UnitState::Done));
        assert_eq!(UnitState::Done.next_state(), None);
        assert_eq!(UnitState::Failed.next_state(), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(UnitState::Done.is_terminal());
        assert!(UnitState::Failed.is_terminal());
        assert!(!UnitState::New.is_terminal());
        assert!(!UnitState::Reported.is_terminal());
    }

    #[test]
    fn test_state_string_form() {
        assert_eq!(UnitState::Characterized.as_str(), "characterized");
        assert_eq!(UnitState::Done.to_string(), "done");
    }

    #[test]
    fn test_derivation_follows_the_evidence() {
        let work = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        fs::write(source.path().join("a.txt"), "a").unwrap();

        let paths = UnitPaths::new(work.path(), "39002099999999");
        let ledger = Ledger::open(&paths.metadata_dir()).unwrap();
        assert_eq!(
            derive(&paths, JobType::CopyOnly, &ledger, false),
            UnitState::New
        );

        IngestUnit::bind(
            work.path(),
            "39002099999999",
            JobType::CopyOnly,
            source.path(),
            false,
        )
        .unwrap();
        assert_eq!(
            derive(&paths, JobType::CopyOnly, &ledger, false),
            UnitState::Loaded
        );

        fs::write(paths.objects_dir().join("a.txt"), "a").unwrap();
        assert_eq!(
            derive(&paths, JobType::CopyOnly, &ledger, false),
            UnitState::Acquired
        );

        fs::write(paths.report_file(), "INGEST REPORT").unwrap();
        assert_eq!(
            derive(&paths, JobType::CopyOnly, &ledger, false),
            UnitState::Characterized
        );

        fs::write(paths.document_file(), "{}").unwrap();
        assert_eq!(
            derive(&paths, JobType::CopyOnly, &ledger, false),
            UnitState::Reported
        );
        assert_eq!(
            derive(&paths, JobType::CopyOnly, &ledger, true),
            UnitState::Done
        );
    }

    #[test]
    fn test_disk_image_needs_image_and_attempted_extraction() {
        let work = tempfile::tempdir().unwrap();
        let source = tempfile::tempdir().unwrap();
        fs::write(source.path().join("floppy.img"), "raw").unwrap();

        IngestUnit::bind(
            work.path(),
            "39002088888888",
            JobType::DiskImage,
            &source.path().join("floppy.img"),
            false,
        )
        .unwrap();
        let paths = UnitPaths::new(work.path(), "39002088888888");
        let mut ledger = Ledger::open(&paths.metadata_dir()).unwrap();

        assert_eq!(
            derive(&paths, JobType::DiskImage, &ledger, false),
            UnitState::Loaded
        );

        fs::create_dir_all(paths.diskimage_dir()).unwrap();
        fs::write(paths.image_file(), vec![0_u8; 512]).unwrap();
        assert_eq!(
            derive(&paths, JobType::DiskImage, &ledger, false),
            UnitState::Loaded
        );

        ledger
            .append(ProvenanceEvent::failure(
                EventKind::Replication,
                "(no extraction tool)",
                "no recognizable filesystem",
                1,
                "failed",
                Agent::internal(),
            ))
            .unwrap();
        assert_eq!(
            derive(&paths, JobType::DiskImage, &ledger, false),
            UnitState::Acquired
        );
    }

    #[test]
    fn test_output_checks() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!file_has_content(&dir.path().join("missing.img")));

        fs::write(dir.path().join("empty.img"), "").unwrap();
        assert!(!file_has_content(&dir.path().join("empty.img")));

        fs::write(dir.path().join("real.img"), "x").unwrap();
        assert!(file_has_content(&dir.path().join("real.img")));

        assert!(!dir_has_files(&dir.path().join("nope")));
        assert!(dir_has_files(dir.path()));
    }
}
