//! Ingest units and their on-disk working tree.
//!
//! A unit is one physical carrier or directory transfer, keyed by its
//! collection-management barcode. Everything the pipeline produces for a unit
//! lives under one working folder:
//!
//! ```text
//! <work root>/<barcode>/
//!   objects/                 designated output (extracted/copied content)
//!   diskimage/               raw image + rescue map (disk-image jobs)
//!   metadata/                unit.json, ledger.jsonl, provenance.json,
//!                            listing.txt, detection.txt, tree.txt,
//!                            formats.csv, virus-scan.log, sensitive/,
//!                            checkpoints/fingerprints.jsonl
//!   report.txt               human-readable summary
//!   .lock / .complete        markers for external observers only
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngotError;

/// How the carrier's content is acquired.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    /// Direct recursive copy of a directory source.
    CopyOnly,
    /// Forensic imaging of a block device or image file.
    DiskImage,
    /// DVD-Video title extraction.
    DvdVideo,
    /// Audio CD track extraction.
    AudioCd,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CopyOnly => "copy-only",
            Self::DiskImage => "disk-image",
            Self::DvdVideo => "dvd-video",
            Self::AudioCd => "audio-cd",
        }
    }

    /// Optical/audio content is intentionally not scanned for sensitive data;
    /// the skip is recorded as a decision event rather than silently omitted.
    pub fn skips_sensitive_scan(&self) -> bool {
        matches!(self, Self::DvdVideo | Self::AudioCd)
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item moving through ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestUnit {
    /// Collection-management barcode; keys the working folder.
    pub barcode: String,

    pub job_type: JobType,

    /// Device node, image file, or directory the content comes from.
    pub source: PathBuf,

    /// When this unit was first bound; the acquisition marker for dating.
    pub created_at: DateTime<Utc>,

    /// Force every stage to run again. Runtime flag, never persisted.
    #[serde(skip)]
    pub rerun: bool,
}

impl IngestUnit {
    /// Bind a unit to its working folder: validate the operator input, then
    /// either adopt the existing tree (keeping the original acquisition
    /// marker) or create a fresh one and persist `unit.json`.
    ///
    /// Validation failures happen before any folder is touched.
    ///
    /// # Errors
    ///
    /// [`IngotError::InvalidInput`] for a malformed barcode or missing
    /// source; I/O errors creating the tree.
    pub fn bind(
        work_root: &Path,
        barcode: &str,
        job_type: JobType,
        source: &Path,
        rerun: bool,
    ) -> Result<Self> {
        validate_barcode(barcode)?;
        if !source.exists() {
            return Err(IngotError::InvalidInput(format!(
                "source does not exist: {}",
                source.display()
            ))
            .into());
        }

        let paths = UnitPaths::new(work_root, barcode);

        if paths.unit_file().exists() {
            let mut unit = Self::load(&paths.unit_file())?;
            if unit.job_type != job_type || unit.source != source {
                tracing::warn!(
                    "Unit {barcode} was bound as {} from {}; keeping the persisted binding",
                    unit.job_type,
                    unit.source.display()
                );
            }
            unit.rerun = rerun;
            return Ok(unit);
        }

        fs::create_dir_all(paths.objects_dir())
            .with_context(|| format!("Failed to create working tree for {barcode}"))?;
        fs::create_dir_all(paths.metadata_dir())
            .with_context(|| format!("Failed to create metadata folder for {barcode}"))?;

        let unit = Self {
            barcode: barcode.to_owned(),
            job_type,
            source: source.to_path_buf(),
            created_at: Utc::now(),
            rerun,
        };
        unit.save(&paths.unit_file())?;

        tracing::info!("Bound unit {barcode} ({job_type}) at {}", paths.root().display());
        Ok(unit)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read unit file: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse unit file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialise unit")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write unit file: {}", path.display()))
    }
}

fn validate_barcode(barcode: &str) -> Result<()> {
    let invalid = barcode.is_empty()
        || barcode == "."
        || barcode == ".."
        || barcode
            .chars()
            .any(|c| c.is_whitespace() || c == '/' || c == '\\' || c.is_control());
    if invalid {
        return Err(IngotError::InvalidInput(format!(
            "barcode must be a non-empty path-safe token, got {barcode:?}"
        ))
        .into());
    }
    Ok(())
}

/// Resolves every well-known path inside one unit's working folder.
#[derive(Debug, Clone)]
pub struct UnitPaths {
    root: PathBuf,
    barcode: String,
}

impl UnitPaths {
    pub fn new(work_root: &Path, barcode: &str) -> Self {
        Self {
            root: work_root.join(barcode),
            barcode: barcode.to_owned(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The designated output: where acquired content lands.
    pub fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    pub fn diskimage_dir(&self) -> PathBuf {
        self.root.join("diskimage")
    }

    pub fn image_file(&self) -> PathBuf {
        self.diskimage_dir().join(format!("{}.img", self.barcode))
    }

    /// Rescue map written by the imaging tool; lets a re-run resume imaging.
    pub fn image_map_file(&self) -> PathBuf {
        self.diskimage_dir().join(format!("{}.map", self.barcode))
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join("metadata")
    }

    pub fn unit_file(&self) -> PathBuf {
        self.metadata_dir().join("unit.json")
    }

    pub fn document_file(&self) -> PathBuf {
        self.metadata_dir().join(crate::ledger::DOCUMENT_FILE)
    }

    pub fn checkpoint_file(&self) -> PathBuf {
        self.metadata_dir().join("checkpoints").join("fingerprints.jsonl")
    }

    /// Forensic body-file listing from the listing tool.
    pub fn listing_file(&self) -> PathBuf {
        self.metadata_dir().join("listing.txt")
    }

    /// Filesystem-detection tool output (replication evidence).
    pub fn detection_file(&self) -> PathBuf {
        self.metadata_dir().join("detection.txt")
    }

    pub fn tree_file(&self) -> PathBuf {
        self.metadata_dir().join("tree.txt")
    }

    pub fn formats_file(&self) -> PathBuf {
        self.metadata_dir().join("formats.csv")
    }

    pub fn virus_scan_log(&self) -> PathBuf {
        self.metadata_dir().join("virus-scan.log")
    }

    pub fn sensitive_dir(&self) -> PathBuf {
        self.metadata_dir().join("sensitive")
    }

    pub fn report_file(&self) -> PathBuf {
        self.root.join("report.txt")
    }

    /// In-progress marker; informational only, never read as truth.
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".lock")
    }

    /// Terminal marker; informational only, never read as truth.
    pub fn done_marker(&self) -> PathBuf {
        self.root.join(".complete")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_creates_tree_and_persists_unit() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir(&source).unwrap();
        let work_root = dir.path().join("units");

        let unit =
            IngestUnit::bind(&work_root, "39002098765432", JobType::CopyOnly, &source, false)
                .unwrap();
        assert_eq!(unit.barcode, "39002098765432");
        assert!(!unit.rerun);

        let paths = UnitPaths::new(&work_root, "39002098765432");
        assert!(paths.objects_dir().is_dir());
        assert!(paths.metadata_dir().is_dir());
        assert!(paths.unit_file().is_file());
    }

    #[test]
    fn test_rebind_adopts_existing_unit() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir(&source).unwrap();
        let work_root = dir.path().join("units");

        let first =
            IngestUnit::bind(&work_root, "B-1", JobType::CopyOnly, &source, false).unwrap();
        let second =
            IngestUnit::bind(&work_root, "B-1", JobType::CopyOnly, &source, true).unwrap();

        assert_eq!(
            second.created_at, first.created_at,
            "acquisition marker must survive re-binding"
        );
        assert!(second.rerun, "re-run flag comes from the operator, not disk");
    }

    #[test]
    fn test_invalid_barcode_rejected_before_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source");
        fs::create_dir(&source).unwrap();
        let work_root = dir.path().join("units");

        let result =
            IngestUnit::bind(&work_root, "bad/barcode", JobType::CopyOnly, &source, false);
        assert!(result.is_err());
        assert!(!work_root.exists(), "no folder may be created for bad input");
    }

    #[test]
    fn test_missing_source_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let work_root = dir.path().join("units");

        let result = IngestUnit::bind(
            &work_root,
            "B-2",
            JobType::DiskImage,
            &dir.path().join("no-such-device"),
            false,
        );
        let error = result.unwrap_err();
        assert!(
            matches!(error.downcast_ref(), Some(IngotError::InvalidInput(_))),
            "unexpected error: {error:#}"
        );
    }

    #[test]
    fn test_job_type_wire_form() {
        let json = serde_json::to_string(&JobType::DvdVideo).unwrap();
        assert_eq!(json, "\"dvd-video\"");
        let back: JobType = serde_json::from_str("\"audio-cd\"").unwrap();
        assert_eq!(back, JobType::AudioCd);
        assert_eq!(JobType::DiskImage.as_str(), "disk-image");
    }

    #[test]
    fn test_paths_layout() {
        let paths = UnitPaths::new(Path::new("/work"), "B-42");
        assert_eq!(paths.root(), Path::new("/work/B-42"));
        assert_eq!(paths.image_file(), Path::new("/work/B-42/diskimage/B-42.img"));
        assert_eq!(
            paths.checkpoint_file(),
            Path::new("/work/B-42/metadata/checkpoints/fingerprints.jsonl")
        );
        assert_eq!(paths.report_file(), Path::new("/work/B-42/report.txt"));
    }
}
