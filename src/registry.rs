//! Item registry.
//!
//! The registry is the collection-management side of ingest: one JSON
//! document mapping barcode → record. Operators seed rows (shipment, title)
//! before ingest; the pipeline reads the row at Load and writes the outcome
//! back at Report. A `.lock` file alongside the registry marks it as being
//! edited elsewhere; writes refuse rather than clobber.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngotError;

/// Outcome summary recorded against a registry row when ingest completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResults {
    pub job_type: String,

    /// Extraction method(s) used, comma-joined for disk images.
    pub method: String,

    /// Worst acquisition exit status (0 for a clean run).
    pub outcome: i64,

    pub total_files: usize,
    pub distinct_files: usize,
    pub duplicate_copies: usize,
    pub empty_files: usize,
    pub format_count: usize,
    pub total_bytes: u64,

    /// Rendered date range, or `"undated"`.
    pub date_range: String,

    /// Where the human report was written.
    pub report: PathBuf,

    pub completed_utc: DateTime<Utc>,
}

/// One item's registry row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryRecord {
    #[serde(default)]
    pub shipment: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub notes: String,

    /// Present once ingest has completed at least once.
    #[serde(default)]
    pub results: Option<IngestResults>,
}

/// Barcode → record map backed by one JSON file.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    records: BTreeMap<String, RegistryRecord>,
}

impl Registry {
    /// Open the registry at `path`; a missing file is an empty registry.
    pub fn open(path: &Path) -> Result<Self> {
        let records = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read registry: {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse registry: {}", path.display()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The row for `barcode`.
    ///
    /// # Errors
    ///
    /// [`IngotError::UnknownBarcode`] when no row exists; ingest refuses to
    /// work on items the registry has never heard of.
    pub fn lookup(&self, barcode: &str) -> Result<&RegistryRecord> {
        self.records
            .get(barcode)
            .ok_or_else(|| IngotError::UnknownBarcode(barcode.to_owned()).into())
    }

    /// Insert or replace the row for `barcode`, preserving recorded results
    /// when the caller's row carries none.
    pub fn upsert(&mut self, barcode: &str, mut record: RegistryRecord) {
        if record.results.is_none()
            && let Some(existing) = self.records.get(barcode)
        {
            record.results = existing.results.clone();
        }
        self.records.insert(barcode.to_owned(), record);
    }

    /// Record ingest results against an existing row.
    pub fn record_results(&mut self, barcode: &str, results: IngestResults) -> Result<()> {
        let record = self
            .records
            .get_mut(barcode)
            .ok_or_else(|| IngotError::UnknownBarcode(barcode.to_owned()))?;
        record.results = Some(results);
        Ok(())
    }

    /// Is a sibling `.lock` file present?
    pub fn is_locked(&self) -> bool {
        self.lock_path().exists()
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.push_str(".lock");
        self.path.with_file_name(name)
    }

    /// Persist the registry atomically.
    ///
    /// # Errors
    ///
    /// [`IngotError::RegistryLocked`] when the lock file is present; nothing
    /// is written in that case.
    pub fn save(&self) -> Result<()> {
        if self.is_locked() {
            return Err(IngotError::RegistryLocked(self.lock_path()).into());
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create registry folder: {}", parent.display())
            })?;
        }

        let json =
            serde_json::to_string_pretty(&self.records).context("Failed to serialise registry")?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json)
            .with_context(|| format!("Failed to write temp registry: {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!("Failed to move registry into place: {}", self.path.display())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results() -> IngestResults {
        IngestResults {
            job_type: "copy-only".to_owned(),
            method: "direct copy".to_owned(),
            outcome: 0,
            total_files: 5,
            distinct_files: 3,
            duplicate_copies: 1,
            empty_files: 1,
            format_count: 2,
            total_bytes: 4096,
            date_range: "1994-1998".to_owned(),
            report: PathBuf::from("/work/B-1/report.txt"),
            completed_utc: Utc::now(),
        }
    }

    #[test]
    fn test_missing_file_is_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(&dir.path().join("registry.json")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lookup_unknown_barcode() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(&dir.path().join("registry.json")).unwrap();

        let error = registry.lookup("B-404").unwrap_err();
        assert!(matches!(
            error.downcast_ref(),
            Some(IngotError::UnknownBarcode(_))
        ));
    }

    #[test]
    fn test_round_trip_with_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        let mut registry = Registry::open(&path).unwrap();
        registry.upsert(
            "B-1",
            RegistryRecord {
                shipment: "2024-03".to_owned(),
                title: "Office files, 3.5\" floppy".to_owned(),
                ..RegistryRecord::default()
            },
        );
        registry.record_results("B-1", results()).unwrap();
        registry.save().unwrap();

        let reopened = Registry::open(&path).unwrap();
        let record = reopened.lookup("B-1").unwrap();
        assert_eq!(record.shipment, "2024-03");
        let recorded = record.results.as_ref().unwrap();
        assert_eq!(recorded.total_files, 5);
        assert_eq!(recorded.date_range, "1994-1998");
    }

    #[test]
    fn test_upsert_without_results_keeps_recorded_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::open(&dir.path().join("registry.json")).unwrap();

        registry.upsert("B-1", RegistryRecord::default());
        registry.record_results("B-1", results()).unwrap();

        // Operator edits the row later without re-supplying results.
        registry.upsert(
            "B-1",
            RegistryRecord {
                title: "corrected title".to_owned(),
                ..RegistryRecord::default()
            },
        );

        let record = registry.lookup("B-1").unwrap();
        assert_eq!(record.title, "corrected title");
        assert!(record.results.is_some());
    }

    #[test]
    fn test_locked_registry_refuses_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        let mut registry = Registry::open(&path).unwrap();
        registry.upsert("B-1", RegistryRecord::default());
        registry.save().unwrap();

        fs::write(dir.path().join("registry.json.lock"), b"").unwrap();
        let before = fs::read_to_string(&path).unwrap();

        registry.upsert("B-2", RegistryRecord::default());
        let error = registry.save().unwrap_err();
        assert!(matches!(
            error.downcast_ref(),
            Some(IngotError::RegistryLocked(_))
        ));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            before,
            "a refused save must not touch the file"
        );
    }
}
