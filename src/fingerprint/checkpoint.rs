//! Crash-resumable fingerprint checkpoint.
//!
//! Digesting a large carrier can take hours; each finished file is appended
//! to a JSONL checkpoint and flushed, so an interrupted pass resumes where it
//! stopped instead of re-hashing everything. After the pass completes the
//! same file doubles as the durable fingerprint index that later reporting
//! runs reload.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use super::FileFingerprint;

/// Per-file fingerprint records, keyed by relative path.
#[derive(Debug)]
pub struct Checkpoint {
    path: PathBuf,
    entries: Vec<FileFingerprint>,
    by_path: HashMap<PathBuf, usize>,
}

impl Checkpoint {
    /// Load the checkpoint at `path`, or start an empty one. Unparseable
    /// lines (a crash mid-append) are skipped with a warning.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create checkpoint folder: {}", parent.display())
            })?;
        }

        let mut checkpoint = Self {
            path: path.to_path_buf(),
            entries: Vec::new(),
            by_path: HashMap::new(),
        };

        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read checkpoint: {}", path.display()))?;

            for (index, line) in raw.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<FileFingerprint>(line) {
                    Ok(fingerprint) => checkpoint.insert(fingerprint),
                    Err(e) => tracing::warn!(
                        "Skipping unparseable checkpoint line {} in {}: {e}",
                        index + 1,
                        path.display()
                    ),
                }
            }
        }

        Ok(checkpoint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fingerprint already recorded for `relative` path, if any.
    pub fn get(&self, relative: &Path) -> Option<&FileFingerprint> {
        self.by_path
            .get(relative)
            .and_then(|&index| self.entries.get(index))
    }

    /// Persist one finished fingerprint: append a flushed line and keep it in
    /// memory. The line is durable before this returns.
    pub fn record(&mut self, fingerprint: FileFingerprint) -> Result<()> {
        let line =
            serde_json::to_string(&fingerprint).context("Failed to serialise fingerprint")?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open checkpoint: {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("Failed to append to checkpoint: {}", self.path.display()))?;
        file.flush()?;
        file.sync_all()
            .with_context(|| format!("Failed to sync checkpoint: {}", self.path.display()))?;

        self.insert(fingerprint);
        Ok(())
    }

    fn insert(&mut self, fingerprint: FileFingerprint) {
        // Later record wins; happens when a rerun re-hashes a file.
        if let Some(slot) = self
            .by_path
            .get(&fingerprint.path)
            .and_then(|&index| self.entries.get_mut(index))
        {
            *slot = fingerprint;
        } else {
            self.by_path
                .insert(fingerprint.path.clone(), self.entries.len());
            self.entries.push(fingerprint);
        }
    }
}
